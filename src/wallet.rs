use anyhow::{anyhow, Context};
use async_trait::async_trait;
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use tracing::debug;
use url::Url;

use crate::{
    core::{
        authorization_request::{
            parameters::Pkce, AuthorizationRequestBuilder, AuthorizationRequestOpts,
        },
        credential::{CredentialRequest, CredentialResponse},
        credential_offer::{self, UniformCredentialOfferRequest},
        metadata::{
            credential_configuration::{get_supported_credentials, SupportedCredentialsQuery},
            EndpointMetadata,
        },
        util::{base_request, AsyncHttpClient},
    },
    Error, ErrorResponse, Result,
};

/// The wallet side of the issuance flow.
///
/// Implementors supply the HTTP client; every step has a default implementation.
#[async_trait]
pub trait Wallet: Sync {
    type HttpClient: AsyncHttpClient + Send + Sync;

    fn http_client(&self) -> &Self::HttpClient;

    /// Client identifier used when the authorization request does not name one.
    fn client_id(&self) -> Option<&str> {
        None
    }

    /// Parse a credential offer URI, fetching it first when it is passed by reference.
    async fn resolve_offer(&self, uri: &str) -> Result<UniformCredentialOfferRequest> {
        credential_offer::decode(uri, self.http_client()).await
    }

    async fn resolve_metadata(
        &self,
        offer: &UniformCredentialOfferRequest,
    ) -> Result<EndpointMetadata> {
        EndpointMetadata::resolve(offer.credential_issuer(), self.http_client()).await
    }

    /// Build the URL to send the user to, deriving `authorization_details` from the offer when
    /// `request` carries neither a scope nor details.
    async fn authorization_url(
        &self,
        offer: &UniformCredentialOfferRequest,
        metadata: &EndpointMetadata,
        pkce: &Pkce,
        mut request: AuthorizationRequestOpts,
    ) -> Result<Url> {
        if request.client_id.is_none() {
            request.client_id = self.client_id().map(ToOwned::to_owned);
        }
        let supported = get_supported_credentials(
            metadata.credential_issuer_metadata(),
            &SupportedCredentialsQuery::new(offer.version()),
        )?;

        AuthorizationRequestBuilder::new(pkce, metadata, request)
            .with_credential_offer(offer)
            .with_supported_credentials(&supported)
            .build(self.http_client())
            .await
    }

    /// Request a credential with an access token obtained from the token endpoint.
    async fn request_credential(
        &self,
        metadata: &EndpointMetadata,
        access_token: &str,
        request: &CredentialRequest,
    ) -> Result<CredentialResponse> {
        let endpoint = metadata.credential_endpoint();
        let body = serde_json::to_vec(request).map_err(|e| {
            Error::InvalidCredentialRequest(format!("request could not be serialized: {e}"))
        })?;
        let http_request = base_request()
            .method("POST")
            .uri(endpoint.as_str())
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, format!("Bearer {access_token}"))
            .body(body)
            .context("failed to build credential request")
            .map_err(Error::http("requesting a credential"))?;

        debug!("requesting a credential from {endpoint}");
        let response = self
            .http_client()
            .execute(http_request)
            .await
            .map_err(Error::http("requesting a credential"))?;

        let status = response.status();
        if !status.is_success() {
            if let Ok(error_response) = serde_json::from_slice::<ErrorResponse>(response.body()) {
                debug!(
                    "credential endpoint rejected the request: {}",
                    error_response.error
                );
                return Err(Error::CredentialEndpoint {
                    status: status.as_u16(),
                    response: error_response,
                });
            }
            return Err(Error::http("requesting a credential")(anyhow!(
                "{endpoint} responded with status {status}: {}",
                String::from_utf8_lossy(response.body())
            )));
        }

        serde_json::from_slice(response.body())
            .with_context(|| format!("failed to parse credential response from {endpoint}"))
            .map_err(Error::http("requesting a credential"))
    }
}
