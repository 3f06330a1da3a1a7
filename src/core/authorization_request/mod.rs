use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::{Error, Result};

use self::parameters::{
    with_openid_scope, AuthorizationDetail, ParMode, Pkce, PushedAuthorizationResponse,
};

use super::{
    credential_offer::{
        parameters::OfferedCredential, OfferedCredentials, UniformCredentialOfferRequest,
    },
    metadata::{credential_configuration::SupportedCredentials, EndpointMetadata},
    object::UntypedObject,
    util::{post_form, AsyncHttpClient},
};

pub mod parameters;

const RESPONSE_TYPE_CODE: &str = "code";

/// What the wallet asks the authorization server for.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthorizationRequestOpts {
    pub redirect_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_details: Option<Vec<AuthorizationDetail>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub par_mode: Option<ParMode>,
}

impl AuthorizationRequestOpts {
    pub fn new(redirect_uri: impl Into<String>) -> Self {
        Self {
            redirect_uri: redirect_uri.into(),
            ..Default::default()
        }
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn with_authorization_details(mut self, details: Vec<AuthorizationDetail>) -> Self {
        self.authorization_details = Some(details);
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn with_par_mode(mut self, par_mode: ParMode) -> Self {
        self.par_mode = Some(par_mode);
        self
    }
}

/// Builds the URL a wallet sends the user to in order to start an authorization code flow.
#[derive(Debug, Clone)]
#[must_use]
pub struct AuthorizationRequestBuilder<'a> {
    pkce: &'a Pkce,
    metadata: &'a EndpointMetadata,
    request: AuthorizationRequestOpts,
    credential_offer: Option<&'a UniformCredentialOfferRequest>,
    supported_credentials: Option<&'a SupportedCredentials>,
}

impl<'a> AuthorizationRequestBuilder<'a> {
    pub fn new(
        pkce: &'a Pkce,
        metadata: &'a EndpointMetadata,
        request: AuthorizationRequestOpts,
    ) -> Self {
        Self {
            pkce,
            metadata,
            request,
            credential_offer: None,
            supported_credentials: None,
        }
    }

    /// The offer the request answers. Supplies `issuer_state`, and the credentials to derive
    /// `authorization_details` from when neither `scope` nor `authorization_details` is given.
    pub fn with_credential_offer(mut self, offer: &'a UniformCredentialOfferRequest) -> Self {
        self.credential_offer = Some(offer);
        self
    }

    /// Configurations that offered credential identifiers are resolved against.
    pub fn with_supported_credentials(mut self, supported: &'a SupportedCredentials) -> Self {
        self.supported_credentials = Some(supported);
        self
    }

    /// Build the authorization request URL, pushing the parameters first when PAR applies.
    pub async fn build<H>(self, http_client: &H) -> Result<Url>
    where
        H: AsyncHttpClient + ?Sized,
    {
        let par_mode = if self.metadata.require_pushed_authorization_requests() {
            ParMode::Require
        } else {
            self.request.par_mode.unwrap_or_default()
        };

        let mut authorization_details = match (
            &self.request.scope,
            self.request.authorization_details.clone(),
        ) {
            (None, None) => Some(self.derive_authorization_details()?),
            (_, details) => details,
        };
        for detail in authorization_details.iter_mut().flatten() {
            detail.add_location(self.metadata.issuer());
        }

        let Some(authorization_endpoint) = self.metadata.authorization_endpoint() else {
            return Err(Error::InvalidMetadata(
                "server metadata does not contain an authorization_endpoint".into(),
            ));
        };

        let mut parameters: Vec<(&str, String)> =
            vec![("response_type", RESPONSE_TYPE_CODE.into())];
        if !self.pkce.is_disabled() {
            parameters.push((
                "code_challenge_method",
                self.pkce.code_challenge_method().to_string(),
            ));
            parameters.push(("code_challenge", self.pkce.code_challenge().to_owned()));
        }
        if let Some(details) = authorization_details {
            let details = serde_json::to_string(&details).map_err(|e| {
                Error::InvalidRequest(format!(
                    "authorization_details could not be serialized: {e}"
                ))
            })?;
            parameters.push(("authorization_details", details));
        }
        parameters.push(("redirect_uri", self.request.redirect_uri.clone()));
        parameters.push(("scope", with_openid_scope(self.request.scope.as_deref())));
        if let Some(client_id) = &self.request.client_id {
            parameters.push(("client_id", client_id.clone()));
        }
        if let Some(issuer_state) = self.credential_offer.and_then(|o| o.issuer_state()) {
            parameters.push(("issuer_state", issuer_state.to_owned()));
        }

        let par_endpoint = self.metadata.pushed_authorization_request_endpoint();
        match (par_endpoint, par_mode) {
            (None, ParMode::Require) => return Err(Error::ParUnsupported),
            (Some(endpoint), mode) if mode != ParMode::Never => {
                debug!("pushing authorization request to {endpoint}");
                let request_uri = push(http_client, endpoint, &parameters).await?;
                parameters = vec![("request_uri", request_uri)];
            }
            _ => {}
        }

        let encoded = serde_urlencoded::to_string(&parameters).map_err(|e| {
            Error::InvalidRequest(format!("authorization request could not be encoded: {e}"))
        })?;
        let mut url = authorization_endpoint.clone();
        let query = match url.query() {
            Some(existing) if !existing.is_empty() => format!("{existing}&{encoded}"),
            _ => encoded,
        };
        url.set_query(Some(&query));

        debug!("authorization request URL: {url}");
        Ok(url)
    }

    fn derive_authorization_details(&self) -> Result<Vec<AuthorizationDetail>> {
        let Some(offer) = self.credential_offer else {
            return Err(Error::Derivation(
                "a scope or authorization_details is required when no credential offer is present"
                    .into(),
            ));
        };

        let lookup = |id: &str| {
            let config = self.supported_credentials.and_then(|s| s.get(id));
            if config.is_none() {
                warn!("offered credential '{id}' is not among the supported credentials");
            }
            config.map(|config| {
                AuthorizationDetail::from_credential(UntypedObject::from(config.clone()))
            })
        };

        let details: Vec<AuthorizationDetail> = match offer.credential_offer().offered() {
            OfferedCredentials::ConfigurationIds(ids) => {
                ids.iter().filter_map(|id| lookup(id)).collect()
            }
            OfferedCredentials::Credentials(credentials) => credentials
                .iter()
                .filter_map(|credential| match credential {
                    OfferedCredential::Id(id) => lookup(id),
                    OfferedCredential::Object(object) => {
                        Some(AuthorizationDetail::from_credential(object.clone()))
                    }
                })
                .collect(),
        };

        if details.is_empty() {
            return Err(Error::Derivation(
                "no authorization_details could be derived from the credential offer, pass them explicitly"
                    .into(),
            ));
        }
        Ok(details)
    }
}

async fn push<H>(http_client: &H, endpoint: &Url, parameters: &[(&str, String)]) -> Result<String>
where
    H: AsyncHttpClient + ?Sized,
{
    let response = post_form(http_client, endpoint.as_str(), parameters)
        .await
        .map_err(|e| Error::Par(format!("{e:#}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = String::from_utf8_lossy(response.body());
        return Err(Error::Par(format!(
            "{endpoint} responded with status {status}: {body}"
        )));
    }

    let PushedAuthorizationResponse { request_uri, .. } = serde_json::from_slice(response.body())
        .map_err(|e| Error::Par(format!("response from {endpoint} could not be parsed: {e}")))?;
    Ok(request_uri)
}
