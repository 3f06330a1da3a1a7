use std::ops::{Deref, DerefMut};

use anyhow::Error;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::Result;

use self::parameters::{
    authorization_server::{
        AuthorizationEndpoint, Issuer, PushedAuthorizationRequestEndpoint,
        RequirePushedAuthorizationRequests, TokenEndpoint,
    },
    issuer::{
        AuthorizationServers, CredentialEndpoint, Display, LegacyAuthorizationServer,
        MetadataDisplay,
    },
};

use super::{
    credential_offer::parameters::CredentialIssuer,
    object::{ParsingErrorContext, UntypedObject},
    util::{get_json, AsyncHttpClient},
};

pub mod credential_configuration;
pub mod parameters;

pub const CREDENTIAL_ISSUER_WELL_KNOWN: &str = ".well-known/openid-credential-issuer";
pub const AUTHORIZATION_SERVER_WELL_KNOWN: &str = ".well-known/oauth-authorization-server";

/// `/.well-known/openid-credential-issuer` document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "UntypedObject", into = "UntypedObject")]
pub struct CredentialIssuerMetadata(UntypedObject, CredentialIssuer, CredentialEndpoint);

impl CredentialIssuerMetadata {
    pub fn credential_issuer(&self) -> &str {
        &self.1 .0
    }

    pub fn credential_endpoint(&self) -> &Url {
        &self.2 .0
    }

    /// Authorization servers the issuer relies on, from `authorization_servers` or the older
    /// single `authorization_server`.
    pub fn authorization_servers(&self) -> Vec<String> {
        if let Some(Ok(AuthorizationServers(servers))) = self.0.get::<AuthorizationServers>() {
            return servers;
        }
        self.0
            .get::<LegacyAuthorizationServer>()
            .and_then(|server| server.ok())
            .map(|LegacyAuthorizationServer(server)| vec![server])
            .unwrap_or_default()
    }

    pub fn display(&self) -> Vec<MetadataDisplay> {
        self.0
            .get_or_default::<Display>()
            .map(|Display(display)| display)
            .unwrap_or_default()
    }
}

impl From<CredentialIssuerMetadata> for UntypedObject {
    fn from(value: CredentialIssuerMetadata) -> Self {
        value.0
    }
}

impl TryFrom<UntypedObject> for CredentialIssuerMetadata {
    type Error = Error;

    fn try_from(value: UntypedObject) -> Result<Self, Self::Error> {
        let credential_issuer = value.get().parsing_error()?;
        let credential_endpoint = value.get().parsing_error()?;
        Ok(Self(value, credential_issuer, credential_endpoint))
    }
}

impl Deref for CredentialIssuerMetadata {
    type Target = UntypedObject;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for CredentialIssuerMetadata {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

/// `/.well-known/oauth-authorization-server` document. Every member is optional for the
/// purposes of this crate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthorizationServerMetadata(pub UntypedObject);

impl Deref for AuthorizationServerMetadata {
    type Target = UntypedObject;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Endpoints of an issuer and its authorization server, merged from both metadata documents.
#[derive(Debug, Clone)]
pub struct EndpointMetadata {
    issuer: String,
    token_endpoint: Url,
    credential_endpoint: Url,
    authorization_endpoint: Option<Url>,
    pushed_authorization_request_endpoint: Option<Url>,
    require_pushed_authorization_requests: bool,
    authorization_server: Option<String>,
    credential_issuer_metadata: CredentialIssuerMetadata,
}

impl EndpointMetadata {
    /// Merge the credential issuer document with the authorization server document, if any.
    ///
    /// The credential issuer document wins for the credential and token endpoints; the
    /// authorization server document supplies the authorization and PAR endpoints. Either may
    /// require pushed authorization requests.
    pub fn new(
        credential_issuer_metadata: CredentialIssuerMetadata,
        authorization_server_metadata: Option<AuthorizationServerMetadata>,
    ) -> Result<Self> {
        let server = authorization_server_metadata.unwrap_or_default();
        let invalid = |e: Error| crate::Error::InvalidMetadata(format!("{e:#}"));

        let token_endpoint = match credential_issuer_metadata.get::<TokenEndpoint>() {
            Some(endpoint) => endpoint.parsing_error().map_err(invalid)?,
            None => server.get::<TokenEndpoint>().parsing_error().map_err(|e| {
                crate::Error::InvalidMetadata(format!(
                    "{e:#} in both the credential issuer and authorization server metadata"
                ))
            })?,
        };

        let authorization_endpoint = server
            .get::<AuthorizationEndpoint>()
            .or_else(|| credential_issuer_metadata.get::<AuthorizationEndpoint>())
            .transpose()
            .map_err(invalid)?;
        let pushed_authorization_request_endpoint = server
            .get::<PushedAuthorizationRequestEndpoint>()
            .or_else(|| credential_issuer_metadata.get::<PushedAuthorizationRequestEndpoint>())
            .transpose()
            .map_err(invalid)?;
        let RequirePushedAuthorizationRequests(server_requires) =
            server.get_or_default().map_err(invalid)?;
        let RequirePushedAuthorizationRequests(issuer_requires) =
            credential_issuer_metadata.get_or_default().map_err(invalid)?;

        let authorization_server = server
            .get::<Issuer>()
            .and_then(|issuer| issuer.ok())
            .map(|Issuer(issuer)| issuer)
            .or_else(|| credential_issuer_metadata.authorization_servers().into_iter().next());

        Ok(Self {
            issuer: credential_issuer_metadata.credential_issuer().to_owned(),
            token_endpoint: token_endpoint.0,
            credential_endpoint: credential_issuer_metadata.credential_endpoint().clone(),
            authorization_endpoint: authorization_endpoint.map(|endpoint| endpoint.0),
            pushed_authorization_request_endpoint: pushed_authorization_request_endpoint
                .map(|endpoint| endpoint.0),
            require_pushed_authorization_requests: server_requires || issuer_requires,
            authorization_server,
            credential_issuer_metadata,
        })
    }

    /// Fetch and merge the metadata of `credential_issuer`.
    ///
    /// The credential issuer document is required; the authorization server document is looked
    /// up at the first advertised authorization server (or the issuer itself) and skipped when
    /// it cannot be retrieved.
    pub async fn resolve<H>(credential_issuer: &str, http_client: &H) -> Result<Self>
    where
        H: AsyncHttpClient + ?Sized,
    {
        let url = well_known(credential_issuer, CREDENTIAL_ISSUER_WELL_KNOWN);
        let object: UntypedObject = get_json(http_client, &url)
            .await
            .map_err(crate::Error::http("fetching the credential issuer metadata"))?;
        let credential_issuer_metadata = CredentialIssuerMetadata::try_from(object)
            .map_err(|e| crate::Error::InvalidMetadata(format!("{url}: {e:#}")))?;

        let server = credential_issuer_metadata
            .authorization_servers()
            .into_iter()
            .next()
            .unwrap_or_else(|| credential_issuer.to_owned());
        let url = well_known(&server, AUTHORIZATION_SERVER_WELL_KNOWN);
        let authorization_server_metadata = match get_json(http_client, &url).await {
            Ok(object) => Some(AuthorizationServerMetadata(object)),
            Err(e) => {
                debug!("no authorization server metadata at {url}: {e:#}");
                None
            }
        };

        Self::new(credential_issuer_metadata, authorization_server_metadata)
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn token_endpoint(&self) -> &Url {
        &self.token_endpoint
    }

    pub fn credential_endpoint(&self) -> &Url {
        &self.credential_endpoint
    }

    pub fn authorization_endpoint(&self) -> Option<&Url> {
        self.authorization_endpoint.as_ref()
    }

    pub fn pushed_authorization_request_endpoint(&self) -> Option<&Url> {
        self.pushed_authorization_request_endpoint.as_ref()
    }

    pub fn require_pushed_authorization_requests(&self) -> bool {
        self.require_pushed_authorization_requests
    }

    pub fn authorization_server(&self) -> Option<&str> {
        self.authorization_server.as_deref()
    }

    pub fn credential_issuer_metadata(&self) -> &CredentialIssuerMetadata {
        &self.credential_issuer_metadata
    }
}

fn well_known(base: &str, path: &str) -> String {
    format!("{}/{path}", base.trim_end_matches('/'))
}

/// Issuer display entries matching the preferred locales, in locale preference order.
///
/// Entries without a locale always match and sort last. No preferred locales means every entry
/// matches.
pub fn issuer_displays(
    metadata: &CredentialIssuerMetadata,
    preferred_locales: &[&str],
) -> Vec<MetadataDisplay> {
    let rank = |display: &MetadataDisplay| match &display.locale {
        Some(locale) => preferred_locales
            .iter()
            .position(|preferred| *preferred == locale.as_str())
            .unwrap_or(preferred_locales.len()),
        None => usize::MAX,
    };

    let mut displays: Vec<_> = metadata
        .display()
        .into_iter()
        .filter(|display| {
            preferred_locales.is_empty()
                || display
                    .locale
                    .as_deref()
                    .map_or(true, |locale| preferred_locales.contains(&locale))
        })
        .collect();
    displays.sort_by_key(rank);
    displays
}

/// The first display name of the issuer, or `url` when it has none.
pub fn issuer_name(url: &str, metadata: Option<&CredentialIssuerMetadata>) -> String {
    metadata
        .map(|metadata| issuer_displays(metadata, &[]))
        .unwrap_or_default()
        .into_iter()
        .find_map(|display| display.name)
        .unwrap_or_else(|| url.to_owned())
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    fn issuer_metadata(value: serde_json::Value) -> CredentialIssuerMetadata {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn merges_authorization_server_endpoints() {
        let issuer = issuer_metadata(json!({
            "credential_issuer": "https://issuer.example.com",
            "credential_endpoint": "https://issuer.example.com/credential",
            "token_endpoint": "https://issuer.example.com/token",
        }));
        let server = AuthorizationServerMetadata(
            json!({
                "issuer": "https://auth.example.com",
                "token_endpoint": "https://auth.example.com/token",
                "authorization_endpoint": "https://auth.example.com/authorize",
                "pushed_authorization_request_endpoint": "https://auth.example.com/par",
                "require_pushed_authorization_requests": true
            })
            .try_into()
            .unwrap(),
        );

        let metadata = EndpointMetadata::new(issuer, Some(server)).unwrap();
        assert_eq!(
            metadata.token_endpoint().as_str(),
            "https://issuer.example.com/token"
        );
        assert_eq!(
            metadata.authorization_endpoint().map(Url::as_str),
            Some("https://auth.example.com/authorize")
        );
        assert!(metadata.require_pushed_authorization_requests());
        assert_eq!(metadata.authorization_server(), Some("https://auth.example.com"));
    }

    #[test]
    fn token_endpoint_is_required_somewhere() {
        let issuer = issuer_metadata(json!({
            "credential_issuer": "https://issuer.example.com",
            "credential_endpoint": "https://issuer.example.com/credential",
        }));
        let err = EndpointMetadata::new(issuer, None).unwrap_err();
        assert!(matches!(err, crate::Error::InvalidMetadata(_)));
    }

    #[test]
    fn displays_follow_locale_preference() {
        let metadata = issuer_metadata(json!({
            "credential_issuer": "https://issuer.example.com",
            "credential_endpoint": "https://issuer.example.com/credential",
            "display": [
                { "name": "Issuer", "locale": "en-US" },
                { "name": "Aussteller", "locale": "de-DE" },
                { "name": "Default" },
                { "name": "Émetteur", "locale": "fr-FR" }
            ]
        }));

        let names: Vec<_> = issuer_displays(&metadata, &["de-DE", "en-US"])
            .into_iter()
            .filter_map(|d| d.name)
            .collect();
        assert_eq!(names, ["Aussteller", "Issuer", "Default"]);

        assert_eq!(issuer_name("https://issuer.example.com", Some(&metadata)), "Issuer");
        assert_eq!(
            issuer_name("https://issuer.example.com", None),
            "https://issuer.example.com"
        );
    }
}
