use serde::Deserialize;
use url::Url;

use crate::core::credential_offer::DEFAULT_OFFER_SCHEME;

const DEFAULT_TTL_SECONDS: u64 = 300;

/// Issuer settings, typically deserialized from the service configuration.
///
/// ```
/// # use oid4vci::config::IssuerConfig;
/// let config: IssuerConfig = serde_json::from_value(serde_json::json!({
///     "credential_issuer": "https://issuer.example.com"
/// }))
/// .unwrap();
/// assert_eq!(config.session_ttl, 300);
/// assert_eq!(config.offer_scheme, "openid-credential-offer");
/// ```
#[derive(Deserialize, Debug, Clone)]
pub struct IssuerConfig {
    pub credential_issuer: BaseUrl,
    /// Seconds a session stays valid after its last update.
    #[serde(default = "default_ttl")]
    pub session_ttl: u64,
    /// Seconds a `c_nonce` stays valid after it was issued.
    #[serde(default = "default_ttl")]
    pub c_nonce_expires_in: u64,
    #[serde(default = "default_offer_scheme")]
    pub offer_scheme: String,
    /// When set, proofs must be signed with one of these algorithms.
    #[serde(default)]
    pub proof_signing_alg_values_supported: Option<Vec<String>>,
}

impl IssuerConfig {
    pub fn new(credential_issuer: BaseUrl) -> Self {
        Self {
            credential_issuer,
            session_ttl: DEFAULT_TTL_SECONDS,
            c_nonce_expires_in: DEFAULT_TTL_SECONDS,
            offer_scheme: default_offer_scheme(),
            proof_signing_alg_values_supported: None,
        }
    }
}

fn default_ttl() -> u64 {
    DEFAULT_TTL_SECONDS
}

fn default_offer_scheme() -> String {
    DEFAULT_OFFER_SCHEME.to_owned()
}

/// A url that is always a base (can be safely join()'ed with further path elements without
/// mangling).
#[derive(Deserialize, Debug, Clone, Hash, PartialEq, Eq)]
#[serde(try_from = "String")]
pub struct BaseUrl(Url);

impl BaseUrl {
    /// The URL as a credential issuer identifier, without the trailing slash.
    pub fn identifier(&self) -> &str {
        self.0.as_str().trim_end_matches('/')
    }
}

impl std::ops::Deref for BaseUrl {
    type Target = Url;

    fn deref(&self) -> &Url {
        &self.0
    }
}

impl TryFrom<String> for BaseUrl {
    type Error = url::ParseError;

    fn try_from(mut url: String) -> Result<Self, Self::Error> {
        // Make URL a base.
        if !url.ends_with('/') {
            url += "/"
        }
        url.parse().map(Self)
    }
}

impl TryFrom<&str> for BaseUrl {
    type Error = url::ParseError;

    fn try_from(url: &str) -> Result<Self, Self::Error> {
        url.to_owned().try_into()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn base_url_joins_well_known_paths() {
        let base = BaseUrl::try_from("https://issuer.example.com/tenant").unwrap();
        assert_eq!(base.identifier(), "https://issuer.example.com/tenant");
        assert_eq!(
            base.join(".well-known/openid-credential-issuer")
                .unwrap()
                .as_str(),
            "https://issuer.example.com/tenant/.well-known/openid-credential-issuer"
        );
    }
}
