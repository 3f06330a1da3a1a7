use serde::{Deserialize, Serialize};

use crate::core::credential_offer::{parameters::Grants, OfferedCredentials};

use super::session::CredentialOfferSession;

const DEFAULT_PIN_LENGTH: u32 = 4;

/// Input of [Issuer::create_credential_offer_uri](super::Issuer::create_credential_offer_uri).
///
/// Identifiers left empty in `grants` are generated; so is the transaction code when the
/// pre-authorized grant carries a `tx_code` and no `pin` is given.
#[derive(Debug, Clone)]
#[must_use]
pub struct CreateOfferOptions {
    pub(crate) offered: OfferedCredentials,
    pub(crate) grants: Option<Grants>,
    pub(crate) credential_issuer: Option<String>,
    pub(crate) client_id: Option<String>,
    pub(crate) pin: Option<String>,
    pub(crate) scheme: Option<String>,
    pub(crate) base_url: Option<String>,
    pub(crate) credential_offer_uri: Option<String>,
}

impl CreateOfferOptions {
    pub fn new(offered: OfferedCredentials) -> Self {
        Self {
            offered,
            grants: None,
            credential_issuer: None,
            client_id: None,
            pin: None,
            scheme: None,
            base_url: None,
            credential_offer_uri: None,
        }
    }

    pub fn with_grants(mut self, grants: Grants) -> Self {
        self.grants = Some(grants);
        self
    }

    /// Defaults to the configured credential issuer.
    pub fn with_credential_issuer(mut self, credential_issuer: impl Into<String>) -> Self {
        self.credential_issuer = Some(credential_issuer.into());
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn with_pin(mut self, pin: impl Into<String>) -> Self {
        self.pin = Some(pin.into());
        self
    }

    /// Defaults to the configured offer scheme.
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = Some(scheme.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Offer by reference: the wallet fetches the offer object from this URL.
    pub fn with_credential_offer_uri(mut self, uri: impl Into<String>) -> Self {
        self.credential_offer_uri = Some(uri.into());
        self
    }
}

/// A freshly stored credential offer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedOffer {
    pub uri: String,
    pub session: CredentialOfferSession,
    /// Transaction code to hand to the user out of band.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_pin: Option<String>,
}

/// A random numeric transaction code.
pub(crate) fn generate_pin(length: Option<u32>) -> String {
    use rand::Rng;

    let mut rng = rand::thread_rng();
    (0..length.filter(|l| *l > 0).unwrap_or(DEFAULT_PIN_LENGTH))
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}
