use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use super::{
    credential_offer::{
        codec::{self, OfferCodec},
        parameters::{
            CredentialConfigurationIds, Credentials, Grants, LegacyCredentialType, LegacyIssuer,
        },
    },
    object::{TypedParameter, UntypedObject},
};

/// Revision of the OID4VCI specification that a payload follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Version {
    /// Draft 9 and earlier: flat query parameters.
    #[serde(rename = "1.0-09")]
    V1_0_09,
    /// Draft 11: `credential_offer` JSON with inline credential objects.
    #[serde(rename = "1.0-11")]
    V1_0_11,
    /// Draft 12: `credential_offer` JSON referencing credentials by identifier.
    #[serde(rename = "1.0-12")]
    V1_0_12,
    /// Draft 13: `credential_configuration_ids` and `tx_code`.
    #[serde(rename = "1.0-13")]
    V1_0_13,
}

const FLAT_PARAMETERS: [&str; 4] = ["issuer", "credential_type", "initiate_issuance", "op_state"];

impl Version {
    /// Detect the version from the query of a credential offer URI.
    ///
    /// By-reference offers cannot be inspected before they are fetched and are reported as
    /// [Version::V1_0_11], the first revision to support them; see [Version::detect_payload].
    pub fn detect(uri: &str) -> Version {
        let pairs = codec::query_pairs(uri);

        if pairs.iter().any(|(key, _)| key == codec::CREDENTIAL_OFFER_URI) {
            return Version::V1_0_11;
        }

        if let Some((_, offer)) = pairs.iter().find(|(key, _)| key == codec::CREDENTIAL_OFFER) {
            return serde_json::from_str::<Json>(offer)
                .ok()
                .and_then(|json| UntypedObject::try_from(json).ok())
                .map(|object| Version::detect_payload(&object).max(Version::V1_0_11))
                .unwrap_or(Version::V1_0_11);
        }

        if pairs
            .iter()
            .any(|(key, _)| FLAT_PARAMETERS.contains(&key.as_str()))
        {
            return Version::V1_0_09;
        }

        Version::V1_0_13
    }

    /// Detect the version from the shape of a credential offer object.
    pub fn detect_payload(object: &UntypedObject) -> Version {
        if object.contains::<CredentialConfigurationIds>() {
            return Version::V1_0_13;
        }

        let tx_code = object
            .get::<Grants>()
            .and_then(Result::ok)
            .and_then(|grants| grants.pre_authorized_code)
            .is_some_and(|grant| grant.tx_code.is_some());
        if tx_code {
            return Version::V1_0_13;
        }

        if let Some(Json::Array(credentials)) = object.get_raw(Credentials::KEY) {
            if credentials.iter().all(Json::is_string) {
                return Version::V1_0_12;
            }
            return Version::V1_0_11;
        }

        if object.contains::<LegacyIssuer>() || object.contains::<LegacyCredentialType>() {
            return Version::V1_0_09;
        }

        Version::V1_0_13
    }

    /// The wire strategy for this version.
    pub(crate) fn codec(self) -> &'static dyn OfferCodec {
        codec::for_version(self)
    }

    /// Whether issuer metadata of this version keys credential configurations by identifier.
    pub fn uses_configuration_map(self) -> bool {
        self >= Version::V1_0_13
    }
}

impl Default for Version {
    fn default() -> Self {
        Version::V1_0_13
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Version::V1_0_09 => "1.0-09",
            Version::V1_0_11 => "1.0-11",
            Version::V1_0_12 => "1.0-12",
            Version::V1_0_13 => "1.0-13",
        }
        .fmt(f)
    }
}
