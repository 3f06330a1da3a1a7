use anyhow::{bail, Error};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

use crate::core::object::{TypedParameter, UntypedObject};

pub const AUTHORIZATION_CODE_GRANT: &str = "authorization_code";
pub const PRE_AUTHORIZED_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:pre-authorized_code";

/// `credential_issuer` of a credential offer.
///
/// Kept as written by the issuer: parsing into a [url::Url] would append a trailing slash and
/// change the encoded offer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialIssuer(pub String);

impl TypedParameter for CredentialIssuer {
    const KEY: &'static str = "credential_issuer";
}

impl TryFrom<Json> for CredentialIssuer {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        Ok(Self(serde_json::from_value(value)?))
    }
}

impl From<CredentialIssuer> for Json {
    fn from(value: CredentialIssuer) -> Self {
        Json::String(value.0)
    }
}

/// `credential_configuration_ids` of a credential offer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialConfigurationIds(pub Vec<String>);

impl TypedParameter for CredentialConfigurationIds {
    const KEY: &'static str = "credential_configuration_ids";
}

impl TryFrom<Json> for CredentialConfigurationIds {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        Ok(Self(serde_json::from_value(value)?))
    }
}

impl From<CredentialConfigurationIds> for Json {
    fn from(value: CredentialConfigurationIds) -> Self {
        value.0.into()
    }
}

/// One entry of the `credentials` array of a credential offer: an identifier into the issuer
/// metadata, or an inline credential object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OfferedCredential {
    Id(String),
    Object(UntypedObject),
}

impl OfferedCredential {
    pub fn id(&self) -> Option<&str> {
        match self {
            OfferedCredential::Id(id) => Some(id),
            OfferedCredential::Object(_) => None,
        }
    }
}

/// `credentials` of a credential offer.
#[derive(Debug, Clone, PartialEq)]
pub struct Credentials(pub Vec<OfferedCredential>);

impl TypedParameter for Credentials {
    const KEY: &'static str = "credentials";
}

impl TryFrom<Json> for Credentials {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        Ok(Self(serde_json::from_value(value)?))
    }
}

impl TryFrom<Credentials> for Json {
    type Error = Error;

    fn try_from(value: Credentials) -> Result<Self, Self::Error> {
        Ok(serde_json::to_value(value.0)?)
    }
}

/// `tx_code` of a pre-authorized code grant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxCode {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationCodeGrant {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_server: Option<String>,
    #[serde(flatten)]
    pub additional_parameters: Map<String, Json>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreAuthorizedCodeGrant {
    #[serde(rename = "pre-authorized_code")]
    pub pre_authorized_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_code: Option<TxCode>,
    /// Pre-draft 13 flag, superseded by `tx_code`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_pin_required: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_server: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,
    #[serde(flatten)]
    pub additional_parameters: Map<String, Json>,
}

/// `grants` of a credential offer.
///
/// Grant types other than the authorization code and pre-authorized code grants are kept in
/// `other` and written back unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Grants {
    #[serde(
        rename = "authorization_code",
        skip_serializing_if = "Option::is_none"
    )]
    pub authorization_code: Option<AuthorizationCodeGrant>,
    #[serde(
        rename = "urn:ietf:params:oauth:grant-type:pre-authorized_code",
        skip_serializing_if = "Option::is_none"
    )]
    pub pre_authorized_code: Option<PreAuthorizedCodeGrant>,
    #[serde(flatten)]
    pub other: Map<String, Json>,
}

impl Grants {
    /// Whether at least one grant type this crate understands is present.
    pub fn has_recognized_grant(&self) -> bool {
        self.authorization_code.is_some() || self.pre_authorized_code.is_some()
    }

    pub fn issuer_state(&self) -> Option<&str> {
        self.authorization_code.as_ref()?.issuer_state.as_deref()
    }

    pub fn pre_authorized_code(&self) -> Option<&str> {
        self.pre_authorized_code
            .as_ref()
            .map(|grant| grant.pre_authorized_code.as_str())
    }
}

impl TypedParameter for Grants {
    const KEY: &'static str = "grants";
}

impl TryFrom<Json> for Grants {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        Ok(serde_json::from_value(value)?)
    }
}

impl TryFrom<Grants> for Json {
    type Error = Error;

    fn try_from(value: Grants) -> Result<Self, Self::Error> {
        Ok(serde_json::to_value(value)?)
    }
}

/// `client_id` carried at the top level of some credential offers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferClientId(pub String);

impl TypedParameter for OfferClientId {
    const KEY: &'static str = "client_id";
}

impl TryFrom<Json> for OfferClientId {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        Ok(Self(serde_json::from_value(value)?))
    }
}

impl From<OfferClientId> for Json {
    fn from(value: OfferClientId) -> Self {
        Json::String(value.0)
    }
}

/// Draft 9 `issuer` query parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyIssuer(pub String);

impl TypedParameter for LegacyIssuer {
    const KEY: &'static str = "issuer";
}

impl TryFrom<Json> for LegacyIssuer {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        Ok(Self(serde_json::from_value(value)?))
    }
}

impl From<LegacyIssuer> for Json {
    fn from(value: LegacyIssuer) -> Self {
        Json::String(value.0)
    }
}

/// Draft 9 `credential_type` query parameter, repeated once per type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyCredentialType(pub Vec<String>);

impl TypedParameter for LegacyCredentialType {
    const KEY: &'static str = "credential_type";
}

impl TryFrom<Json> for LegacyCredentialType {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        match value {
            Json::String(single) => Ok(Self(vec![single])),
            other => Ok(Self(serde_json::from_value(other)?)),
        }
    }
}

impl From<LegacyCredentialType> for Json {
    fn from(value: LegacyCredentialType) -> Self {
        value.0.into()
    }
}

/// Draft 9 `op_state` query parameter, the predecessor of `issuer_state`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpState(pub String);

impl TypedParameter for OpState {
    const KEY: &'static str = "op_state";
}

impl TryFrom<Json> for OpState {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        Ok(Self(serde_json::from_value(value)?))
    }
}

impl From<OpState> for Json {
    fn from(value: OpState) -> Self {
        Json::String(value.0)
    }
}

/// Draft 9 `pre-authorized_code` query parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyPreAuthorizedCode(pub String);

impl TypedParameter for LegacyPreAuthorizedCode {
    const KEY: &'static str = "pre-authorized_code";
}

impl TryFrom<Json> for LegacyPreAuthorizedCode {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        Ok(Self(serde_json::from_value(value)?))
    }
}

impl From<LegacyPreAuthorizedCode> for Json {
    fn from(value: LegacyPreAuthorizedCode) -> Self {
        Json::String(value.0)
    }
}

/// Draft 9 `user_pin_required` query parameter.
///
/// Query strings carry it as `"true"`/`"false"`, JSON payloads as a boolean.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserPinRequired(pub bool);

impl TypedParameter for UserPinRequired {
    const KEY: &'static str = "user_pin_required";
}

impl TryFrom<Json> for UserPinRequired {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        match value {
            Json::Bool(b) => Ok(Self(b)),
            Json::String(s) if s == "true" => Ok(Self(true)),
            Json::String(s) if s == "false" => Ok(Self(false)),
            other => bail!("expected a boolean, found {other}"),
        }
    }
}

impl From<UserPinRequired> for Json {
    fn from(value: UserPinRequired) -> Self {
        Json::Bool(value.0)
    }
}
