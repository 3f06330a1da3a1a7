use anyhow::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use url::Url;

use crate::core::object::TypedParameter;

#[derive(Debug, Clone)]
pub struct CredentialEndpoint(pub Url);

impl TypedParameter for CredentialEndpoint {
    const KEY: &'static str = "credential_endpoint";
}

impl TryFrom<Json> for CredentialEndpoint {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        Ok(Self(serde_json::from_value(value)?))
    }
}

impl From<CredentialEndpoint> for Json {
    fn from(value: CredentialEndpoint) -> Json {
        Json::String(value.0.to_string())
    }
}

/// `authorization_servers` of the credential issuer metadata.
///
/// Older drafts carry a single `authorization_server` string instead, see
/// [LegacyAuthorizationServer].
#[derive(Debug, Clone)]
pub struct AuthorizationServers(pub Vec<String>);

impl TypedParameter for AuthorizationServers {
    const KEY: &'static str = "authorization_servers";
}

impl TryFrom<Json> for AuthorizationServers {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        Ok(Self(serde_json::from_value(value)?))
    }
}

impl From<AuthorizationServers> for Json {
    fn from(value: AuthorizationServers) -> Json {
        value.0.into()
    }
}

#[derive(Debug, Clone)]
pub struct LegacyAuthorizationServer(pub String);

impl TypedParameter for LegacyAuthorizationServer {
    const KEY: &'static str = "authorization_server";
}

impl TryFrom<Json> for LegacyAuthorizationServer {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        Ok(Self(serde_json::from_value(value)?))
    }
}

impl From<LegacyAuthorizationServer> for Json {
    fn from(value: LegacyAuthorizationServer) -> Json {
        Json::String(value.0)
    }
}

/// Draft 13 `credential_configurations_supported`, keyed by configuration identifier.
#[derive(Debug, Clone, Default)]
pub struct CredentialConfigurationsSupported(pub Map<String, Json>);

impl TypedParameter for CredentialConfigurationsSupported {
    const KEY: &'static str = "credential_configurations_supported";
}

impl TryFrom<Json> for CredentialConfigurationsSupported {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        Ok(Self(serde_json::from_value(value)?))
    }
}

impl From<CredentialConfigurationsSupported> for Json {
    fn from(value: CredentialConfigurationsSupported) -> Json {
        Json::Object(value.0)
    }
}

/// `credentials_supported` of drafts 8 to 12.
#[derive(Debug, Clone)]
pub enum CredentialsSupported {
    /// Drafts 11 and 12: an array of configurations.
    List(Vec<Json>),
    /// Draft 8: an object keyed by credential type, each with per-format details.
    ByType(Map<String, Json>),
}

impl TypedParameter for CredentialsSupported {
    const KEY: &'static str = "credentials_supported";
}

impl TryFrom<Json> for CredentialsSupported {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        match value {
            Json::Array(list) => Ok(Self::List(list)),
            Json::Object(by_type) => Ok(Self::ByType(by_type)),
            other => anyhow::bail!("expected an array or an object, found {other}"),
        }
    }
}

impl From<CredentialsSupported> for Json {
    fn from(value: CredentialsSupported) -> Json {
        match value {
            CredentialsSupported::List(list) => Json::Array(list),
            CredentialsSupported::ByType(by_type) => Json::Object(by_type),
        }
    }
}

/// One entry of a `display` array.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataDisplay {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(flatten)]
    pub additional_parameters: Map<String, Json>,
}

#[derive(Debug, Clone, Default)]
pub struct Display(pub Vec<MetadataDisplay>);

impl TypedParameter for Display {
    const KEY: &'static str = "display";
}

impl TryFrom<Json> for Display {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        Ok(Self(serde_json::from_value(value)?))
    }
}

impl TryFrom<Display> for Json {
    type Error = Error;

    fn try_from(value: Display) -> Result<Self, Self::Error> {
        Ok(serde_json::to_value(value.0)?)
    }
}
