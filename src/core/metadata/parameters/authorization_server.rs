use anyhow::{Error, Result};
use serde_json::Value as Json;
use url::Url;

use crate::core::object::TypedParameter;

#[derive(Debug, Clone)]
pub struct Issuer(pub String);

impl TypedParameter for Issuer {
    const KEY: &'static str = "issuer";
}

impl TryFrom<Json> for Issuer {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        Ok(Self(serde_json::from_value(value)?))
    }
}

impl From<Issuer> for Json {
    fn from(value: Issuer) -> Json {
        Json::String(value.0)
    }
}

#[derive(Debug, Clone)]
pub struct AuthorizationEndpoint(pub Url);

impl TypedParameter for AuthorizationEndpoint {
    const KEY: &'static str = "authorization_endpoint";
}

impl TryFrom<Json> for AuthorizationEndpoint {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        Ok(Self(serde_json::from_value(value)?))
    }
}

impl From<AuthorizationEndpoint> for Json {
    fn from(value: AuthorizationEndpoint) -> Json {
        Json::String(value.0.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct TokenEndpoint(pub Url);

impl TypedParameter for TokenEndpoint {
    const KEY: &'static str = "token_endpoint";
}

impl TryFrom<Json> for TokenEndpoint {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        Ok(Self(serde_json::from_value(value)?))
    }
}

impl From<TokenEndpoint> for Json {
    fn from(value: TokenEndpoint) -> Json {
        Json::String(value.0.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct PushedAuthorizationRequestEndpoint(pub Url);

impl TypedParameter for PushedAuthorizationRequestEndpoint {
    const KEY: &'static str = "pushed_authorization_request_endpoint";
}

impl TryFrom<Json> for PushedAuthorizationRequestEndpoint {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        Ok(Self(serde_json::from_value(value)?))
    }
}

impl From<PushedAuthorizationRequestEndpoint> for Json {
    fn from(value: PushedAuthorizationRequestEndpoint) -> Json {
        Json::String(value.0.to_string())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RequirePushedAuthorizationRequests(pub bool);

impl TypedParameter for RequirePushedAuthorizationRequests {
    const KEY: &'static str = "require_pushed_authorization_requests";
}

impl TryFrom<Json> for RequirePushedAuthorizationRequests {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        Ok(Self(serde_json::from_value(value)?))
    }
}

impl From<RequirePushedAuthorizationRequests> for Json {
    fn from(value: RequirePushedAuthorizationRequests) -> Json {
        Json::Bool(value.0)
    }
}
