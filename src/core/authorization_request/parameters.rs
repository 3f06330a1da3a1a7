use std::fmt;

use base64::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use sha2::{Digest, Sha256};

use crate::core::object::UntypedObject;

const OPENID_CREDENTIAL: &str = "openid_credential";
const LOCATIONS: &str = "locations";
const TYPE: &str = "type";

pub const OPENID_SCOPE: &str = "openid";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodeChallengeMethod {
    #[serde(rename = "plain")]
    Plain,
    #[default]
    S256,
}

impl fmt::Display for CodeChallengeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodeChallengeMethod::Plain => "plain",
            CodeChallengeMethod::S256 => "S256",
        }
        .fmt(f)
    }
}

/// A PKCE verifier and its challenge.
///
/// The verifier is a secret: it is kept out of [Debug] output and never logged.
#[derive(Clone, PartialEq, Eq)]
pub struct Pkce {
    code_verifier: String,
    code_challenge: String,
    code_challenge_method: CodeChallengeMethod,
    disabled: bool,
}

impl Pkce {
    /// A fresh random verifier with its `S256` challenge.
    pub fn generate() -> Self {
        let bytes: [u8; 32] = rand::random();
        Self::from_verifier(BASE64_URL_SAFE_NO_PAD.encode(bytes))
    }

    /// The `S256` challenge of an existing verifier.
    pub fn from_verifier(code_verifier: impl Into<String>) -> Self {
        let code_verifier = code_verifier.into();
        let code_challenge = BASE64_URL_SAFE_NO_PAD.encode(Sha256::digest(code_verifier.as_bytes()));
        Self {
            code_verifier,
            code_challenge,
            code_challenge_method: CodeChallengeMethod::S256,
            disabled: false,
        }
    }

    /// A challenge computed elsewhere.
    pub fn new(
        code_verifier: impl Into<String>,
        code_challenge: impl Into<String>,
        code_challenge_method: CodeChallengeMethod,
    ) -> Self {
        Self {
            code_verifier: code_verifier.into(),
            code_challenge: code_challenge.into(),
            code_challenge_method,
            disabled: false,
        }
    }

    /// No PKCE parameters are sent.
    pub fn disabled() -> Self {
        Self {
            code_verifier: String::new(),
            code_challenge: String::new(),
            code_challenge_method: CodeChallengeMethod::S256,
            disabled: true,
        }
    }

    pub fn code_verifier(&self) -> &str {
        &self.code_verifier
    }

    pub fn code_challenge(&self) -> &str {
        &self.code_challenge
    }

    pub fn code_challenge_method(&self) -> CodeChallengeMethod {
        self.code_challenge_method
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }
}

impl fmt::Debug for Pkce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pkce")
            .field("code_verifier", &"<redacted>")
            .field("code_challenge", &self.code_challenge)
            .field("code_challenge_method", &self.code_challenge_method)
            .field("disabled", &self.disabled)
            .finish()
    }
}

/// How the authorization request reaches the authorization server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParMode {
    /// Always push; fail if the server has no PAR endpoint.
    Require,
    /// Push when the server has a PAR endpoint.
    #[default]
    Auto,
    /// Never push.
    Never,
}

/// One `authorization_details` entry (RFC 9396) describing a credential.
///
/// Every member is kept as given; only `type` and `locations` are managed here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationDetail(pub UntypedObject);

impl AuthorizationDetail {
    /// An `openid_credential` detail built from a credential configuration or inline offer
    /// object, keeping all of its members.
    pub fn from_credential(object: UntypedObject) -> Self {
        let mut detail = Self(object);
        detail
            .0
            .insert_raw(TYPE, Json::String(OPENID_CREDENTIAL.into()));
        detail
    }

    pub fn detail_type(&self) -> Option<&str> {
        self.0.get_raw(TYPE)?.as_str()
    }

    pub fn format(&self) -> Option<&str> {
        self.0.get_raw("format")?.as_str()
    }

    pub fn locations(&self) -> Vec<&str> {
        match self.0.get_raw(LOCATIONS) {
            Some(Json::Array(locations)) => locations.iter().filter_map(Json::as_str).collect(),
            Some(Json::String(location)) => vec![location.as_str()],
            _ => vec![],
        }
    }

    /// Add `location` to `locations` unless it is already listed.
    pub fn add_location(&mut self, location: &str) {
        let mut locations: Vec<Json> = match self.0.as_map().get(LOCATIONS) {
            Some(Json::Array(locations)) => locations.clone(),
            Some(Json::String(location)) => vec![Json::String(location.clone())],
            _ => vec![],
        };
        if !locations.iter().any(|l| l.as_str() == Some(location)) {
            locations.push(Json::String(location.to_owned()));
        }
        self.0.insert_raw(LOCATIONS, Json::Array(locations));
    }
}

/// Make sure `openid` is the first scope and appears exactly once.
pub fn with_openid_scope(scope: Option<&str>) -> String {
    std::iter::once(OPENID_SCOPE)
        .chain(
            scope
                .unwrap_or_default()
                .split_whitespace()
                .filter(|s| *s != OPENID_SCOPE),
        )
        .collect::<Vec<_>>()
        .join(" ")
}

/// Successful response of a pushed authorization request (RFC 9126).
#[derive(Debug, Clone, Deserialize)]
pub struct PushedAuthorizationResponse {
    pub request_uri: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
}
