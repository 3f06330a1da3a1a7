use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

/// Request to the credential endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CredentialRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof: Option<Proof>,
    /// Format specific members, such as `credential_definition` or `vct`.
    #[serde(flatten)]
    pub additional_parameters: Map<String, Json>,
}

/// Proof of possession of the key the credential will be bound to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proof {
    pub proof_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt: Option<String>,
    #[serde(flatten)]
    pub additional_parameters: Map<String, Json>,
}

impl Proof {
    pub fn jwt(jwt: impl Into<String>) -> Self {
        Self {
            proof_type: "jwt".into(),
            jwt: Some(jwt.into()),
            additional_parameters: Map::new(),
        }
    }
}

/// Successful response of the credential endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialResponse {
    pub credential: Json,
    /// The nonce the next proof has to be bound to.
    pub c_nonce: String,
    pub c_nonce_expires_in: u64,
}
