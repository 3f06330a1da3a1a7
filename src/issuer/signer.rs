use std::fmt::Debug;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::core::{
    credential::{CredentialRequest, Proof},
    credential_offer::CredentialOffer,
};

use super::session::CredentialOfferSession;

/// Key the issued credential is bound to, as established by the proof.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HolderBinding {
    Kid(String),
    Jwk(Json),
    Did(String),
}

/// Outcome of a successful proof verification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProofVerification {
    /// `alg` of the proof header.
    pub alg: Option<String>,
    pub kid: Option<String>,
    /// `nonce` claim of the proof, which must name a live `c_nonce`.
    pub nonce: Option<String>,
    pub holder_binding: Option<HolderBinding>,
}

/// Checks the signature and claims of a key proof.
///
/// Errors returned here are reported to the wallet as an invalid proof.
#[async_trait]
pub trait ProofVerifier: Debug {
    async fn verify(&self, proof: &Proof) -> Result<ProofVerification>;
}

/// Everything known about the credential to be signed.
#[derive(Debug, Clone, Copy)]
pub struct CredentialSignerArgs<'a> {
    pub request: &'a CredentialRequest,
    pub credential_offer: &'a CredentialOffer,
    pub session: &'a CredentialOfferSession,
    pub proof: &'a ProofVerification,
}

/// Produces the credential returned to the wallet.
#[async_trait]
pub trait CredentialSigner: Debug {
    async fn sign(&self, args: CredentialSignerArgs<'_>) -> Result<Json>;
}
