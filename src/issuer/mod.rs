use std::sync::Arc;

use anyhow::{anyhow, bail};
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    config::IssuerConfig,
    core::{
        credential::{CredentialRequest, CredentialResponse},
        credential_offer::{
            encode,
            parameters::{AuthorizationCodeGrant, CredentialIssuer, TxCode},
            CredentialOffer, CredentialOfferPayload, EncodeOptions,
        },
    },
    Error, Result,
};

use nonce::{CNonceState, IssuedNonce};
use offer::{generate_pin, CreateOfferOptions, CreatedOffer};
use session::{CredentialOfferSession, IssueStatus, Store};
use signer::{CredentialSigner, CredentialSignerArgs, ProofVerifier};

pub mod nonce;
pub mod offer;
pub mod session;
pub mod signer;

pub type SessionStore = dyn Store<String, CredentialOfferSession> + Send + Sync;
pub type NonceStore = dyn Store<String, CNonceState> + Send + Sync;

/// Grant presented at the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenGrant {
    PreAuthorizedCode {
        pre_authorized_code: String,
        tx_code: Option<String>,
    },
    AuthorizationCode {
        issuer_state: String,
    },
}

/// An OpenID4VCI credential issuer: offer sessions, `c_nonce` rotation and credential issuance.
///
/// Transport is left to the caller; each endpoint handler calls into the matching operation.
#[derive(Debug, Clone)]
pub struct Issuer {
    config: IssuerConfig,
    sessions: Arc<SessionStore>,
    nonces: Arc<NonceStore>,
    proof_verifier: Arc<dyn ProofVerifier + Send + Sync>,
    credential_signer: Arc<dyn CredentialSigner + Send + Sync>,
    /// Serializes read-modify-write cycles on stored sessions.
    session_lock: Arc<Mutex<()>>,
}

impl Issuer {
    /// Build a new issuer.
    pub fn builder() -> IssuerBuilder {
        IssuerBuilder::default()
    }

    pub fn config(&self) -> &IssuerConfig {
        &self.config
    }

    /// Create and store a credential offer session, returning the offer URI for the wallet.
    pub async fn create_credential_offer_uri(
        &self,
        options: CreateOfferOptions,
    ) -> Result<CreatedOffer> {
        let mut grants = options.grants.unwrap_or_default();
        if !grants.has_recognized_grant() {
            grants.authorization_code = Some(AuthorizationCodeGrant::default());
        }

        if let Some(grant) = grants.authorization_code.as_mut() {
            let issuer_state = grant.issuer_state.take();
            grant.issuer_state = Some(self.claim_identifier(issuer_state, "issuer_state").await?);
        }

        let mut user_pin = None;
        match grants.pre_authorized_code.as_mut() {
            Some(grant) => {
                let code = Some(std::mem::take(&mut grant.pre_authorized_code))
                    .filter(|code| !code.is_empty());
                grant.pre_authorized_code =
                    self.claim_identifier(code, "pre-authorized_code").await?;

                if grants_issuer_state(&grants.authorization_code)
                    == Some(grant.pre_authorized_code.as_str())
                {
                    return Err(Error::InvalidRequest(
                        "issuer_state and pre-authorized_code must differ".into(),
                    ));
                }

                let pin_required =
                    grant.tx_code.is_some() || grant.user_pin_required == Some(true);
                match (&options.pin, pin_required) {
                    (Some(pin), required) => {
                        if !required {
                            grant.tx_code = Some(TxCode {
                                input_mode: Some("numeric".into()),
                                length: u32::try_from(pin.len()).ok(),
                                description: None,
                            });
                        }
                        user_pin = Some(pin.clone());
                    }
                    (None, true) => {
                        user_pin = Some(generate_pin(
                            grant.tx_code.as_ref().and_then(|tx_code| tx_code.length),
                        ));
                    }
                    (None, false) => {}
                }
            }
            None if options.pin.is_some() => {
                warn!("a transaction code was given for an offer without a pre-authorized code grant, ignoring it");
            }
            None => {}
        }

        let credential_issuer = options
            .credential_issuer
            .unwrap_or_else(|| self.config.credential_issuer.identifier().to_owned());
        let credential_offer =
            CredentialOffer::new(CredentialIssuer(credential_issuer), options.offered, grants)
                .map_err(|e| Error::InvalidRequest(format!("{e:#}")))?;
        if credential_offer.offered().is_empty() {
            return Err(Error::InvalidRequest(
                "a credential offer must offer at least one credential".into(),
            ));
        }

        let uri = encode(
            &CredentialOfferPayload::from(credential_offer.clone()),
            &EncodeOptions {
                scheme: options
                    .scheme
                    .unwrap_or_else(|| self.config.offer_scheme.clone()),
                base_url: options.base_url,
                credential_offer_uri: options.credential_offer_uri,
            },
        )?;

        let now = Utc::now();
        let session = CredentialOfferSession {
            issuer_state: credential_offer.grants().issuer_state().map(ToOwned::to_owned),
            pre_authorized_code: credential_offer
                .grants()
                .pre_authorized_code()
                .map(ToOwned::to_owned),
            client_id: options.client_id,
            credential_offer,
            status: IssueStatus::OfferCreated,
            user_pin: user_pin.clone(),
            created_at: now,
            last_updated_at: now,
            error: None,
        };
        self.persist_new(&session).await?;
        debug!("credential offer session created");

        Ok(CreatedOffer {
            uri,
            session,
            user_pin,
        })
    }

    /// The wallet started the authorization code flow for the offer with this `issuer_state`.
    pub async fn authorization_initiated(
        &self,
        issuer_state: &str,
    ) -> Result<CredentialOfferSession> {
        let _guard = self.session_lock.lock().await;
        let mut session = self.load_session(issuer_state).await?;
        if session.issuer_state.as_deref() != Some(issuer_state) {
            return Err(Error::SessionNotFound(issuer_state.to_owned()));
        }
        self.transition(&mut session, IssueStatus::AuthorizationInitiated)?;
        self.persist(&session).await?;
        Ok(session)
    }

    /// An access token was issued for `grant`. Returns the first `c_nonce` of the session.
    pub async fn access_token_created(
        &self,
        grant: &TokenGrant,
        c_nonce: Option<String>,
    ) -> Result<IssuedNonce> {
        let _guard = self.session_lock.lock().await;
        let (key, mut session) = match grant {
            TokenGrant::PreAuthorizedCode {
                pre_authorized_code,
                tx_code,
            } => {
                let session = self.load_session(pre_authorized_code).await?;
                if session.pre_authorized_code.as_deref() != Some(pre_authorized_code.as_str())
                {
                    return Err(Error::InvalidGrant("unknown pre-authorized code".into()));
                }
                if let Some(pin) = &session.user_pin {
                    if tx_code.as_deref() != Some(pin.as_str()) {
                        return Err(Error::InvalidGrant(
                            "transaction code is missing or does not match".into(),
                        ));
                    }
                }
                (pre_authorized_code, session)
            }
            TokenGrant::AuthorizationCode { issuer_state } => {
                let session = self.load_session(issuer_state).await?;
                if session.issuer_state.as_deref() != Some(issuer_state.as_str()) {
                    return Err(Error::InvalidGrant("unknown issuer state".into()));
                }
                (issuer_state, session)
            }
        };

        self.transition(&mut session, IssueStatus::AccessTokenCreated)?;
        let issued = self.mint_nonce(c_nonce, key).await?;
        self.persist(&session).await?;
        Ok(issued)
    }

    /// Verify the proof of a credential request, sign the credential and rotate the `c_nonce`.
    ///
    /// A `c_nonce` is accepted once: of several requests racing on the same nonce exactly one
    /// succeeds, the others fail with [Error::StateMissing]. Nothing is written unless signing
    /// succeeded.
    pub async fn issue_credential(
        &self,
        request: &CredentialRequest,
        new_c_nonce: Option<String>,
    ) -> Result<CredentialResponse> {
        let Some(proof) = &request.proof else {
            return Err(Error::InvalidCredentialRequest(
                "a proof is required".into(),
            ));
        };
        let verification = self
            .proof_verifier
            .verify(proof)
            .await
            .map_err(Error::InvalidProof)?;

        let Some(nonce) = verification.nonce.clone() else {
            return Err(Error::InvalidProof(anyhow!(
                "the proof does not contain a nonce"
            )));
        };
        if new_c_nonce.as_deref() == Some(nonce.as_str()) {
            return Err(Error::InvalidRequest(
                "the next c_nonce must differ from the one being consumed".into(),
            ));
        }
        let nonce_state = self
            .nonces
            .get(&nonce)
            .await
            .map_err(Error::store("loading the c_nonce"))?
            .filter(|state| !state.is_expired(self.config.c_nonce_expires_in, Utc::now()))
            .ok_or_else(|| Error::StateMissing(nonce.clone()))?;

        let session = self.load_session(&nonce_state.session_key).await?;

        self.check_algorithm(verification.alg.as_deref())?;

        let credential = self
            .credential_signer
            .sign(CredentialSignerArgs {
                request,
                credential_offer: &session.credential_offer,
                session: &session,
                proof: &verification,
            })
            .await
            .map_err(Error::CredentialSigning)?;

        let _guard = self.session_lock.lock().await;
        // The session may have moved on while the credential was being signed.
        let mut session = self.load_session(&nonce_state.session_key).await?;
        self.transition(&mut session, IssueStatus::CredentialIssued)?;
        let issued = self
            .mint_nonce(new_c_nonce, &nonce_state.session_key)
            .await?;
        if self
            .nonces
            .delete(&nonce)
            .await
            .map_err(Error::store("consuming the c_nonce"))?
            .is_none()
        {
            debug!("c_nonce was consumed by a concurrent request");
            self.nonces
                .delete(&issued.c_nonce)
                .await
                .map_err(Error::store("discarding the unused c_nonce"))?;
            return Err(Error::StateMissing(nonce));
        }
        self.persist(&session).await?;
        debug!("credential issued, c_nonce rotated");

        Ok(CredentialResponse {
            credential,
            c_nonce: issued.c_nonce,
            c_nonce_expires_in: issued.c_nonce_expires_in,
        })
    }

    /// Move a session to `status`. Moving backwards or out of `ERROR` fails.
    pub async fn update_status(
        &self,
        key: &str,
        status: IssueStatus,
    ) -> Result<CredentialOfferSession> {
        let _guard = self.session_lock.lock().await;
        let mut session = self.load_session(key).await?;
        self.transition(&mut session, status)?;
        self.persist(&session).await?;
        Ok(session)
    }

    /// Move a session to `ERROR`, recording why.
    pub async fn fail_session(
        &self,
        key: &str,
        description: impl Into<String>,
    ) -> Result<CredentialOfferSession> {
        let _guard = self.session_lock.lock().await;
        let mut session = self.load_session(key).await?;
        self.transition(&mut session, IssueStatus::Error)?;
        session.error = Some(description.into());
        self.persist(&session).await?;
        Ok(session)
    }

    /// Look up a live session by its issuer state or pre-authorized code.
    pub async fn session(&self, key: &str) -> Result<CredentialOfferSession> {
        self.load_session(key).await
    }

    async fn load_session(&self, key: &str) -> Result<CredentialOfferSession> {
        let session = self
            .sessions
            .get(&key.to_owned())
            .await
            .map_err(Error::store("loading the session"))?;
        match session {
            Some(session) if !session.is_expired(self.config.session_ttl, Utc::now()) => {
                Ok(session)
            }
            Some(_) => {
                debug!("session expired");
                Err(Error::SessionNotFound(key.to_owned()))
            }
            None => Err(Error::SessionNotFound(key.to_owned())),
        }
    }

    async fn persist(&self, session: &CredentialOfferSession) -> Result<()> {
        for key in session.keys() {
            self.sessions
                .set(key.to_owned(), session.clone())
                .await
                .map_err(Error::store("storing the session"))?;
        }
        Ok(())
    }

    /// Store a new session under all of its keys, failing if any of them is already taken.
    async fn persist_new(&self, session: &CredentialOfferSession) -> Result<()> {
        let mut inserted = Vec::new();
        for key in session.keys() {
            let fresh = self
                .sessions
                .set_new(key.to_owned(), session.clone())
                .await
                .map_err(Error::store("storing the session"))?;
            if !fresh {
                for key in inserted {
                    self.sessions
                        .delete(&key)
                        .await
                        .map_err(Error::store("rolling back the session"))?;
                }
                return Err(Error::InvalidRequest(
                    "a session identifier is already in use".into(),
                ));
            }
            inserted.push(key.to_owned());
        }
        Ok(())
    }

    fn transition(&self, session: &mut CredentialOfferSession, next: IssueStatus) -> Result<()> {
        if !session.status.can_transition_to(next) {
            return Err(Error::InvalidStateTransition {
                from: session.status,
                to: next,
            });
        }
        if session.status != next {
            debug!("session status {} -> {next}", session.status);
        }
        session.status = next;
        session.last_updated_at = Utc::now();
        Ok(())
    }

    /// Store a fresh `c_nonce`. A supplied value must not be live already.
    async fn mint_nonce(&self, c_nonce: Option<String>, session_key: &str) -> Result<IssuedNonce> {
        let supplied = c_nonce.is_some();
        let mut c_nonce = c_nonce.unwrap_or_else(|| Uuid::new_v4().to_string());
        while !self
            .nonces
            .set_new(c_nonce.clone(), CNonceState::new(c_nonce.clone(), session_key))
            .await
            .map_err(Error::store("storing the c_nonce"))?
        {
            if supplied {
                return Err(Error::InvalidRequest("c_nonce is already in use".into()));
            }
            c_nonce = Uuid::new_v4().to_string();
        }
        Ok(IssuedNonce {
            c_nonce,
            c_nonce_expires_in: self.config.c_nonce_expires_in,
        })
    }

    /// Use the supplied identifier if it is free, otherwise draw fresh ones until one is.
    async fn claim_identifier(&self, supplied: Option<String>, name: &str) -> Result<String> {
        if let Some(id) = supplied {
            if self.is_taken(&id).await? {
                return Err(Error::InvalidRequest(format!("{name} is already in use")));
            }
            return Ok(id);
        }
        loop {
            let id = Uuid::new_v4().to_string();
            if !self.is_taken(&id).await? {
                return Ok(id);
            }
        }
    }

    async fn is_taken(&self, key: &str) -> Result<bool> {
        self.sessions
            .has(&key.to_owned())
            .await
            .map_err(Error::store("checking for an existing session"))
    }

    fn check_algorithm(&self, alg: Option<&str>) -> Result<()> {
        let alg = match alg {
            Some(alg) if !alg.is_empty() && !alg.eq_ignore_ascii_case("none") => alg,
            Some(alg) => {
                return Err(Error::Algorithm(format!(
                    "proofs must be signed, got '{alg}'"
                )))
            }
            None => {
                return Err(Error::Algorithm(
                    "the proof does not name its signing algorithm".into(),
                ))
            }
        };
        if let Some(supported) = &self.config.proof_signing_alg_values_supported {
            if !supported.iter().any(|s| s == alg) {
                return Err(Error::Algorithm(format!(
                    "'{alg}' is not among the supported proof signing algorithms"
                )));
            }
        }
        Ok(())
    }
}

fn grants_issuer_state(grant: &Option<AuthorizationCodeGrant>) -> Option<&str> {
    grant.as_ref()?.issuer_state.as_deref()
}

/// Builder struct for [Issuer].
#[derive(Debug, Clone, Default)]
pub struct IssuerBuilder {
    config: Option<IssuerConfig>,
    sessions: Option<Arc<SessionStore>>,
    nonces: Option<Arc<NonceStore>>,
    proof_verifier: Option<Arc<dyn ProofVerifier + Send + Sync>>,
    credential_signer: Option<Arc<dyn CredentialSigner + Send + Sync>>,
}

impl IssuerBuilder {
    /// Build the issuer.
    pub fn build(self) -> anyhow::Result<Issuer> {
        let Self {
            config,
            sessions,
            nonces,
            proof_verifier,
            credential_signer,
        } = self;

        let Some(config) = config else {
            bail!("config is required, see `with_config`")
        };

        let Some(sessions) = sessions else {
            bail!("session store is required, see `with_session_store`")
        };

        let Some(nonces) = nonces else {
            bail!("nonce store is required, see `with_nonce_store`")
        };

        let Some(proof_verifier) = proof_verifier else {
            bail!("proof verifier is required, see `with_proof_verifier`")
        };

        let Some(credential_signer) = credential_signer else {
            bail!("credential signer is required, see `with_credential_signer`")
        };

        Ok(Issuer {
            config,
            sessions,
            nonces,
            proof_verifier,
            credential_signer,
            session_lock: Arc::default(),
        })
    }

    pub fn with_config(mut self, config: IssuerConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the store that keeps [CredentialOfferSession]s, keyed by issuer state and
    /// pre-authorized code.
    pub fn with_session_store(mut self, sessions: Arc<SessionStore>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    /// Set the store that keeps the live `c_nonce`s.
    pub fn with_nonce_store(mut self, nonces: Arc<NonceStore>) -> Self {
        self.nonces = Some(nonces);
        self
    }

    pub fn with_proof_verifier(mut self, verifier: Arc<dyn ProofVerifier + Send + Sync>) -> Self {
        self.proof_verifier = Some(verifier);
        self
    }

    pub fn with_credential_signer(
        mut self,
        signer: Arc<dyn CredentialSigner + Send + Sync>,
    ) -> Self {
        self.credential_signer = Some(signer);
        self
    }
}
