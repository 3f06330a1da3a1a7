use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use oid4vci::{
    config::{BaseUrl, IssuerConfig},
    core::{
        credential::{CredentialRequest, Proof},
        credential_offer::{
            parameters::{Grants, PreAuthorizedCodeGrant, TxCode},
            OfferedCredentials,
        },
        metadata::EndpointMetadata,
    },
    issuer::{
        nonce::CNonceState,
        offer::CreateOfferOptions,
        session::{CredentialOfferSession, IssueStatus, MemoryStore, Store},
        signer::{
            CredentialSigner, CredentialSignerArgs, HolderBinding, ProofVerification,
            ProofVerifier,
        },
        Issuer, TokenGrant,
    },
    wallet::Wallet,
    Error,
};
use serde_json::{json, Value as Json};
use tokio::sync::Notify;


use mock::{
    authorization_server_metadata, metadata_client, CannedResponse, MockHttpClient, TestWallet,
    ISSUER,
};

/// Treats the `jwt` of a proof as plain JSON carrying `alg` and `nonce`.
#[derive(Debug)]
struct TestProofVerifier;

#[async_trait]
impl ProofVerifier for TestProofVerifier {
    async fn verify(&self, proof: &Proof) -> Result<ProofVerification> {
        let jwt = proof.jwt.as_deref().context("missing jwt")?;
        let claims: Json = serde_json::from_str(jwt).context("unreadable proof")?;
        if claims["forged"] == json!(true) {
            bail!("signature mismatch")
        }
        Ok(ProofVerification {
            alg: claims["alg"].as_str().map(ToOwned::to_owned),
            kid: Some("did:example:holder#key-1".into()),
            nonce: claims["nonce"].as_str().map(ToOwned::to_owned),
            holder_binding: Some(HolderBinding::Did("did:example:holder".into())),
        })
    }
}

#[derive(Debug, Default)]
struct TestSigner {
    fail: AtomicBool,
    signed: AtomicUsize,
}

#[async_trait]
impl CredentialSigner for TestSigner {
    async fn sign(&self, args: CredentialSignerArgs<'_>) -> Result<Json> {
        tokio::task::yield_now().await;
        if self.fail.load(Ordering::SeqCst) {
            bail!("signing key unavailable")
        }
        self.signed.fetch_add(1, Ordering::SeqCst);
        Ok(json!({
            "issuer": args.credential_offer.credential_issuer(),
            "format": args.request.format,
            "holder": args.proof.holder_binding,
        }))
    }
}

/// Parks inside `sign` until released.
#[derive(Debug, Default)]
struct GatedSigner {
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl CredentialSigner for GatedSigner {
    async fn sign(&self, _: CredentialSignerArgs<'_>) -> Result<Json> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(json!({ "credential": "gated" }))
    }
}

type Sessions = MemoryStore<String, CredentialOfferSession>;
type Nonces = MemoryStore<String, CNonceState>;

fn issuer_with_stores(
    config: IssuerConfig,
    signer: Arc<dyn CredentialSigner + Send + Sync>,
    sessions: Sessions,
    nonces: Nonces,
) -> Issuer {
    Issuer::builder()
        .with_config(config)
        .with_session_store(Arc::new(sessions))
        .with_nonce_store(Arc::new(nonces))
        .with_proof_verifier(Arc::new(TestProofVerifier))
        .with_credential_signer(signer)
        .build()
        .unwrap()
}

fn issuer_with(config: IssuerConfig, signer: Arc<dyn CredentialSigner + Send + Sync>) -> Issuer {
    issuer_with_stores(config, signer, Sessions::new(), Nonces::new())
}

fn config() -> IssuerConfig {
    IssuerConfig::new(BaseUrl::try_from(ISSUER).unwrap())
}

fn issuer() -> (Issuer, Arc<TestSigner>) {
    let signer = Arc::new(TestSigner::default());
    (issuer_with(config(), signer.clone()), signer)
}

fn offered() -> OfferedCredentials {
    OfferedCredentials::ConfigurationIds(vec!["UniversityDegree".into()])
}

fn pre_authorized(tx_code: Option<TxCode>) -> Grants {
    Grants {
        pre_authorized_code: Some(PreAuthorizedCodeGrant {
            tx_code,
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn credential_request(nonce: &str, alg: &str) -> CredentialRequest {
    CredentialRequest {
        format: Some("jwt_vc_json".into()),
        proof: Some(Proof::jwt(json!({ "alg": alg, "nonce": nonce }).to_string())),
        ..Default::default()
    }
}

/// Create a pre-authorized offer and redeem it at the token endpoint.
async fn redeemed_offer(issuer: &Issuer) -> (String, String) {
    let created = issuer
        .create_credential_offer_uri(
            CreateOfferOptions::new(offered()).with_grants(pre_authorized(None)),
        )
        .await
        .unwrap();
    let code = created.session.pre_authorized_code.unwrap();
    let nonce = issuer
        .access_token_created(
            &TokenGrant::PreAuthorizedCode {
                pre_authorized_code: code.clone(),
                tx_code: None,
            },
            None,
        )
        .await
        .unwrap();
    (code, nonce.c_nonce)
}

#[tokio::test]
async fn pre_authorized_flow_issues_and_rotates_the_nonce() {
    let (issuer, signer) = issuer();

    let created = issuer
        .create_credential_offer_uri(
            CreateOfferOptions::new(offered()).with_grants(pre_authorized(Some(TxCode {
                input_mode: Some("numeric".into()),
                length: Some(6),
                description: None,
            }))),
        )
        .await
        .unwrap();

    let pin = created.user_pin.clone().unwrap();
    assert_eq!(pin.len(), 6);
    assert!(pin.chars().all(|c| c.is_ascii_digit()));
    assert_eq!(created.session.status, IssueStatus::OfferCreated);
    assert!(created
        .uri
        .starts_with("openid-credential-offer://?credential_offer="));

    let wallet = TestWallet {
        http_client: MockHttpClient::default(),
    };
    let offer = wallet.resolve_offer(&created.uri).await.unwrap();
    let code = offer.pre_authorized_code().unwrap().to_owned();
    assert!(offer.user_pin_required());
    assert_eq!(offer.credential_issuer(), ISSUER);
    assert_eq!(created.session.pre_authorized_code.as_deref(), Some(code.as_str()));

    let wrong_pin = issuer
        .access_token_created(
            &TokenGrant::PreAuthorizedCode {
                pre_authorized_code: code.clone(),
                tx_code: Some("not-the-pin".into()),
            },
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(wrong_pin, Error::InvalidGrant(_)));

    let first = issuer
        .access_token_created(
            &TokenGrant::PreAuthorizedCode {
                pre_authorized_code: code.clone(),
                tx_code: Some(pin),
            },
            Some("nonce-1".into()),
        )
        .await
        .unwrap();
    assert_eq!(first.c_nonce, "nonce-1");
    assert_eq!(first.c_nonce_expires_in, 300);

    let response = issuer
        .issue_credential(&credential_request("nonce-1", "ES256"), None)
        .await
        .unwrap();
    assert_eq!(response.credential["issuer"], json!(ISSUER));
    assert_eq!(response.credential["format"], json!("jwt_vc_json"));
    assert_ne!(response.c_nonce, "nonce-1");
    assert_eq!(signer.signed.load(Ordering::SeqCst), 1);

    let session = issuer.session(&code).await.unwrap();
    assert_eq!(session.status, IssueStatus::CredentialIssued);

    let replay = issuer
        .issue_credential(&credential_request("nonce-1", "ES256"), None)
        .await
        .unwrap_err();
    assert!(matches!(&replay, Error::StateMissing(nonce) if nonce == "nonce-1"));

    // Batch issuance continues with the rotated nonce.
    issuer
        .issue_credential(
            &credential_request(&response.c_nonce, "ES256"),
            Some("nonce-3".into()),
        )
        .await
        .unwrap();
    assert_eq!(signer.signed.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn authorization_code_flow_advances_monotonically() {
    let (issuer, _) = issuer();

    let created = issuer
        .create_credential_offer_uri(CreateOfferOptions::new(offered()))
        .await
        .unwrap();
    let issuer_state = created.session.issuer_state.clone().unwrap();
    assert!(created.session.pre_authorized_code.is_none());
    assert_eq!(
        created.session.credential_offer.grants().issuer_state(),
        Some(issuer_state.as_str())
    );

    let session = issuer
        .authorization_initiated(&issuer_state)
        .await
        .unwrap();
    assert_eq!(session.status, IssueStatus::AuthorizationInitiated);

    issuer
        .access_token_created(
            &TokenGrant::AuthorizationCode {
                issuer_state: issuer_state.clone(),
            },
            None,
        )
        .await
        .unwrap();

    let error = issuer
        .update_status(&issuer_state, IssueStatus::OfferCreated)
        .await
        .unwrap_err();
    assert!(matches!(
        error,
        Error::InvalidStateTransition {
            from: IssueStatus::AccessTokenCreated,
            to: IssueStatus::OfferCreated
        }
    ));

    let failed = issuer
        .fail_session(&issuer_state, "user cancelled")
        .await
        .unwrap();
    assert_eq!(failed.status, IssueStatus::Error);
    assert_eq!(failed.error.as_deref(), Some("user cancelled"));

    let error = issuer
        .update_status(&issuer_state, IssueStatus::CredentialIssued)
        .await
        .unwrap_err();
    assert!(matches!(error, Error::InvalidStateTransition { .. }));
}

#[tokio::test]
async fn supplied_identifiers_must_be_unused() {
    let (issuer, _) = issuer();
    let grants = Grants {
        authorization_code: Some(Default::default()),
        ..Default::default()
    };
    let mut taken = grants.clone();
    if let Some(grant) = taken.authorization_code.as_mut() {
        grant.issuer_state = Some("state-1".into());
    }

    issuer
        .create_credential_offer_uri(CreateOfferOptions::new(offered()).with_grants(taken.clone()))
        .await
        .unwrap();
    let error = issuer
        .create_credential_offer_uri(CreateOfferOptions::new(offered()).with_grants(taken))
        .await
        .unwrap_err();
    assert!(matches!(error, Error::InvalidRequest(_)));

    let fresh = issuer
        .create_credential_offer_uri(CreateOfferOptions::new(offered()).with_grants(grants))
        .await
        .unwrap();
    assert_ne!(fresh.session.issuer_state.as_deref(), Some("state-1"));
}

#[tokio::test]
async fn offers_can_be_passed_by_reference() {
    let (issuer, _) = issuer();

    let created = issuer
        .create_credential_offer_uri(
            CreateOfferOptions::new(offered())
                .with_scheme("https")
                .with_base_url("wallet.example.com/offer")
                .with_credential_offer_uri("https://issuer.example.com/offers/1"),
        )
        .await
        .unwrap();

    assert_eq!(
        created.uri,
        "https://wallet.example.com/offer?credential_offer_uri=https%3A%2F%2Fissuer.example.com%2Foffers%2F1"
    );
}

#[tokio::test]
async fn proofs_must_be_signed_with_a_supported_algorithm() {
    let signer = Arc::new(TestSigner::default());
    let mut config = config();
    config.proof_signing_alg_values_supported = Some(vec!["ES256".into()]);
    let issuer = issuer_with(config, signer.clone());
    let (_, nonce) = redeemed_offer(&issuer).await;

    for alg in ["none", "ES384"] {
        let error = issuer
            .issue_credential(&credential_request(&nonce, alg), None)
            .await
            .unwrap_err();
        assert!(matches!(error, Error::Algorithm(_)), "{alg}");
    }
    assert_eq!(signer.signed.load(Ordering::SeqCst), 0);

    // Rejected requests leave the nonce usable.
    issuer
        .issue_credential(&credential_request(&nonce, "ES256"), None)
        .await
        .unwrap();
}

#[tokio::test]
async fn malformed_requests_and_proofs_are_rejected() {
    let (issuer, _) = issuer();
    let (_, nonce) = redeemed_offer(&issuer).await;

    let error = issuer
        .issue_credential(&CredentialRequest::default(), None)
        .await
        .unwrap_err();
    assert!(matches!(error, Error::InvalidCredentialRequest(_)));

    let forged = CredentialRequest {
        proof: Some(Proof::jwt(
            json!({ "alg": "ES256", "nonce": nonce, "forged": true }).to_string(),
        )),
        ..Default::default()
    };
    let error = issuer.issue_credential(&forged, None).await.unwrap_err();
    assert!(matches!(error, Error::InvalidProof(_)));
    assert_eq!(error.to_response().error, "invalid_proof");

    let error = issuer
        .issue_credential(&credential_request("unknown-nonce", "ES256"), None)
        .await
        .unwrap_err();
    assert!(matches!(error, Error::StateMissing(_)));
    assert!(error.is_routine());
}

#[tokio::test]
async fn failed_signing_leaves_state_untouched() {
    let (issuer, signer) = issuer();
    let (code, nonce) = redeemed_offer(&issuer).await;

    signer.fail.store(true, Ordering::SeqCst);
    let error = issuer
        .issue_credential(&credential_request(&nonce, "ES256"), None)
        .await
        .unwrap_err();
    assert!(matches!(error, Error::CredentialSigning(_)));
    assert_eq!(
        issuer.session(&code).await.unwrap().status,
        IssueStatus::AccessTokenCreated
    );

    signer.fail.store(false, Ordering::SeqCst);
    issuer
        .issue_credential(&credential_request(&nonce, "ES256"), None)
        .await
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn a_nonce_is_accepted_once_under_concurrency() {
    let (issuer, signer) = issuer();
    let (_, nonce) = redeemed_offer(&issuer).await;

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let issuer = issuer.clone();
            let request = credential_request(&nonce, "ES256");
            tokio::spawn(async move { issuer.issue_credential(&request, None).await })
        })
        .collect();

    let mut issued = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => issued += 1,
            Err(Error::StateMissing(missing)) => assert_eq!(missing, nonce),
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(issued, 1);
    assert!(signer.signed.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn builder_names_missing_parts() {
    let error = Issuer::builder().with_config(config()).build().unwrap_err();
    assert_eq!(
        error.to_string(),
        "session store is required, see `with_session_store`"
    );
}

#[tokio::test]
async fn a_session_failed_during_signing_stays_failed() {
    let signer = Arc::new(GatedSigner::default());
    let issuer = issuer_with(config(), signer.clone());
    let (code, nonce) = redeemed_offer(&issuer).await;

    let pending = tokio::spawn({
        let issuer = issuer.clone();
        let request = credential_request(&nonce, "ES256");
        async move { issuer.issue_credential(&request, None).await }
    });
    signer.entered.notified().await;

    issuer.fail_session(&code, "revoked by operator").await.unwrap();
    assert_eq!(issuer.session(&code).await.unwrap().status, IssueStatus::Error);
    signer.release.notify_one();

    let error = pending.await.unwrap().unwrap_err();
    assert!(matches!(
        error,
        Error::InvalidStateTransition {
            from: IssueStatus::Error,
            to: IssueStatus::CredentialIssued
        }
    ));
    let session = issuer.session(&code).await.unwrap();
    assert_eq!(session.status, IssueStatus::Error);
    assert_eq!(session.error.as_deref(), Some("revoked by operator"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn a_supplied_identifier_is_claimed_once_under_concurrency() {
    let (issuer, _) = issuer();
    let grants = Grants {
        pre_authorized_code: Some(PreAuthorizedCodeGrant {
            pre_authorized_code: "shared-code".into(),
            ..Default::default()
        }),
        ..Default::default()
    };

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let issuer = issuer.clone();
            let options = CreateOfferOptions::new(offered())
                .with_grants(grants.clone())
                .with_client_id(format!("client-{i}"));
            tokio::spawn(async move { issuer.create_credential_offer_uri(options).await })
        })
        .collect();

    let mut winners = Vec::new();
    for task in tasks {
        match task.await.unwrap() {
            Ok(created) => winners.push(created.session.client_id),
            Err(Error::InvalidRequest(_)) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(winners.len(), 1);
    assert_eq!(
        issuer.session("shared-code").await.unwrap().client_id,
        winners[0]
    );
}

#[tokio::test]
async fn supplied_nonces_must_not_be_live() {
    let (issuer, _) = issuer();
    let (_, nonce) = redeemed_offer(&issuer).await;

    let created = issuer
        .create_credential_offer_uri(
            CreateOfferOptions::new(offered()).with_grants(pre_authorized(None)),
        )
        .await
        .unwrap();
    let error = issuer
        .access_token_created(
            &TokenGrant::PreAuthorizedCode {
                pre_authorized_code: created.session.pre_authorized_code.unwrap(),
                tx_code: None,
            },
            Some(nonce.clone()),
        )
        .await
        .unwrap_err();
    assert!(matches!(error, Error::InvalidRequest(_)));

    let error = issuer
        .issue_credential(&credential_request(&nonce, "ES256"), Some(nonce.clone()))
        .await
        .unwrap_err();
    assert!(matches!(error, Error::InvalidRequest(_)));

    // The original nonce still belongs to its session.
    issuer
        .issue_credential(&credential_request(&nonce, "ES256"), None)
        .await
        .unwrap();
}

#[tokio::test]
async fn expired_nonces_are_missing() {
    let nonces = Nonces::new();
    let issuer = issuer_with_stores(
        config(),
        Arc::new(TestSigner::default()),
        Sessions::new(),
        nonces.clone(),
    );
    let (code, nonce) = redeemed_offer(&issuer).await;

    let mut state = nonces.get(&nonce).await.unwrap().unwrap();
    state.created_at = Utc::now() - Duration::seconds(301);
    nonces.set(nonce.clone(), state).await.unwrap();

    let error = issuer
        .issue_credential(&credential_request(&nonce, "ES256"), None)
        .await
        .unwrap_err();
    assert!(matches!(&error, Error::StateMissing(missing) if missing == &nonce));
    assert!(error.is_routine());
    assert_eq!(
        issuer.session(&code).await.unwrap().status,
        IssueStatus::AccessTokenCreated
    );
}

#[tokio::test]
async fn sessions_expire_after_their_ttl() {
    let sessions = Sessions::new();
    let issuer = issuer_with_stores(
        config(),
        Arc::new(TestSigner::default()),
        sessions.clone(),
        Nonces::new(),
    );
    let (code, nonce) = redeemed_offer(&issuer).await;

    let mut session = sessions.get(&code).await.unwrap().unwrap();
    session.last_updated_at = Utc::now() - Duration::seconds(301);
    sessions.set(code.clone(), session).await.unwrap();

    let error = issuer.session(&code).await.unwrap_err();
    assert!(matches!(&error, Error::SessionNotFound(key) if key == &code));

    let error = issuer
        .issue_credential(&credential_request(&nonce, "ES256"), None)
        .await
        .unwrap_err();
    assert!(matches!(error, Error::SessionNotFound(_)));
    assert!(error.is_routine());
}

#[tokio::test]
async fn credential_endpoint_errors_keep_their_code() {
    let http_client = metadata_client(authorization_server_metadata(false)).with(
        "https://issuer.example.com/credential",
        CannedResponse::json(
            400,
            json!({ "error": "invalid_nonce", "error_description": "c_nonce expired" }),
        ),
    );
    let metadata = EndpointMetadata::resolve(ISSUER, &http_client).await.unwrap();
    let wallet = TestWallet { http_client };

    let error = wallet
        .request_credential(&metadata, "token", &credential_request("nonce", "ES256"))
        .await
        .unwrap_err();

    assert!(matches!(
        &error,
        Error::CredentialEndpoint { status: 400, response } if response.error == "invalid_nonce"
    ));
    assert_eq!(error.code(), "invalid_nonce");
    assert!(error.is_routine());

    let (method, uri, _) = wallet.http_client.requests().pop().unwrap();
    assert_eq!(method, "POST");
    assert_eq!(uri, "https://issuer.example.com/credential");
}
