use oid4vci::{
    core::{
        authorization_request::{
            parameters::{ParMode, Pkce},
            AuthorizationRequestBuilder, AuthorizationRequestOpts,
        },
        metadata::EndpointMetadata,
    },
    wallet::Wallet,
    Error,
};
use serde_json::{json, Value as Json};
use url::Url;


use mock::{
    authorization_server_metadata, metadata_client, offer_uri, CannedResponse, TestWallet,
    AUTHORIZATION_ENDPOINT, ISSUER, PAR_ENDPOINT,
};

const REDIRECT_URI: &str = "https://wallet.example.com/callback";

fn offer(configuration_ids: Json) -> String {
    offer_uri(
        "openid-credential-offer",
        &json!({
            "credential_issuer": ISSUER,
            "credential_configuration_ids": configuration_ids,
            "grants": { "authorization_code": { "issuer_state": "state-1" } }
        }),
    )
}

fn query(url: &Url) -> Vec<(String, String)> {
    url.query_pairs().into_owned().collect()
}

fn parameter<'a>(query: &'a [(String, String)], key: &str) -> Option<&'a str> {
    query
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

#[tokio::test]
async fn derives_authorization_details_from_the_offer() {
    let wallet = TestWallet {
        http_client: metadata_client(authorization_server_metadata(false)),
    };
    let offer = wallet
        .resolve_offer(&offer(json!(["UniversityDegree"])))
        .await
        .unwrap();
    let metadata = wallet.resolve_metadata(&offer).await.unwrap();
    let pkce = Pkce::from_verifier("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk");

    let url = wallet
        .authorization_url(
            &offer,
            &metadata,
            &pkce,
            AuthorizationRequestOpts::new(REDIRECT_URI),
        )
        .await
        .unwrap();

    assert!(url.as_str().starts_with(AUTHORIZATION_ENDPOINT));
    let query = query(&url);
    assert_eq!(parameter(&query, "response_type"), Some("code"));
    assert_eq!(parameter(&query, "code_challenge_method"), Some("S256"));
    assert_eq!(
        parameter(&query, "code_challenge"),
        Some("E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM")
    );
    assert_eq!(parameter(&query, "redirect_uri"), Some(REDIRECT_URI));
    assert_eq!(parameter(&query, "scope"), Some("openid"));
    assert_eq!(parameter(&query, "client_id"), Some("test-wallet"));
    assert_eq!(parameter(&query, "issuer_state"), Some("state-1"));
    assert!(parameter(&query, "code_verifier").is_none());

    let details: Json =
        serde_json::from_str(parameter(&query, "authorization_details").unwrap()).unwrap();
    assert_eq!(details.as_array().unwrap().len(), 1);
    assert_eq!(details[0]["type"], json!("openid_credential"));
    assert_eq!(details[0]["format"], json!("jwt_vc_json"));
    assert_eq!(details[0]["locations"], json!([ISSUER]));
}

#[tokio::test]
async fn explicit_scope_skips_derivation() {
    let wallet = TestWallet {
        http_client: metadata_client(authorization_server_metadata(false)),
    };
    let offer = wallet
        .resolve_offer(&offer(json!(["Unknown"])))
        .await
        .unwrap();
    let metadata = wallet.resolve_metadata(&offer).await.unwrap();

    let url = wallet
        .authorization_url(
            &offer,
            &metadata,
            &Pkce::generate(),
            AuthorizationRequestOpts::new(REDIRECT_URI).with_scope("UniversityDegree openid"),
        )
        .await
        .unwrap();

    let query = query(&url);
    assert_eq!(parameter(&query, "scope"), Some("openid UniversityDegree"));
    assert!(parameter(&query, "authorization_details").is_none());
}

#[tokio::test]
async fn unknown_offered_credentials_fail_derivation() {
    let wallet = TestWallet {
        http_client: metadata_client(authorization_server_metadata(false)),
    };
    let offer = wallet
        .resolve_offer(&offer(json!(["Unknown"])))
        .await
        .unwrap();
    let metadata = wallet.resolve_metadata(&offer).await.unwrap();

    let error = wallet
        .authorization_url(
            &offer,
            &metadata,
            &Pkce::generate(),
            AuthorizationRequestOpts::new(REDIRECT_URI),
        )
        .await
        .unwrap_err();

    assert!(matches!(error, Error::Derivation(_)));
}

#[tokio::test]
async fn requests_without_offer_need_scope_or_details() {
    let http_client = metadata_client(authorization_server_metadata(false));
    let metadata = EndpointMetadata::resolve(ISSUER, &http_client).await.unwrap();
    let pkce = Pkce::generate();

    let error = AuthorizationRequestBuilder::new(
        &pkce,
        &metadata,
        AuthorizationRequestOpts::new(REDIRECT_URI),
    )
    .build(&http_client)
    .await
    .unwrap_err();

    assert!(matches!(error, Error::Derivation(_)));
}

#[tokio::test]
async fn required_par_without_endpoint_fails() {
    let mut server = authorization_server_metadata(false);
    server["require_pushed_authorization_requests"] = json!(true);
    let http_client = metadata_client(server);
    let metadata = EndpointMetadata::resolve(ISSUER, &http_client).await.unwrap();
    let pkce = Pkce::generate();

    for par_mode in [ParMode::Never, ParMode::Auto, ParMode::Require] {
        let error = AuthorizationRequestBuilder::new(
            &pkce,
            &metadata,
            AuthorizationRequestOpts::new(REDIRECT_URI)
                .with_scope("UniversityDegree")
                .with_par_mode(par_mode),
        )
        .build(&http_client)
        .await
        .unwrap_err();

        assert!(matches!(error, Error::ParUnsupported), "{par_mode:?}");
    }
}

#[tokio::test]
async fn pushed_requests_are_replaced_by_request_uri() {
    let http_client = metadata_client(authorization_server_metadata(true)).with(
        PAR_ENDPOINT,
        CannedResponse::json(
            201,
            json!({ "request_uri": "urn:ietf:params:oauth:request_uri:abc", "expires_in": 60 }),
        ),
    );
    let metadata = EndpointMetadata::resolve(ISSUER, &http_client).await.unwrap();
    let pkce = Pkce::generate();

    let url = AuthorizationRequestBuilder::new(
        &pkce,
        &metadata,
        AuthorizationRequestOpts::new(REDIRECT_URI).with_scope("UniversityDegree"),
    )
    .build(&http_client)
    .await
    .unwrap();

    assert_eq!(
        query(&url),
        [(
            "request_uri".to_owned(),
            "urn:ietf:params:oauth:request_uri:abc".to_owned()
        )]
    );

    let (method, uri, body) = http_client.requests().pop().unwrap();
    assert_eq!(method, "POST");
    assert_eq!(uri, PAR_ENDPOINT);
    let pushed: Vec<(String, String)> = url::form_urlencoded::parse(&body).into_owned().collect();
    assert!(pushed.contains(&("redirect_uri".to_owned(), REDIRECT_URI.to_owned())));
    assert!(pushed.contains(&(
        "code_challenge".to_owned(),
        pkce.code_challenge().to_owned()
    )));
}

#[tokio::test]
async fn par_is_skipped_when_disabled() {
    let http_client = metadata_client(authorization_server_metadata(true));
    let metadata = EndpointMetadata::resolve(ISSUER, &http_client).await.unwrap();
    let pkce = Pkce::generate();

    let url = AuthorizationRequestBuilder::new(
        &pkce,
        &metadata,
        AuthorizationRequestOpts::new(REDIRECT_URI)
            .with_scope("UniversityDegree")
            .with_par_mode(ParMode::Never),
    )
    .build(&http_client)
    .await
    .unwrap();

    assert!(parameter(&query(&url), "request_uri").is_none());
    assert!(http_client
        .requests()
        .iter()
        .all(|(method, _, _)| method == "GET"));
}

#[tokio::test]
async fn failed_push_is_reported() {
    let http_client = metadata_client(authorization_server_metadata(true)).with(
        PAR_ENDPOINT,
        CannedResponse::json(400, json!({ "error": "invalid_request" })),
    );
    let metadata = EndpointMetadata::resolve(ISSUER, &http_client).await.unwrap();
    let pkce = Pkce::generate();

    let error = AuthorizationRequestBuilder::new(
        &pkce,
        &metadata,
        AuthorizationRequestOpts::new(REDIRECT_URI).with_scope("UniversityDegree"),
    )
    .build(&http_client)
    .await
    .unwrap_err();

    assert!(matches!(error, Error::Par(_)));
}
