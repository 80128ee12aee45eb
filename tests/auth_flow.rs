// tests/auth_flow.rs
//! End-to-end authentication through the HTTP router.

use auth_provider::blockchain::in_memory::InMemoryLedger;
use auth_provider::context::ServiceContext;
use auth_provider::services::api_server::ApiServer;
use auth_provider::services::external_validator::UnconfiguredValidator;
use auth_provider::services::verifier::VerifyOptions;
use auth_provider::utils::crypto::hash_data;
use auth_provider::wallet::key_management::KeyDidSigner;
use auth_provider::wallet::resolver::did_ethr;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use ethers::signers::{LocalWallet, Signer};
use ethers::utils::to_checksum;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn context(production: bool, ledger: &InMemoryLedger) -> Arc<ServiceContext> {
    let signer = Arc::new(KeyDidSigner::from_seed(&[9u8; 32]).unwrap());
    Arc::new(ServiceContext::from_parts(
        production,
        signer,
        Arc::new(UnconfiguredValidator),
        Arc::new(ledger.clone()),
    ))
}

fn attestation() -> String {
    let claims = json!({
        "iss": "https://brok.criipto.id",
        "name": "Lo, Morten",
        "family_name": "Lo",
        "given_name": "Morten",
        "dateofbirth": "19411021",
        "socialno": "14102123973",
    });
    encode(&Header::default(), &claims, &EncodingKey::from_secret(b"broker")).unwrap()
}

async fn post(router: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_authenticate_with_skips_outside_production() {
    let wallet = LocalWallet::new(&mut rand::thread_rng());
    let token = attestation();
    let signature = wallet.sign_message(hash_data(token.as_bytes())).await.unwrap();
    let ledger = InMemoryLedger::new();
    let context = context(false, &ledger);

    let (status, body) = post(
        ApiServer::new(context.clone()).router(),
        "/auth/verify",
        json!({
            "attestationToken": token,
            "bindingSignature": signature.to_string(),
            "skipExternalCheck": true,
            "skipLedgerRecord": true,
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let credentials = body.as_array().unwrap();
    assert_eq!(credentials.len(), 2);

    let subject = did_ethr(wallet.address());
    let options = VerifyOptions::default().subject(subject).issuer(context.issuer_id());
    let personal = context
        .verifier()
        .decode_and_verify(credentials[0].as_str().unwrap(), &options)
        .unwrap();
    let personal = personal.payload.credential_subject().unwrap();
    assert_eq!(personal["name"], "Lo, Morten");
    assert_eq!(personal["birthDate"], "1941-10-21");

    let identity = context
        .verifier()
        .decode_and_verify(credentials[1].as_str().unwrap(), &options)
        .unwrap();
    let identity = identity.payload.credential_subject().unwrap();
    assert_eq!(identity["nationalIdentifier"], "14102123973");
    assert_eq!(identity["blockchainAccounts"], json!([to_checksum(&wallet.address(), None)]));

    assert!(ledger.authenticated().is_empty());
}

#[tokio::test]
async fn test_skip_flags_are_ignored_in_production() {
    let wallet = LocalWallet::new(&mut rand::thread_rng());
    let token = attestation();
    let signature = wallet.sign_message(hash_data(token.as_bytes())).await.unwrap();
    let ledger = InMemoryLedger::new();

    let (status, body) = post(
        ApiServer::new(context(true, &ledger)).router(),
        "/auth/verify",
        json!({
            "attestationToken": token,
            "bindingSignature": signature.to_string(),
            "skipExternalCheck": true,
            "skipLedgerRecord": true,
        }),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("external validation failed"));
    assert!(ledger.authenticated().is_empty());
}

#[tokio::test]
async fn test_invalid_presentation_is_reported() {
    let (status, body) = post(
        ApiServer::new(context(false, &InMemoryLedger::new())).router(),
        "/auth/verify/bankid",
        json!({ "jwt": "not.a.presentation", "skipBlockchain": true, "skipBankidVerify": true }),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().starts_with("presentation rejected"));
}

#[tokio::test]
async fn test_health() {
    let context = context(false, &InMemoryLedger::new());
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = ApiServer::new(context.clone()).router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["issuer"], context.issuer_id());
    assert_eq!(body["production"], false);
}
