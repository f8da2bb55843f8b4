// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Error replies through the encrypting interceptor
//!
//! Encrypted error bodies are opened when possible and otherwise handed
//! back unchanged. A 2xx reply that cannot be opened is a crypto error.

use crate::common::{spawn_api, state_with_jwk, test_jwk, TestApi};
use sealed_payload::crypto::CryptoError;
use sealed_payload::http::StatusCode;
use sealed_payload::{ApiRequest, ClientRuntime, RequestError};
use serde_json::json;

async fn client(api: &TestApi) -> ClientRuntime {
    ClientRuntime::hydrate(&api.config(), &state_with_jwk(Some(test_jwk())))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_encrypted_error_body_is_opened() {
    let api = spawn_api(false).await;
    let runtime = client(&api).await;

    let err = runtime
        .pipeline()
        .send(ApiRequest::post("/api/reject").json_value(json!({"email": "nope"})))
        .await
        .unwrap_err();

    let http = err.as_http().expect("HTTP error");
    assert_eq!(http.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        http.body,
        json!({"error": "validation failed", "input": {"email": "nope"}})
    );
    assert!(http.headers.get("x-encrypted-response").is_none());
    assert!(http.url.ends_with("/api/reject"));
    assert_eq!(runtime.session().live_sessions().await, 0);
}

#[tokio::test]
async fn test_unopenable_error_body_is_returned_unchanged() {
    let api = spawn_api(false).await;
    let runtime = client(&api).await;

    let err = runtime
        .pipeline()
        .send(ApiRequest::post("/api/reject-garbled").json_value(json!({"a": 1})))
        .await
        .unwrap_err();

    let http = err.as_http().expect("HTTP error");
    assert_eq!(http.status, StatusCode::BAD_REQUEST);
    let body = http.body.as_object().unwrap();
    assert!(body.contains_key("iv") && body.contains_key("data") && body.contains_key("nonce"));
    assert_eq!(runtime.session().live_sessions().await, 0);
}

#[tokio::test]
async fn test_unopenable_success_body_is_a_crypto_error() {
    let api = spawn_api(false).await;
    let runtime = client(&api).await;

    let err = runtime
        .pipeline()
        .send(ApiRequest::post("/api/garbled").json_value(json!({"a": 1})))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RequestError::Crypto(CryptoError::DecryptionFailed { .. })
    ));
    assert_eq!(err.status(), None);
    assert_eq!(runtime.session().live_sessions().await, 0);
}

#[tokio::test]
async fn test_flagged_reply_with_wrong_shape_is_rejected() {
    let api = spawn_api(false).await;
    let runtime = client(&api).await;

    let err = runtime
        .pipeline()
        .send(ApiRequest::post("/api/bad-shape").json_value(json!({"a": 1})))
        .await
        .unwrap_err();

    match err {
        RequestError::Crypto(CryptoError::InvalidEnvelope { field, .. }) => {
            assert_eq!(field, "data")
        }
        other => panic!("expected InvalidEnvelope, got {:?}", other),
    }
    assert_eq!(runtime.session().live_sessions().await, 0);
}

#[tokio::test]
async fn test_plain_errors_pass_through() {
    let api = spawn_api(false).await;
    let runtime = client(&api).await;

    let err = runtime
        .pipeline()
        .send(ApiRequest::get("/api/missing"))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
    assert_eq!(err.as_http().unwrap().body["path"], "/api/missing");

    let err = runtime
        .pipeline()
        .send(ApiRequest::get("/api/me"))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
    assert_eq!(
        err.as_http().unwrap().body,
        json!({"error": "unauthenticated"})
    );
}

#[tokio::test]
async fn test_unreachable_api_is_a_network_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = sealed_payload::EncryptionConfig {
        api_base_url: format!("http://{}/api", addr),
        ..Default::default()
    };
    let runtime = ClientRuntime::hydrate(&config, &state_with_jwk(Some(test_jwk())))
        .await
        .unwrap();

    let err = runtime
        .pipeline()
        .send(ApiRequest::post("/api/echo").json_value(json!({"a": 1})))
        .await
        .unwrap_err();
    assert!(matches!(err, RequestError::Network(_)));
    assert_eq!(runtime.session().live_sessions().await, 0);
}
