// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Server render to client runtime handoff
//!
//! These tests verify that:
//! - The server render forwards the visitor cookie and never encrypts
//! - Failed render calls are replayed once in the client without network
//! - The hydrated client seals writes with the bootstrapped key
//! - A degraded render yields a client that sends plain requests

use crate::common::{spawn_api, test_jwk};
use sealed_payload::http::StatusCode;
use sealed_payload::{
    ApiRequest, BootstrapError, BootstrapPolicy, ClientRuntime, EncryptionConfig, ServerRender,
    TransferState, SERVER_PUBLIC_JWK,
};
use serde_json::json;

#[tokio::test]
async fn test_full_render_then_hydrate() {
    let api = spawn_api(false).await;
    let config = api.config();

    // Server render
    let render = ServerRender::new(&config, Some("sid=abc")).unwrap();
    assert_eq!(render.bootstrap().await.unwrap(), Some(test_jwk()));

    let me = render
        .pipeline()
        .send(ApiRequest::get("/api/me"))
        .await
        .unwrap();
    assert_eq!(me.body, json!({"cookie": "sid=abc"}));

    let echo = render
        .pipeline()
        .send(ApiRequest::post("/api/echo").json_value(json!({"ssr": true})))
        .await
        .unwrap();
    assert_eq!(echo.body, json!({"echo": {"ssr": true}, "plain": true}));

    let err = render
        .pipeline()
        .send(ApiRequest::post("/api/reject").json_value(json!({"bad": 1})))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::UNPROCESSABLE_ENTITY));

    let script = render.finish().unwrap();
    assert!(!script.contains('<'));
    assert!(script.contains("SERVER_PUBLIC_JWK"));
    assert!(script.contains("error-/api/reject"));
    assert!(api.requests().iter().all(|r| !r.encrypted));
    assert!(api
        .requests()
        .iter()
        .filter(|r| r.path != "/api/crypto/public-key")
        .all(|r| r.cookie.as_deref() == Some("sid=abc")));

    // Client runtime
    let client = ClientRuntime::hydrate(&config, &script).await.unwrap();
    assert!(client.session().is_ready());

    let replayed = client
        .pipeline()
        .send(ApiRequest::post("/api/reject").json_value(json!({"bad": 1})))
        .await
        .unwrap_err();
    let http = replayed.as_http().unwrap();
    assert_eq!(http.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(http.body, json!({"error": "validation failed"}));
    assert_eq!(api.requests_to("/api/reject").len(), 1);

    // The record is consumed; the next call goes out sealed
    let live = client
        .pipeline()
        .send(ApiRequest::post("/api/reject").json_value(json!({"bad": 2})))
        .await
        .unwrap_err();
    assert_eq!(
        live.as_http().unwrap().body,
        json!({"error": "validation failed", "input": {"bad": 2}})
    );
    let rejects = api.requests_to("/api/reject");
    assert_eq!(rejects.len(), 2);
    assert!(rejects[1].encrypted);

    let echo = client
        .pipeline()
        .send(ApiRequest::post("/api/echo").json_value(json!({"csr": true})))
        .await
        .unwrap();
    assert_eq!(echo.body, json!({"echo": {"csr": true}, "method": "POST"}));

    // The browser never forwards the render's cookie
    let err = client
        .pipeline()
        .send(ApiRequest::get("/api/me"))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
    assert_eq!(client.session().live_sessions().await, 0);
}

#[tokio::test]
async fn test_render_without_cookie_sends_none() {
    let api = spawn_api(false).await;
    let render = ServerRender::new(&api.config(), None).unwrap();

    let err = render
        .pipeline()
        .send(ApiRequest::get("/api/me"))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
}

#[tokio::test]
async fn test_failed_bootstrap_aborts_render_under_fail_fast() {
    let api = spawn_api(false).await;
    let render = ServerRender::new(&api.config_with_base("/broken"), None).unwrap();

    assert!(matches!(
        render.bootstrap().await,
        Err(BootstrapError::Fetch(_))
    ));
    assert!(!render.transfer_state().has_key(&SERVER_PUBLIC_JWK));
}

#[tokio::test]
async fn test_degraded_render_hydrates_plain_client() {
    let api = spawn_api(false).await;
    let config = EncryptionConfig {
        bootstrap_policy: BootstrapPolicy::Degrade,
        ..api.config_with_base("/broken")
    };

    let render = ServerRender::new(&config, None).unwrap();
    assert_eq!(render.bootstrap().await.unwrap(), None);
    let script = render.finish().unwrap();

    let state = TransferState::from_json(&script).unwrap();
    assert_eq!(state.take(&SERVER_PUBLIC_JWK).unwrap(), Some(None));

    let client = ClientRuntime::hydrate(&config, &script).await.unwrap();
    assert!(!client.session().is_ready());

    let response = client
        .pipeline()
        .send(ApiRequest::post("/api/echo").json_value(json!({"a": 1})))
        .await
        .unwrap();
    assert_eq!(response.body, json!({"echo": {"a": 1}, "plain": true}));
    assert!(!api.requests_to("/api/echo")[0].encrypted);
}

#[tokio::test]
async fn test_empty_handoff_is_a_plain_client() {
    let api = spawn_api(false).await;
    let client = ClientRuntime::hydrate(&api.config(), "").await.unwrap();

    assert!(!client.session().is_ready());
    assert!(client.transfer_state().is_empty());
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let config = EncryptionConfig {
        nonce_bytes: 8,
        ..EncryptionConfig::default()
    };
    assert!(ServerRender::new(&config, None).is_err());
    assert!(ClientRuntime::hydrate(&config, "").await.is_err());
}
