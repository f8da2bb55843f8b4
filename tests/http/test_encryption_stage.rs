// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Encrypting interceptor tests against a live API
//!
//! These tests verify that:
//! - POST, PUT and PATCH bodies under the API prefix leave the client sealed
//! - Everything else goes out untouched
//! - Encrypted replies are opened transparently and plain replies pass through
//! - No session outlives its exchange

use crate::common::{spawn_api, state_with_jwk, test_jwk, TestApi};
use async_trait::async_trait;
use futures::future::join_all;
use sealed_payload::http::{FormField, Transport};
use sealed_payload::{ApiRequest, ApiResponse, ClientRuntime, EncryptionConfig, RequestError};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

async fn client(api: &TestApi) -> ClientRuntime {
    client_with(api.config()).await
}

async fn client_with(config: EncryptionConfig) -> ClientRuntime {
    ClientRuntime::hydrate(&config, &state_with_jwk(Some(test_jwk())))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_write_methods_are_sealed_and_replies_opened() {
    let api = spawn_api(false).await;
    let runtime = client(&api).await;
    assert!(runtime.session().is_ready());

    let payload = json!({"name": "widget", "qty": 3});
    let requests = vec![
        ("POST", ApiRequest::post("/api/echo")),
        ("PUT", ApiRequest::put("/api/echo")),
        ("PATCH", ApiRequest::patch("/api/echo")),
    ];

    for (method, request) in requests {
        let response = runtime
            .pipeline()
            .send(request.json_value(payload.clone()))
            .await
            .unwrap();
        assert_eq!(response.body, json!({"echo": payload, "method": method}));
        assert!(response.headers.get("x-encrypted-response").is_none());
    }

    let seen = api.requests_to("/api/echo");
    assert_eq!(seen.len(), 3);
    for request in seen {
        assert!(request.encrypted);
        assert_eq!(request.content_type.as_deref(), Some("application/json"));

        let body = request.json_body();
        let fields: Vec<_> = body.as_object().unwrap().keys().cloned().collect();
        assert_eq!(fields.len(), 4);
        for field in ["iv", "data", "ek", "nonce"] {
            assert!(body.get(field).and_then(Value::as_str).is_some());
        }
        assert_eq!(request.nonce.as_deref(), body["nonce"].as_str());
        assert!(!String::from_utf8_lossy(&request.body).contains("widget"));
    }

    assert_eq!(runtime.session().live_sessions().await, 0);
}

#[tokio::test]
async fn test_empty_body_is_sealed_as_null() {
    let api = spawn_api(false).await;
    let runtime = client(&api).await;

    let response = runtime
        .pipeline()
        .send(ApiRequest::post("/api/echo"))
        .await
        .unwrap();
    assert_eq!(response.body, json!({"echo": null, "method": "POST"}));
    assert!(api.requests_to("/api/echo")[0].encrypted);
}

#[tokio::test]
async fn test_reads_and_uploads_stay_plain() {
    let api = spawn_api(false).await;
    let runtime = client(&api).await;

    let response = runtime
        .pipeline()
        .send(ApiRequest::get("/api/items"))
        .await
        .unwrap();
    assert_eq!(response.body, json!({"items": [1, 2, 3]}));

    let response = runtime
        .pipeline()
        .send(ApiRequest::post("/api/upload").multipart(vec![
            FormField::text("title", "cat"),
            FormField::file("image", "cat.png", "image/png", vec![1, 2, 3, 4]),
        ]))
        .await
        .unwrap();
    assert!(response.body["content_type"]
        .as_str()
        .unwrap()
        .starts_with("multipart/form-data"));

    let response = runtime
        .pipeline()
        .send(ApiRequest::post("/api/upload").binary("image/png", vec![0u8; 16]))
        .await
        .unwrap();
    assert_eq!(response.body, json!({"content_type": "image/png", "bytes": 16}));

    assert!(api.requests().iter().all(|r| !r.encrypted));
    assert_eq!(runtime.session().live_sessions().await, 0);
}

#[tokio::test]
async fn test_key_endpoint_and_foreign_prefix_stay_plain() {
    let api = spawn_api(false).await;
    let runtime = client(&api).await;

    let _ = runtime
        .pipeline()
        .send(ApiRequest::post("/api/crypto/public-key").json_value(json!({})))
        .await;
    let _ = runtime
        .pipeline()
        .send(ApiRequest::post("/auth/login").json_value(json!({"user": "u"})))
        .await;

    let seen = api.requests();
    assert_eq!(seen.len(), 2);
    assert!(seen.iter().all(|r| !r.encrypted && r.nonce.is_none()));
    assert_eq!(seen[1].json_body(), json!({"user": "u"}));
}

#[tokio::test]
async fn test_runtime_without_key_sends_plain() {
    let api = spawn_api(false).await;
    let runtime = ClientRuntime::hydrate(&api.config(), &state_with_jwk(None))
        .await
        .unwrap();
    assert!(!runtime.session().is_ready());

    let response = runtime
        .pipeline()
        .send(ApiRequest::post("/api/echo").json_value(json!({"a": 1})))
        .await
        .unwrap();

    assert_eq!(response.body, json!({"echo": {"a": 1}, "plain": true}));
    assert!(!api.requests_to("/api/echo")[0].encrypted);
}

#[tokio::test]
async fn test_bound_aad_roundtrip() {
    let api = spawn_api(true).await;
    let runtime = client_with(EncryptionConfig {
        bind_request_aad: true,
        ..api.config()
    })
    .await;

    let response = runtime
        .pipeline()
        .send(ApiRequest::patch("/api/echo").json_value(json!({"bound": true})))
        .await
        .unwrap();
    assert_eq!(
        response.body,
        json!({"echo": {"bound": true}, "method": "PATCH"})
    );
}

#[tokio::test]
async fn test_plain_reply_to_sealed_request_passes_through() {
    let api = spawn_api(false).await;
    let runtime = client(&api).await;

    let response = runtime
        .pipeline()
        .send(ApiRequest::post("/api/plain-reply").json_value(json!({"x": 1})))
        .await
        .unwrap();

    assert_eq!(response.body, json!({"ok": true}));
    assert!(api.requests_to("/api/plain-reply")[0].encrypted);
    assert_eq!(runtime.session().live_sessions().await, 0);
}

#[tokio::test]
async fn test_concurrent_requests_get_their_own_replies() {
    let api = spawn_api(false).await;
    let runtime = client(&api).await;

    let calls = (0..10).map(|i| {
        runtime
            .pipeline()
            .send(ApiRequest::post("/api/echo").json_value(json!({"i": i})))
    });
    let responses = join_all(calls).await;

    for (i, response) in responses.into_iter().enumerate() {
        assert_eq!(
            response.unwrap().body,
            json!({"echo": {"i": i}, "method": "POST"})
        );
    }

    let nonces: std::collections::HashSet<_> = api
        .requests_to("/api/echo")
        .into_iter()
        .filter_map(|r| r.nonce)
        .collect();
    assert_eq!(nonces.len(), 10);
    assert_eq!(runtime.session().live_sessions().await, 0);
}

/// Transport whose requests never complete
#[derive(Default)]
struct StalledTransport {
    calls: AtomicUsize,
}

#[async_trait]
impl Transport for StalledTransport {
    async fn send(&self, _request: ApiRequest) -> Result<ApiResponse, RequestError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        futures::future::pending().await
    }
}

#[tokio::test]
async fn test_cancelled_sealed_sends_release_their_sessions() {
    let transport = Arc::new(StalledTransport::default());
    let runtime = ClientRuntime::with_transport(
        &EncryptionConfig::default(),
        &state_with_jwk(Some(test_jwk())),
        transport.clone(),
    )
    .await
    .unwrap();
    assert!(runtime.session().is_ready());

    for i in 0..5 {
        let send = runtime
            .pipeline()
            .send(ApiRequest::post("/api/echo").json_value(json!({"i": i})));
        assert!(tokio::time::timeout(Duration::from_millis(100), send)
            .await
            .is_err());
    }

    assert_eq!(transport.calls.load(Ordering::SeqCst), 5);
    assert_eq!(runtime.session().live_sessions().await, 0);
}
