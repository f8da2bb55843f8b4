// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Tamper detection tests
//!
//! Any modification of a reply envelope must fail authentication.

use crate::common::{flip_bit, open_request, seal_response, seal_response_bytes, test_jwk};
use sealed_payload::crypto::{CryptoError, CryptoSession, ResponseEnvelope, SealedRequest};
use serde_json::{json, Value};

async fn sealed_exchange(session: &CryptoSession) -> (SealedRequest, ResponseEnvelope) {
    let sealed = session
        .encrypt(&json!({"account": "alice", "amount": 100}))
        .await
        .unwrap();
    let (value, key) = open_request(&sealed.envelope, b"");
    let reply = seal_response(&json!({"accepted": value}), &key, &sealed.nonce, b"");
    (sealed, reply)
}

async fn ready_session() -> CryptoSession {
    let session = CryptoSession::new();
    session.import_server_public_key(test_jwk()).await.unwrap();
    session
}

fn assert_decryption_failed(result: Result<Value, CryptoError>) {
    match result {
        Err(CryptoError::DecryptionFailed { .. }) => {}
        other => panic!("expected DecryptionFailed, got {:?}", other),
    }
}

#[tokio::test]
async fn test_flipped_ciphertext_bits_are_rejected() {
    let session = ready_session().await;

    for bit in [0, 7, 64, 200] {
        let (_, mut reply) = sealed_exchange(&session).await;
        reply.data = flip_bit(&reply.data, bit);
        assert_decryption_failed(session.decrypt(&reply).await);
    }
}

#[tokio::test]
async fn test_flipped_tag_bits_are_rejected() {
    let session = ready_session().await;
    let (_, mut reply) = sealed_exchange(&session).await;

    let data_bits = sealed_payload::codec::b64_to_bytes(&reply.data).unwrap().len() * 8;
    reply.data = flip_bit(&reply.data, data_bits - 1);
    assert_decryption_failed(session.decrypt(&reply).await);
}

#[tokio::test]
async fn test_flipped_iv_bits_are_rejected() {
    let session = ready_session().await;

    for bit in [0, 50, 95] {
        let (_, mut reply) = sealed_exchange(&session).await;
        reply.iv = flip_bit(&reply.iv, bit);
        assert_decryption_failed(session.decrypt(&reply).await);
    }
}

#[tokio::test]
async fn test_truncated_fields_are_rejected() {
    let session = ready_session().await;

    let (_, mut reply) = sealed_exchange(&session).await;
    reply.iv = sealed_payload::codec::bytes_to_b64(&[0u8; 8]);
    assert_decryption_failed(session.decrypt(&reply).await);

    let (_, mut reply) = sealed_exchange(&session).await;
    reply.data = sealed_payload::codec::bytes_to_b64(&[1u8; 4]);
    assert_decryption_failed(session.decrypt(&reply).await);

    let (_, mut reply) = sealed_exchange(&session).await;
    reply.data = "%%% not base64 %%%".to_string();
    assert_decryption_failed(session.decrypt(&reply).await);
}

#[tokio::test]
async fn test_reply_under_another_key_is_rejected() {
    let session = ready_session().await;
    let (first, _) = sealed_exchange(&session).await;
    let (second, _) = sealed_exchange(&session).await;

    let (_, other_key) = open_request(&second.envelope, b"");
    let reply = seal_response(&json!({"ok": true}), &other_key, &first.nonce, b"");
    assert_decryption_failed(session.decrypt(&reply).await);
}

#[tokio::test]
async fn test_non_json_plaintext_is_rejected() {
    let session = ready_session().await;

    let sealed = session.encrypt(&json!({})).await.unwrap();
    let (_, key) = open_request(&sealed.envelope, b"");
    let reply = seal_response_bytes(b"<html>not json</html>", &key, &sealed.nonce, b"");
    match session.decrypt(&reply).await {
        Err(CryptoError::DecryptionFailed { operation, .. }) => assert_eq!(operation, "parse"),
        other => panic!("expected parse failure, got {:?}", other),
    }

    let sealed = session.encrypt(&json!({})).await.unwrap();
    let (_, key) = open_request(&sealed.envelope, b"");
    let reply = seal_response_bytes(&[0xff, 0xfe, 0x00], &key, &sealed.nonce, b"");
    assert_decryption_failed(session.decrypt(&reply).await);
}

#[tokio::test]
async fn test_untouched_reply_still_opens() {
    let session = ready_session().await;
    let (_, reply) = sealed_exchange(&session).await;

    assert_eq!(
        session.decrypt(&reply).await.unwrap(),
        json!({"accepted": {"account": "alice", "amount": 100}})
    );
}
