// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! End-to-End Payload Encryption
//!
//! Hybrid envelopes for JSON request and response bodies exchanged with the
//! API:
//!
//! - **AES-GCM**: AES-256-GCM with a fresh one-time key per request
//! - **RSA-OAEP**: the session key is wrapped for the server's public key
//!   (RSA-OAEP with SHA-256, imported from a JWK)
//! - **Envelope**: `{iv, data, ek, nonce}` requests, `{iv, data, nonce}` replies
//! - **Session Keys**: in-memory `nonce -> key` table, single use
//! - **Session**: [`CryptoSession`], the service that owns all of the above
//!
//! ## Security Considerations
//!
//! - Session keys are stored in memory only, never persisted or logged
//! - A session key is used for exactly one request and its reply
//! - The nonce correlates a reply with its key; it is never the key itself
//! - Decryption failures never yield partial plaintext
//!
//! ## Protocol Flow
//!
//! 1. Server render fetches the RSA public JWK and hands it to the client
//! 2. Client imports the JWK once; every request awaits that import
//! 3. Client generates an AES key, IV and nonce for each mutating request
//! 4. Client encrypts the JSON body and wraps the AES key with RSA-OAEP
//! 5. Server unwraps the key and replies `{iv, data, nonce}` under the same key
//! 6. Client looks up the key by nonce, decrypts, and forgets the key

pub mod aes_gcm;
pub mod envelope;
pub mod error;
pub mod rsa_oaep;
pub mod session;
pub mod session_keys;

pub use aes_gcm::{decrypt_aes_gcm, encrypt_aes_gcm, SessionKey};
pub use envelope::{RequestEnvelope, ResponseEnvelope, SealedRequest};
pub use error::CryptoError;
pub use rsa_oaep::{PublicJwk, ServerPublicKey, JWK_ALG_RSA_OAEP_256};
pub use session::CryptoSession;
pub use session_keys::{SessionEntry, SessionKeyStore};
