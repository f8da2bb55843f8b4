// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Crypto Session Service
//!
//! Owns the imported server public key and the nonce-indexed session key
//! table. It is the only component that creates or consumes session keys.
//!
//! ## Lifecycle
//!
//! 1. `import_server_public_key` (or `hydrate`) starts a single shared
//!    import; every caller awaits the same in-flight future
//! 2. `encrypt` seals a JSON value into a [`RequestEnvelope`] and registers
//!    `nonce -> session key`
//! 3. `decrypt` consumes the entry for a [`ResponseEnvelope`]'s nonce
//!
//! A failed import leaves encryption disabled for the lifetime of the
//! service; nothing retries it.

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;

use super::aes_gcm::{decrypt_aes_gcm, encrypt_aes_gcm, SessionKey, IV_SIZE};
use super::envelope::{RequestEnvelope, ResponseEnvelope, SealedRequest};
use super::error::CryptoError;
use super::rsa_oaep::{PublicJwk, ServerPublicKey};
use super::session_keys::SessionKeyStore;
use crate::codec;
use crate::config::{EncryptionConfig, MIN_NONCE_BYTES};
use crate::transfer_state::{TransferState, SERVER_PUBLIC_JWK};

type ImportFuture = Shared<BoxFuture<'static, Result<(), CryptoError>>>;

struct ImportState {
    jwk: PublicJwk,
    future: ImportFuture,
}

struct Inner {
    server_key: Arc<OnceLock<ServerPublicKey>>,
    import: Mutex<Option<ImportState>>,
    hydrated: AtomicBool,
    sessions: SessionKeyStore,
    nonce_bytes: usize,
}

/// Cloneable handle to one encryption session
#[derive(Clone)]
pub struct CryptoSession {
    inner: Arc<Inner>,
}

impl CryptoSession {
    /// Session with 16-byte nonces and no key expiry
    pub fn new() -> Self {
        Self::with_options(MIN_NONCE_BYTES, None)
    }

    pub fn from_config(config: &EncryptionConfig) -> Self {
        Self::with_options(config.nonce_bytes, config.session_ttl())
    }

    /// `nonce_bytes` below 16 is raised to 16
    pub fn with_options(nonce_bytes: usize, session_ttl: Option<Duration>) -> Self {
        if nonce_bytes < MIN_NONCE_BYTES {
            tracing::warn!(
                "Nonce length {} below minimum, using {} bytes",
                nonce_bytes,
                MIN_NONCE_BYTES
            );
        }
        let sessions = match session_ttl {
            Some(ttl) => SessionKeyStore::with_ttl(ttl),
            None => SessionKeyStore::new(),
        };
        Self {
            inner: Arc::new(Inner {
                server_key: Arc::new(OnceLock::new()),
                import: Mutex::new(None),
                hydrated: AtomicBool::new(false),
                sessions,
                nonce_bytes: nonce_bytes.max(MIN_NONCE_BYTES),
            }),
        }
    }

    fn import_slot(&self) -> MutexGuard<'_, Option<ImportState>> {
        self.inner
            .import
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Import the server's RSA-OAEP public key
    ///
    /// Only the first call performs an import. Later and concurrent calls
    /// await that same import and get its outcome; a different JWK passed
    /// to a later call is ignored.
    pub async fn import_server_public_key(&self, jwk: PublicJwk) -> Result<(), CryptoError> {
        let future = {
            let mut slot = self.import_slot();
            self.join_or_start_import(&mut slot, jwk)
        };
        future.await
    }

    /// Caller holds the import lock
    fn join_or_start_import(&self, slot: &mut Option<ImportState>, jwk: PublicJwk) -> ImportFuture {
        match slot.as_ref() {
            Some(existing) => {
                if existing.jwk != jwk {
                    tracing::warn!("Server public key already imported; ignoring a different JWK");
                }
                existing.future.clone()
            }
            None => {
                let future = Self::start_import(self.inner.server_key.clone(), jwk.clone());
                *slot = Some(ImportState {
                    jwk,
                    future: future.clone(),
                });
                future
            }
        }
    }

    fn start_import(target: Arc<OnceLock<ServerPublicKey>>, jwk: PublicJwk) -> ImportFuture {
        async move {
            match ServerPublicKey::from_jwk(&jwk) {
                Ok(key) => {
                    tracing::info!(
                        "🔐 Server public key imported ({} bits, kid: {})",
                        key.modulus_bits(),
                        key.kid().unwrap_or("none")
                    );
                    let _ = target.set(key);
                    Ok(())
                }
                Err(e) => {
                    tracing::warn!("Server public key rejected, encryption disabled: {}", e);
                    Err(e)
                }
            }
        }
        .boxed()
        .shared()
    }

    /// True iff the import succeeded and the key is held
    pub fn is_ready(&self) -> bool {
        self.inner.server_key.get().is_some()
    }

    /// Whether an import was ever started
    pub fn import_started(&self) -> bool {
        self.import_slot().is_some()
    }

    /// Await an in-flight import, if any, and report readiness
    pub async fn wait_until_ready(&self) -> bool {
        let pending = self.import_slot().as_ref().map(|s| s.future.clone());
        if let Some(future) = pending {
            let _ = future.await;
        }
        self.is_ready()
    }

    /// Import the key handed over by the server render, at most once
    ///
    /// Takes the JWK slot from `state`. A missing or `null` slot leaves
    /// encryption disabled; nothing is fetched.
    ///
    /// The hydrated flag, the slot take and the import registration happen
    /// under the import lock, so a concurrent caller either finds the
    /// import in flight or finds no key at all.
    pub async fn hydrate(&self, state: &TransferState) -> Result<(), CryptoError> {
        let (pending, first) = {
            let mut slot = self.import_slot();
            if self.inner.hydrated.swap(true, Ordering::AcqRel) {
                (slot.as_ref().map(|s| s.future.clone()), false)
            } else {
                match state.take(&SERVER_PUBLIC_JWK) {
                    Ok(Some(Some(jwk))) => (Some(self.join_or_start_import(&mut slot, jwk)), true),
                    Ok(Some(None)) | Ok(None) => {
                        tracing::info!(
                            "No server public key in transfer state, encryption disabled"
                        );
                        (None, true)
                    }
                    Err(e) => {
                        tracing::warn!("Unreadable server public key slot: {}", e);
                        return Err(CryptoError::key_import(e));
                    }
                }
            }
        };

        let Some(future) = pending else {
            return Ok(());
        };
        let outcome = future.await;
        if first {
            outcome
        } else {
            Ok(())
        }
    }

    /// Seal a JSON-serializable value for the server
    pub async fn encrypt<T: Serialize + ?Sized>(
        &self,
        plaintext: &T,
    ) -> Result<SealedRequest, CryptoError> {
        self.encrypt_with_aad(plaintext, &[]).await
    }

    /// Seal a value with additional authenticated data
    ///
    /// The AAD is remembered with the session entry and used again to open
    /// the reply. The table is only written once every step succeeded.
    pub async fn encrypt_with_aad<T: Serialize + ?Sized>(
        &self,
        plaintext: &T,
        aad: &[u8],
    ) -> Result<SealedRequest, CryptoError> {
        let server_key = self.inner.server_key.get().ok_or(CryptoError::NotReady)?;

        let session_key = SessionKey::generate();
        let iv = codec::random_array::<IV_SIZE>();
        let nonce = codec::random_nonce(self.inner.nonce_bytes);

        let json =
            serde_json::to_vec(plaintext).map_err(|e| CryptoError::encryption("serialize", e))?;
        let data = encrypt_aes_gcm(&json, &iv, aad, &session_key)?;
        let wrapped = server_key.wrap_key(session_key.as_bytes())?;

        let envelope = RequestEnvelope {
            iv: codec::bytes_to_b64(&iv),
            data: codec::bytes_to_b64(&data),
            ek: codec::bytes_to_b64(&wrapped),
            nonce: nonce.clone(),
        };

        self.inner
            .sessions
            .register(nonce.clone(), session_key, aad.to_vec())
            .await?;

        tracing::debug!("📦 Envelope sealed (nonce {}…)", short(&nonce));
        Ok(SealedRequest { envelope, nonce })
    }

    /// Open a reply envelope and consume its session
    ///
    /// The entry is removed before decryption is attempted, so a nonce can
    /// never be used twice, whether or not this call succeeds.
    pub async fn decrypt(&self, envelope: &ResponseEnvelope) -> Result<Value, CryptoError> {
        let entry = self
            .inner
            .sessions
            .take(&envelope.nonce)
            .await
            .ok_or(CryptoError::UnknownSession)?;

        let iv = codec::b64_to_bytes(&envelope.iv)?;
        let data = codec::b64_to_bytes(&envelope.data)?;
        let plaintext = decrypt_aes_gcm(&data, &iv, entry.aad(), entry.key())?;
        let text = codec::bytes_to_str(&plaintext)?;

        tracing::debug!("📭 Envelope opened (nonce {}…)", short(&envelope.nonce));
        serde_json::from_str(&text).map_err(|e| CryptoError::decryption("parse", e))
    }

    /// [`decrypt`](Self::decrypt) into a concrete type
    pub async fn decrypt_as<T: DeserializeOwned>(
        &self,
        envelope: &ResponseEnvelope,
    ) -> Result<T, CryptoError> {
        let value = self.decrypt(envelope).await?;
        serde_json::from_value(value).map_err(|e| CryptoError::decryption("parse", e))
    }

    /// Forget a session early; absent nonces are ignored
    pub async fn drop_session(&self, nonce: &str) {
        self.inner.sessions.remove(nonce).await;
    }

    /// Forget a session without awaiting; see [`SessionKeyStore::discard`]
    pub fn discard_session(&self, nonce: &str) {
        self.inner.sessions.discard(nonce);
    }

    /// Sessions awaiting a reply
    pub async fn live_sessions(&self) -> usize {
        self.inner.sessions.count().await
    }

    pub async fn evict_expired(&self) -> usize {
        self.inner.sessions.evict_expired().await
    }

    pub fn nonce_bytes(&self) -> usize {
        self.inner.nonce_bytes
    }
}

impl Default for CryptoSession {
    fn default() -> Self {
        Self::new()
    }
}

fn short(nonce: &str) -> &str {
    nonce.get(..6).unwrap_or(nonce)
}
