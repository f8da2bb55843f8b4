// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Session Key Storage
//!
//! In-memory table of live AES session keys, indexed by the correlation
//! nonce of the request that created them. An entry lives from envelope
//! creation until the matching response is decrypted, the caller drops it,
//! or its TTL elapses.
//!
//! **Security**: keys are stored in memory only and never persisted or logged.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use super::aes_gcm::SessionKey;
use super::error::CryptoError;

/// A live session: the AES key and the AAD its request was sealed with
pub struct SessionEntry {
    key: SessionKey,
    aad: Vec<u8>,
    created_at: Instant,
}

impl SessionEntry {
    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn aad(&self) -> &[u8] {
        &self.aad
    }

    fn is_expired(&self, ttl: Option<Duration>) -> bool {
        ttl.map_or(false, |ttl| self.created_at.elapsed() >= ttl)
    }
}

/// Thread-safe `nonce -> session key` table
///
/// Every mutation is a single map operation under the write lock, so
/// concurrent requests never observe a half-registered or half-consumed
/// entry.
///
/// # Example
///
/// ```ignore
/// let store = SessionKeyStore::new();
/// store.register("nonce-123".to_string(), SessionKey::generate(), Vec::new()).await?;
/// let entry = store.take("nonce-123").await;
/// assert!(store.take("nonce-123").await.is_none());
/// ```
#[derive(Clone)]
pub struct SessionKeyStore {
    entries: Arc<RwLock<HashMap<String, SessionEntry>>>,
    ttl: Option<Duration>,
}

impl SessionKeyStore {
    /// Create a store whose entries never expire on their own
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl: None,
        }
    }

    /// Create a store whose entries expire `ttl` after registration
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl: Some(ttl),
        }
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Register a session key under `nonce`
    ///
    /// Refuses to overwrite a live entry: a key is never shared between two
    /// nonces and a nonce never maps to two keys. Expired entries are swept
    /// first, so abandoned sessions never outlive the next registration.
    pub async fn register(
        &self,
        nonce: String,
        key: SessionKey,
        aad: Vec<u8>,
    ) -> Result<(), CryptoError> {
        let mut entries = self.entries.write().await;
        if let Some(ttl) = self.ttl {
            let before = entries.len();
            entries.retain(|_, entry| !entry.is_expired(Some(ttl)));
            let swept = before - entries.len();
            if swept > 0 {
                tracing::debug!("🗑️  Swept {} expired session keys", swept);
            }
        }
        if entries.contains_key(&nonce) {
            return Err(CryptoError::NonceCollision);
        }
        entries.insert(
            nonce,
            SessionEntry {
                key,
                aad,
                created_at: Instant::now(),
            },
        );
        tracing::debug!("🔑 Session key registered (live sessions: {})", entries.len());
        Ok(())
    }

    /// Remove and return the entry for `nonce`
    ///
    /// At most one caller can ever obtain a given entry. Expired entries are
    /// discarded and reported as missing.
    pub async fn take(&self, nonce: &str) -> Option<SessionEntry> {
        let mut entries = self.entries.write().await;
        let entry = entries.remove(nonce)?;
        if entry.is_expired(self.ttl) {
            tracing::debug!("Session key expired before use");
            return None;
        }
        Some(entry)
    }

    /// Whether a live entry exists for `nonce`
    pub async fn contains(&self, nonce: &str) -> bool {
        let entries = self.entries.read().await;
        entries
            .get(nonce)
            .map_or(false, |entry| !entry.is_expired(self.ttl))
    }

    /// Drop the entry for `nonce`; absent entries are not an error
    pub async fn remove(&self, nonce: &str) -> bool {
        let mut entries = self.entries.write().await;
        let removed = entries.remove(nonce).is_some();
        if removed {
            tracing::debug!("🗑️  Session key dropped (remaining: {})", entries.len());
        }
        removed
    }

    /// Drop the entry for `nonce` without awaiting
    ///
    /// Usable from `Drop`. When the table is busy the removal is handed to
    /// the current tokio runtime instead.
    pub fn discard(&self, nonce: &str) {
        if let Ok(mut entries) = self.entries.try_write() {
            entries.remove(nonce);
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let store = self.clone();
                let nonce = nonce.to_string();
                handle.spawn(async move {
                    store.remove(&nonce).await;
                });
            }
            Err(_) => tracing::warn!("Session key not discarded: no runtime, table busy"),
        }
    }

    /// Number of stored entries, expired ones included until evicted
    pub async fn count(&self) -> usize {
        let entries = self.entries.read().await;
        entries.len()
    }

    /// Remove every expired entry and return how many were evicted
    pub async fn evict_expired(&self) -> usize {
        let Some(ttl) = self.ttl else {
            return 0;
        };
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(Some(ttl)));
        let evicted = before - entries.len();
        if evicted > 0 {
            tracing::info!("🗑️  Evicted {} expired session keys", evicted);
        }
        evicted
    }

    /// Clear all session keys
    pub async fn clear_all(&self) {
        let mut entries = self.entries.write().await;
        let count = entries.len();
        entries.clear();
        tracing::info!("🗑️  Cleared all session keys (count: {})", count);
    }
}

impl Default for SessionKeyStore {
    fn default() -> Self {
        Self::new()
    }
}
