// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Render Transfer State
//!
//! One-shot handoff from the server render pass to the client runtime.
//! Each slot is addressed by a typed [`StateKey`], may be written once, and
//! is removed when read. The whole state serializes to a JSON object that
//! can be embedded in the rendered page and parsed back on the client.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

use crate::crypto::PublicJwk;

/// Slot carrying the server's public JWK, or `null` when bootstrap degraded
pub const SERVER_PUBLIC_JWK: StateKey<Option<PublicJwk>> = StateKey::new("SERVER_PUBLIC_JWK");

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    #[error("transfer slot '{0}' was already written")]
    AlreadyWritten(String),

    #[error("transfer slot '{key}' could not be serialized: {reason}")]
    Serialize { key: String, reason: String },

    #[error("transfer slot '{key}' holds an unexpected value: {reason}")]
    Deserialize { key: String, reason: String },

    #[error("serialized transfer state is invalid: {0}")]
    Malformed(String),
}

/// Name of a transfer slot together with the type stored in it
pub struct StateKey<T> {
    name: Cow<'static, str>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> StateKey<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name: Cow::Borrowed(name),
            _marker: PhantomData,
        }
    }

    /// Key whose name is only known at runtime (e.g. derived from a URL)
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Cow::Owned(name.into()),
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T> Clone for StateKey<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for StateKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StateKey").field(&self.name).finish()
    }
}

#[derive(Default)]
struct Slots {
    values: Map<String, Value>,
    written: HashSet<String>,
}

/// Shared, cloneable transfer state
#[derive(Clone, Default)]
pub struct TransferState {
    slots: Arc<Mutex<Slots>>,
}

impl TransferState {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write a slot. A slot can be written once for the lifetime of the
    /// state, even after it has been taken.
    pub fn set<T: Serialize>(&self, key: &StateKey<T>, value: &T) -> Result<(), TransferError> {
        let value = serde_json::to_value(value).map_err(|e| TransferError::Serialize {
            key: key.name().to_string(),
            reason: e.to_string(),
        })?;

        let mut slots = self.lock();
        if !slots.written.insert(key.name().to_string()) {
            return Err(TransferError::AlreadyWritten(key.name().to_string()));
        }
        slots.values.insert(key.name().to_string(), value);
        tracing::debug!("Transfer slot '{}' written", key.name());
        Ok(())
    }

    /// Remove and return a slot. `Ok(None)` when the slot is absent.
    pub fn take<T: DeserializeOwned>(&self, key: &StateKey<T>) -> Result<Option<T>, TransferError> {
        let Some(value) = self.lock().values.remove(key.name()) else {
            return Ok(None);
        };
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| TransferError::Deserialize {
                key: key.name().to_string(),
                reason: e.to_string(),
            })
    }

    pub fn has_key<T>(&self, key: &StateKey<T>) -> bool {
        self.lock().values.contains_key(key.name())
    }

    pub fn len(&self) -> usize {
        self.lock().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().values.is_empty()
    }

    /// Serialize the remaining slots as a JSON object
    pub fn to_json(&self) -> Result<String, TransferError> {
        let slots = self.lock();
        serde_json::to_string(&slots.values).map_err(|e| TransferError::Malformed(e.to_string()))
    }

    /// JSON safe to place inside `<script type="application/json">`
    pub fn to_script_json(&self) -> Result<String, TransferError> {
        let json = self.to_json()?;
        let mut escaped = String::with_capacity(json.len());
        for c in json.chars() {
            match c {
                '<' => escaped.push_str("\\u003c"),
                '>' => escaped.push_str("\\u003e"),
                '&' => escaped.push_str("\\u0026"),
                other => escaped.push(other),
            }
        }
        Ok(escaped)
    }

    /// Rebuild a state from its serialized form. Every slot present counts
    /// as written.
    pub fn from_json(json: &str) -> Result<Self, TransferError> {
        let trimmed = json.trim();
        if trimmed.is_empty() {
            return Ok(Self::new());
        }
        let values: Map<String, Value> =
            serde_json::from_str(trimmed).map_err(|e| TransferError::Malformed(e.to_string()))?;
        let written = values.keys().cloned().collect();
        Ok(Self {
            slots: Arc::new(Mutex::new(Slots { values, written })),
        })
    }
}

impl fmt::Debug for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.lock();
        f.debug_struct("TransferState")
            .field("slots", &slots.values.keys().collect::<Vec<_>>())
            .finish()
    }
}
