// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Envelope wire types.
//!
//! Request: `{ iv, data, ek, nonce }`. Response: `{ iv, data, nonce }`.
//! All values are base64 text; see [`crate::codec`] for the alphabets.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::CryptoError;

/// Encrypted substitute for a plaintext request body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// 12-byte AES-GCM IV, base64
    pub iv: String,
    /// Ciphertext with tag, base64
    pub data: String,
    /// RSA-OAEP wrapped AES key, base64. Older clients called this `key`.
    #[serde(alias = "key")]
    pub ek: String,
    /// Correlation nonce, base64url
    pub nonce: String,
}

impl RequestEnvelope {
    /// The same envelope without the wrapped key, as the server would echo it
    pub fn to_response(&self) -> ResponseEnvelope {
        ResponseEnvelope {
            iv: self.iv.clone(),
            data: self.data.clone(),
            nonce: self.nonce.clone(),
        }
    }
}

/// Encrypted substitute for a plaintext response (or error) body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResponseEnvelope {
    pub iv: String,
    pub data: String,
    pub nonce: String,
}

const RESPONSE_FIELDS: [&str; 3] = ["iv", "data", "nonce"];

impl ResponseEnvelope {
    /// Strict structural check: an object with exactly `iv`, `data` and
    /// `nonce`, all strings.
    pub fn matches_shape(body: &Value) -> bool {
        Self::from_value(body).is_ok()
    }

    /// Parse a response body that is expected to be an envelope
    pub fn from_value(body: &Value) -> Result<Self, CryptoError> {
        let object = body.as_object().ok_or_else(|| CryptoError::InvalidEnvelope {
            field: "body".to_string(),
            reason: "not a JSON object".to_string(),
        })?;

        if let Some(extra) = object
            .keys()
            .find(|k| !RESPONSE_FIELDS.contains(&k.as_str()))
        {
            return Err(CryptoError::InvalidEnvelope {
                field: extra.clone(),
                reason: "unexpected field".to_string(),
            });
        }

        let field = |name: &str| -> Result<String, CryptoError> {
            match object.get(name) {
                Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
                Some(_) => Err(CryptoError::InvalidEnvelope {
                    field: name.to_string(),
                    reason: "expected a non-empty string".to_string(),
                }),
                None => Err(CryptoError::InvalidEnvelope {
                    field: name.to_string(),
                    reason: "missing".to_string(),
                }),
            }
        };

        Ok(Self {
            iv: field("iv")?,
            data: field("data")?,
            nonce: field("nonce")?,
        })
    }
}

impl From<RequestEnvelope> for ResponseEnvelope {
    fn from(envelope: RequestEnvelope) -> Self {
        Self {
            iv: envelope.iv,
            data: envelope.data,
            nonce: envelope.nonce,
        }
    }
}

/// Result of sealing a request body
#[derive(Debug, Clone)]
pub struct SealedRequest {
    pub envelope: RequestEnvelope,
    pub nonce: String,
}
