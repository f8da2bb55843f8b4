// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Crypto Error Types
//!
//! Error taxonomy for the envelope layer.
//!
//! ## Error Variants
//!
//! - **NotReady**: encryption requested before the server key import completed
//! - **KeyImportFailed**: malformed or rejected JWK; encryption stays disabled
//! - **UnknownSession**: no live session key for the envelope's nonce
//! - **DecryptionFailed**: AES-GCM tag mismatch, malformed ciphertext or plaintext
//! - **EncryptionFailed**: a primitive failed while building an envelope
//! - **InvalidEnvelope**: envelope JSON does not have the expected shape
//! - **NonceCollision**: a freshly generated nonce is already live
//! - **Other**: unexpected library failures
//!
//! `UnknownSession` deliberately carries no nonce so callers cannot learn
//! whether a nonce ever existed.

use std::fmt;

use crate::codec::CodecError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// The server public key has not been imported (yet, or ever)
    NotReady,

    /// The server JWK was malformed or rejected
    KeyImportFailed {
        /// Specific failure reason
        reason: String,
    },

    /// No session key is registered for the nonce (expired, consumed, or forged)
    UnknownSession,

    /// AEAD decryption failed
    ///
    /// This error occurs when:
    /// - Authentication tag verification fails (tampered data or wrong key)
    /// - IV or ciphertext is malformed
    /// - Decrypted bytes are not valid UTF-8 JSON
    DecryptionFailed {
        /// Which step was being performed
        operation: String,
        /// Specific failure reason
        reason: String,
    },

    /// Building an envelope failed
    EncryptionFailed {
        /// Which step was being performed
        operation: String,
        /// Specific failure reason
        reason: String,
    },

    /// Envelope JSON failed structural validation
    InvalidEnvelope {
        /// Which field failed validation
        field: String,
        /// Specific failure reason
        reason: String,
    },

    /// The nonce drawn for a new envelope is already registered
    NonceCollision,

    /// Generic error for library errors or unexpected failures
    Other(String),
}

impl CryptoError {
    pub(crate) fn decryption(operation: &str, reason: impl fmt::Display) -> Self {
        CryptoError::DecryptionFailed {
            operation: operation.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn encryption(operation: &str, reason: impl fmt::Display) -> Self {
        CryptoError::EncryptionFailed {
            operation: operation.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn key_import(reason: impl fmt::Display) -> Self {
        CryptoError::KeyImportFailed {
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CryptoError::NotReady => write!(f, "Encryption not ready: server public key not imported"),
            CryptoError::KeyImportFailed { reason } => {
                write!(f, "Server public key import failed: {}", reason)
            }
            CryptoError::UnknownSession => write!(f, "No live session key for nonce"),
            CryptoError::DecryptionFailed { operation, reason } => {
                write!(f, "Decryption failed during {}: {}", operation, reason)
            }
            CryptoError::EncryptionFailed { operation, reason } => {
                write!(f, "Encryption failed during {}: {}", operation, reason)
            }
            CryptoError::InvalidEnvelope { field, reason } => {
                write!(f, "Invalid envelope field '{}': {}", field, reason)
            }
            CryptoError::NonceCollision => write!(f, "Generated nonce is already in use"),
            CryptoError::Other(msg) => write!(f, "Crypto error: {}", msg),
        }
    }
}

impl std::error::Error for CryptoError {}

// Codec failures only happen while reading envelopes
impl From<CodecError> for CryptoError {
    fn from(err: CodecError) -> Self {
        CryptoError::decryption("decode", err)
    }
}
