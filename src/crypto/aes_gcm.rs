// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! AES-256-GCM Session Encryption
//!
//! Symmetric half of the hybrid envelope. Output is compatible with Web
//! Crypto's `AES-GCM` with a 128-bit tag:
//!
//! ```text
//! data = ciphertext || tag (16 bytes)
//! ```
//!
//! The 12-byte IV travels separately in the envelope. Additional
//! authenticated data is empty unless request binding is enabled.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use std::fmt;
use zeroize::Zeroizing;

use super::error::CryptoError;
use crate::codec;

/// AES-256 key size in bytes
pub const AES_KEY_SIZE: usize = 32;

/// AES-GCM IV size in bytes
pub const IV_SIZE: usize = 12;

/// AES-GCM authentication tag size in bytes
pub const TAG_SIZE: usize = 16;

/// One-time AES-256-GCM key for a single request/response exchange.
///
/// The raw bytes are wiped on drop and never printed.
#[derive(Clone)]
pub struct SessionKey(Zeroizing<[u8; AES_KEY_SIZE]>);

impl SessionKey {
    /// Generate a fresh random key
    pub fn generate() -> Self {
        Self(Zeroizing::new(codec::random_array::<AES_KEY_SIZE>()))
    }

    /// Rebuild a key from raw bytes (e.g. after unwrapping on the server)
    pub fn from_slice(raw: &[u8]) -> Result<Self, CryptoError> {
        let bytes: [u8; AES_KEY_SIZE] = raw.try_into().map_err(|_| {
            CryptoError::Other(format!(
                "Invalid key size: expected {} bytes, got {}",
                AES_KEY_SIZE,
                raw.len()
            ))
        })?;
        Ok(Self(Zeroizing::new(bytes)))
    }

    /// Raw export, used only to wrap the key for the server
    pub fn as_bytes(&self) -> &[u8; AES_KEY_SIZE] {
        &self.0
    }

    fn cipher(&self) -> Result<Aes256Gcm, CryptoError> {
        Aes256Gcm::new_from_slice(self.0.as_ref())
            .map_err(|e| CryptoError::Other(format!("Failed to create AES-GCM cipher: {}", e)))
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey(<redacted>)")
    }
}

/// Encrypt `plaintext` under `key` with the given IV and AAD
///
/// # Returns
///
/// Ciphertext with the 16-byte tag appended
///
/// # Security
///
/// **CRITICAL**: never reuse an IV with the same key. Envelopes draw a fresh
/// key and IV for every call.
pub fn encrypt_aes_gcm(
    plaintext: &[u8],
    iv: &[u8; IV_SIZE],
    aad: &[u8],
    key: &SessionKey,
) -> Result<Vec<u8>, CryptoError> {
    let cipher = key.cipher()?;
    cipher
        .encrypt(
            Nonce::from_slice(iv),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| CryptoError::encryption("aes_gcm", e))
}

/// Decrypt `ciphertext || tag` under `key`
///
/// # Errors
///
/// Returns `DecryptionFailed` if:
/// - IV is not 12 bytes
/// - Ciphertext is shorter than the tag
/// - Authentication tag verification fails (wrong key, AAD, or tampered data)
pub fn decrypt_aes_gcm(
    ciphertext: &[u8],
    iv: &[u8],
    aad: &[u8],
    key: &SessionKey,
) -> Result<Vec<u8>, CryptoError> {
    if iv.len() != IV_SIZE {
        return Err(CryptoError::decryption(
            "aes_gcm",
            format!("invalid IV size: expected {} bytes, got {}", IV_SIZE, iv.len()),
        ));
    }

    if ciphertext.len() < TAG_SIZE {
        return Err(CryptoError::decryption(
            "aes_gcm",
            format!(
                "ciphertext too short: expected at least {} bytes, got {}",
                TAG_SIZE,
                ciphertext.len()
            ),
        ));
    }

    let cipher = key.cipher()?;
    cipher
        .decrypt(
            Nonce::from_slice(iv),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| {
            CryptoError::decryption(
                "aes_gcm",
                "authentication error - wrong key or corrupted data",
            )
        })
}
