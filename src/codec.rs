// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Codec Utilities
//!
//! Binary, base64 and UTF-8 conversions plus OS-backed random bytes. Every
//! other module goes through these helpers so the wire encodings stay in
//! one place:
//!
//! - `iv`, `data`, `ek`: standard base64 with padding
//! - `nonce`: base64url without padding
//!
//! Decoding is lenient about the alphabet and padding because envelopes may
//! come from Web Crypto code that uses either form.

use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine as _,
};
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;

/// Errors raised while decoding wire text
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("invalid base64: {0}")]
    InvalidBase64(String),

    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(String),
}

/// Encode bytes as standard, padded base64
pub fn bytes_to_b64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode base64 text in either the standard or the URL-safe alphabet,
/// with or without padding.
pub fn b64_to_bytes(text: &str) -> Result<Vec<u8>, CodecError> {
    let normalized = b64_to_b64url(text.trim());
    URL_SAFE_NO_PAD
        .decode(normalized.as_bytes())
        .map_err(|e| CodecError::InvalidBase64(e.to_string()))
}

/// Encode bytes as base64url without padding
pub fn bytes_to_b64url(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode base64url text (padding tolerated)
pub fn b64url_to_bytes(text: &str) -> Result<Vec<u8>, CodecError> {
    URL_SAFE_NO_PAD
        .decode(text.trim().trim_end_matches('=').as_bytes())
        .map_err(|e| CodecError::InvalidBase64(e.to_string()))
}

/// Rewrite standard base64 text into the URL-safe alphabet and strip padding
pub fn b64_to_b64url(b64: &str) -> String {
    b64.trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect()
}

/// Rewrite base64url text into the standard alphabet and restore padding
pub fn b64url_to_b64(b64url: &str) -> String {
    let mut out: String = b64url
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();
    while out.len() % 4 != 0 {
        out.push('=');
    }
    out
}

pub fn str_to_bytes(text: &str) -> Vec<u8> {
    text.as_bytes().to_vec()
}

/// Strict UTF-8 decoding; invalid sequences are an error, never replaced
pub fn bytes_to_str(bytes: &[u8]) -> Result<String, CodecError> {
    String::from_utf8(bytes.to_vec()).map_err(|e| CodecError::InvalidUtf8(e.to_string()))
}

/// Fill a fresh buffer of `len` bytes from the OS CSPRNG
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    OsRng.fill_bytes(&mut buf);
    buf
}

/// Fixed-size variant of [`random_bytes`]
pub fn random_array<const N: usize>() -> [u8; N] {
    let mut buf = [0u8; N];
    OsRng.fill_bytes(&mut buf);
    buf
}

/// Random correlation nonce, base64url-encoded.
///
/// Callers are responsible for asking for at least 16 bytes; the session
/// service enforces that floor.
pub fn random_nonce(len: usize) -> String {
    bytes_to_b64url(&random_bytes(len))
}
