// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Server Public Key (RSA-OAEP / SHA-256)
//!
//! Imports the server's RSA public key from a JSON Web Key and wraps raw
//! AES session keys for it. Matches Web Crypto's
//! `{ name: "RSA-OAEP", hash: "SHA-256" }`, i.e. OAEP with SHA-256 for both
//! the label hash and MGF1.
//!
//! ## Accepted JWKs
//!
//! - `kty` must be `"RSA"`
//! - `n` and `e` are base64url big-endian integers
//! - `alg`, if present, must be `"RSA-OAEP-256"`
//! - `use`, if present, must be `"enc"`
//! - `key_ops`, if present, must contain `"encrypt"`
//! - a private exponent `d` is rejected outright

use rand::rngs::OsRng;
use rsa::{traits::PublicKeyParts, BigUint, Oaep, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use super::error::CryptoError;
use crate::codec;

/// JWK `alg` value for RSA-OAEP with SHA-256
pub const JWK_ALG_RSA_OAEP_256: &str = "RSA-OAEP-256";

/// RSA public key in JSON Web Key form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicJwk {
    pub kty: String,
    pub n: String,
    pub e: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_ops: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    /// Only captured so private keys can be refused
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,
}

impl PublicJwk {
    /// Export an RSA public key as an encryption JWK
    pub fn from_public_key(key: &RsaPublicKey) -> Self {
        Self {
            kty: "RSA".to_string(),
            n: codec::bytes_to_b64url(&key.n().to_bytes_be()),
            e: codec::bytes_to_b64url(&key.e().to_bytes_be()),
            alg: Some(JWK_ALG_RSA_OAEP_256.to_string()),
            key_use: Some("enc".to_string()),
            key_ops: Some(vec!["encrypt".to_string()]),
            ext: Some(true),
            kid: None,
            d: None,
        }
    }

    fn validate(&self) -> Result<(), CryptoError> {
        if self.kty != "RSA" {
            return Err(CryptoError::key_import(format!(
                "unsupported key type '{}'",
                self.kty
            )));
        }
        if self.d.is_some() {
            return Err(CryptoError::key_import("private key material is not accepted"));
        }
        if let Some(alg) = &self.alg {
            if alg != JWK_ALG_RSA_OAEP_256 {
                return Err(CryptoError::key_import(format!(
                    "algorithm '{}' does not match {}",
                    alg, JWK_ALG_RSA_OAEP_256
                )));
            }
        }
        if let Some(key_use) = &self.key_use {
            if key_use != "enc" {
                return Err(CryptoError::key_import(format!(
                    "key use '{}' is not 'enc'",
                    key_use
                )));
            }
        }
        if let Some(ops) = &self.key_ops {
            if !ops.iter().any(|op| op == "encrypt") {
                return Err(CryptoError::key_import("key_ops does not allow 'encrypt'"));
            }
        }
        Ok(())
    }
}

/// Imported server key, usable for encryption only
#[derive(Debug, Clone)]
pub struct ServerPublicKey {
    key: RsaPublicKey,
    kid: Option<String>,
}

impl ServerPublicKey {
    /// Import a JWK as an RSA-OAEP/SHA-256 encryption key
    pub fn from_jwk(jwk: &PublicJwk) -> Result<Self, CryptoError> {
        jwk.validate()?;

        let n = decode_component("n", &jwk.n)?;
        let e = decode_component("e", &jwk.e)?;

        let key = RsaPublicKey::new(BigUint::from_bytes_be(&n), BigUint::from_bytes_be(&e))
            .map_err(CryptoError::key_import)?;

        Ok(Self {
            key,
            kid: jwk.kid.clone(),
        })
    }

    /// Wrap raw key bytes with RSA-OAEP/SHA-256
    pub fn wrap_key(&self, raw: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.key
            .encrypt(&mut OsRng, Oaep::new::<Sha256>(), raw)
            .map_err(|e| CryptoError::encryption("rsa_oaep", e))
    }

    pub fn modulus_bits(&self) -> usize {
        self.key.n().bits()
    }

    pub fn kid(&self) -> Option<&str> {
        self.kid.as_deref()
    }
}

fn decode_component(name: &str, value: &str) -> Result<Vec<u8>, CryptoError> {
    let bytes = codec::b64url_to_bytes(value)
        .map_err(|e| CryptoError::key_import(format!("component '{}': {}", name, e)))?;
    if bytes.is_empty() {
        return Err(CryptoError::key_import(format!("component '{}' is empty", name)));
    }
    Ok(bytes)
}
