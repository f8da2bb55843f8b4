// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Configuration for the envelope encryption layer

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::bootstrap::BootstrapPolicy;

/// Smallest accepted correlation nonce, in bytes
pub const MIN_NONCE_BYTES: usize = 16;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Settings shared by the server render pass and the client runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncryptionConfig {
    /// Absolute API base URL, e.g. `http://localhost:3000/api`
    pub api_base_url: String,
    /// Only same-origin paths under this prefix are encrypted
    pub api_path_prefix: String,
    /// Key endpoint path, appended to `api_base_url`
    pub public_key_path: String,
    /// Deadline for the key fetch during a server render
    pub bootstrap_timeout_ms: u64,
    /// What a failed key fetch does to the render
    pub bootstrap_policy: BootstrapPolicy,
    /// Correlation nonce length in bytes (at least 16)
    pub nonce_bytes: usize,
    /// Lifetime of an unanswered session key; 0 disables expiry
    pub session_ttl_secs: u64,
    /// Also treat bare `{iv,data,nonce}` bodies as encrypted
    pub shape_sniffing: bool,
    /// Bind `METHOD:path` as AES-GCM additional data
    pub bind_request_aad: bool,
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3000/api".to_string(),
            api_path_prefix: "/api/".to_string(),
            public_key_path: "/crypto/public-key".to_string(),
            bootstrap_timeout_ms: 3000,
            bootstrap_policy: BootstrapPolicy::FailFast,
            nonce_bytes: MIN_NONCE_BYTES,
            session_ttl_secs: 300,
            shape_sniffing: false,
            bind_request_aad: false,
        }
    }
}

impl EncryptionConfig {
    /// Load configuration from environment variables
    ///
    /// Unset variables keep their defaults; a set but unparsable value is
    /// an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|name| env::var(name).ok())
    }

    /// Build from a variable lookup, as [`from_env`](Self::from_env) does
    pub fn from_vars(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            api_base_url: get("API_URL").unwrap_or(defaults.api_base_url),
            api_path_prefix: get("ENCRYPTION_PATH_PREFIX").unwrap_or(defaults.api_path_prefix),
            public_key_path: get("PUBLIC_KEY_PATH").unwrap_or(defaults.public_key_path),
            bootstrap_timeout_ms: parse_var(&get, "KEY_BOOTSTRAP_TIMEOUT_MS")?
                .unwrap_or(defaults.bootstrap_timeout_ms),
            bootstrap_policy: parse_var(&get, "KEY_BOOTSTRAP_POLICY")?
                .unwrap_or(defaults.bootstrap_policy),
            nonce_bytes: parse_var(&get, "ENCRYPTION_NONCE_BYTES")?
                .unwrap_or(defaults.nonce_bytes),
            session_ttl_secs: parse_var(&get, "ENCRYPTION_SESSION_TTL_SECS")?
                .unwrap_or(defaults.session_ttl_secs),
            shape_sniffing: get("ENCRYPTION_SHAPE_SNIFFING")
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.shape_sniffing),
            bind_request_aad: get("ENCRYPTION_BIND_AAD")
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.bind_request_aad),
        })
    }

    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        let base = url::Url::parse(&self.api_base_url)
            .map_err(|e| format!("API base URL '{}' is invalid: {}", self.api_base_url, e))?;
        if base.cannot_be_a_base() {
            return Err(format!("API base URL '{}' cannot be a base", self.api_base_url));
        }
        if !self.api_path_prefix.starts_with('/') {
            return Err("API path prefix must start with '/'".to_string());
        }
        if !self.public_key_path.starts_with('/') {
            return Err("Public key path must start with '/'".to_string());
        }
        if self.bootstrap_timeout_ms == 0 {
            return Err("Bootstrap timeout must be greater than 0".to_string());
        }
        if self.nonce_bytes < MIN_NONCE_BYTES {
            return Err(format!(
                "Nonce must be at least {} bytes, got {}",
                MIN_NONCE_BYTES, self.nonce_bytes
            ));
        }
        Ok(())
    }

    /// Full URL of the key endpoint
    pub fn public_key_url(&self) -> String {
        format!(
            "{}{}",
            self.api_base_url.trim_end_matches('/'),
            self.public_key_path
        )
    }

    pub fn bootstrap_timeout(&self) -> Duration {
        Duration::from_millis(self.bootstrap_timeout_ms)
    }

    pub fn session_ttl(&self) -> Option<Duration> {
        (self.session_ttl_secs > 0).then(|| Duration::from_secs(self.session_ttl_secs))
    }
}

fn parse_var<T>(get: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match get(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| ConfigError::Invalid(format!("{}={:?}: {}", name, raw, e))),
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
