// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Key Bootstrap
//!
//! Fetches the server's public JWK once per server render and writes it to
//! the transfer state under [`SERVER_PUBLIC_JWK`], where the client runtime
//! picks it up. The fetch carries a deadline; what happens when it fails is
//! decided by the deployment's [`BootstrapPolicy`].

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::OnceCell;

use crate::config::EncryptionConfig;
use crate::crypto::PublicJwk;
use crate::runtime::ExecutionMode;
use crate::transfer_state::{TransferError, TransferState, SERVER_PUBLIC_JWK};

/// Outcome of a failed key fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapPolicy {
    /// The render fails and nothing is written
    #[default]
    FailFast,
    /// `null` is written and the client runs without encryption
    Degrade,
}

impl FromStr for BootstrapPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fail_fast" | "fail-fast" | "failfast" => Ok(BootstrapPolicy::FailFast),
            "degrade" => Ok(BootstrapPolicy::Degrade),
            other => Err(format!("unknown bootstrap policy '{}'", other)),
        }
    }
}

impl fmt::Display for BootstrapPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootstrapPolicy::FailFast => write!(f, "fail_fast"),
            BootstrapPolicy::Degrade => write!(f, "degrade"),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum BootstrapError {
    #[error("public key fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error("public key fetch failed: {0}")]
    Fetch(String),

    #[error("public key endpoint returned no key")]
    MissingKey,

    #[error("key bootstrap only runs during a server render")]
    NotServerRender,

    #[error(transparent)]
    Transfer(#[from] TransferError),
}

/// Where the server public key comes from
#[async_trait]
pub trait JwkSource: Send + Sync {
    /// `Ok(None)` when the endpoint answered with `null`
    async fn fetch_jwk(&self) -> Result<Option<PublicJwk>, BootstrapError>;
}

/// `GET <api base><public key path>`
pub struct HttpJwkSource {
    client: Client,
    url: String,
    timeout: Duration,
}

impl HttpJwkSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, BootstrapError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BootstrapError::Fetch(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
            timeout,
        })
    }

    pub fn from_config(config: &EncryptionConfig) -> Result<Self, BootstrapError> {
        Self::new(config.public_key_url(), config.bootstrap_timeout())
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn map_error(&self, err: reqwest::Error) -> BootstrapError {
        if err.is_timeout() {
            BootstrapError::Timeout(self.timeout)
        } else {
            BootstrapError::Fetch(err.to_string())
        }
    }
}

#[async_trait]
impl JwkSource for HttpJwkSource {
    async fn fetch_jwk(&self) -> Result<Option<PublicJwk>, BootstrapError> {
        tracing::debug!("Fetching server public key from {}", self.url);

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BootstrapError::Fetch(format!("HTTP {}", status)));
        }

        response
            .json::<Option<PublicJwk>>()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BootstrapError::Timeout(self.timeout)
                } else {
                    BootstrapError::Fetch(format!("invalid JWK: {}", e))
                }
            })
    }
}

/// One bootstrap per server render
///
/// Repeated or concurrent [`run`](Self::run) calls share a single fetch and
/// a single transfer-state write.
pub struct KeyBootstrap {
    source: Arc<dyn JwkSource>,
    policy: BootstrapPolicy,
    timeout: Duration,
    mode: ExecutionMode,
    outcome: OnceCell<Result<Option<PublicJwk>, BootstrapError>>,
}

impl KeyBootstrap {
    pub fn new(
        source: Arc<dyn JwkSource>,
        policy: BootstrapPolicy,
        timeout: Duration,
        mode: ExecutionMode,
    ) -> Self {
        Self {
            source,
            policy,
            timeout,
            mode,
            outcome: OnceCell::new(),
        }
    }

    pub fn from_config(config: &EncryptionConfig, mode: ExecutionMode) -> Result<Self, BootstrapError> {
        let source = HttpJwkSource::from_config(config)?;
        Ok(Self::new(
            Arc::new(source),
            config.bootstrap_policy,
            config.bootstrap_timeout(),
            mode,
        ))
    }

    pub fn policy(&self) -> BootstrapPolicy {
        self.policy
    }

    /// Whether the bootstrap already ran to completion
    pub fn is_complete(&self) -> bool {
        self.outcome.initialized()
    }

    /// Fetch the key and write it to `state`
    ///
    /// Returns the JWK, or `None` when the fetch failed under
    /// [`BootstrapPolicy::Degrade`].
    pub async fn run(&self, state: &TransferState) -> Result<Option<PublicJwk>, BootstrapError> {
        if self.mode != ExecutionMode::Server {
            return Err(BootstrapError::NotServerRender);
        }
        self.outcome
            .get_or_init(|| self.fetch_and_store(state))
            .await
            .clone()
    }

    async fn fetch_and_store(
        &self,
        state: &TransferState,
    ) -> Result<Option<PublicJwk>, BootstrapError> {
        let fetched = match tokio::time::timeout(self.timeout, self.source.fetch_jwk()).await {
            Ok(Ok(Some(jwk))) => Ok(jwk),
            Ok(Ok(None)) => Err(BootstrapError::MissingKey),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(BootstrapError::Timeout(self.timeout)),
        };

        match fetched {
            Ok(jwk) => {
                state.set(&SERVER_PUBLIC_JWK, &Some(jwk.clone()))?;
                tracing::info!(
                    "🔑 Server public key bootstrapped (kid: {})",
                    jwk.kid.as_deref().unwrap_or("none")
                );
                Ok(Some(jwk))
            }
            Err(e) => match self.policy {
                BootstrapPolicy::FailFast => {
                    tracing::error!("Key bootstrap failed, aborting render: {}", e);
                    Err(e)
                }
                BootstrapPolicy::Degrade => {
                    tracing::warn!("Key bootstrap failed, continuing without encryption: {}", e);
                    state.set(&SERVER_PUBLIC_JWK, &None)?;
                    Ok(None)
                }
            },
        }
    }
}
