// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Runtime wiring for the two execution contexts
//!
//! [`ServerRender`] is built per incoming page request: it bootstraps the
//! server key, forwards the visitor's cookie, records failed calls and
//! serializes the transfer state. [`ClientRuntime`] is built once from that
//! serialized state and encrypts mutating API calls.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::bootstrap::{BootstrapError, HttpJwkSource, JwkSource, KeyBootstrap};
use crate::config::{ConfigError, EncryptionConfig};
use crate::crypto::{CryptoSession, PublicJwk};
use crate::http::stages::{
    CookieForwardStage, EncryptionPolicy, EncryptionStage, ErrorRecordStage, ErrorReplayStage,
};
use crate::http::{Pipeline, ReqwestTransport, RequestError, Transport};
use crate::transfer_state::{TransferError, TransferState};

/// Timeout for API calls made through the default transport
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Server render pass
    Server,
    /// Client runtime hydrated from a server render
    Browser,
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Request(#[from] RequestError),

    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),

    #[error(transparent)]
    Transfer(#[from] TransferError),
}

/// Build the default stage order for `mode`
fn build_pipeline(
    config: &EncryptionConfig,
    mode: ExecutionMode,
    state: &TransferState,
    session: &CryptoSession,
    incoming_cookie: Option<&str>,
    transport: Arc<dyn Transport>,
) -> Result<Pipeline, ConfigError> {
    let api_base = Url::parse(&config.api_base_url)
        .map_err(|e| ConfigError::Invalid(format!("API base URL: {}", e)))?;
    let policy = EncryptionPolicy::from_config(config)?;

    let mut encryption = EncryptionStage::new(session.clone(), policy, mode);
    if mode == ExecutionMode::Browser {
        encryption = encryption.with_transfer_state(state.clone());
    }

    Ok(Pipeline::builder()
        .stage(ErrorReplayStage::new(state.clone(), mode))
        .stage(ErrorRecordStage::new(state.clone(), mode))
        .stage(CookieForwardStage::new(api_base, incoming_cookie, mode))
        .stage(encryption)
        .build(transport))
}

/// State and pipeline for one server render pass
pub struct ServerRender {
    state: TransferState,
    bootstrap: KeyBootstrap,
    pipeline: Pipeline,
}

impl ServerRender {
    /// Render pass talking to the configured API over HTTP
    pub fn new(
        config: &EncryptionConfig,
        incoming_cookie: Option<&str>,
    ) -> Result<Self, RuntimeError> {
        config.validate().map_err(ConfigError::Invalid)?;
        let source = HttpJwkSource::from_config(config)?;
        let transport = ReqwestTransport::new(&config.api_base_url, DEFAULT_REQUEST_TIMEOUT)?;
        Self::with_parts(config, incoming_cookie, Arc::new(source), Arc::new(transport))
    }

    pub fn with_parts(
        config: &EncryptionConfig,
        incoming_cookie: Option<&str>,
        source: Arc<dyn JwkSource>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, RuntimeError> {
        config.validate().map_err(ConfigError::Invalid)?;
        let state = TransferState::new();
        let session = CryptoSession::from_config(config);
        let pipeline = build_pipeline(
            config,
            ExecutionMode::Server,
            &state,
            &session,
            incoming_cookie,
            transport,
        )?;
        let bootstrap = KeyBootstrap::new(
            source,
            config.bootstrap_policy,
            config.bootstrap_timeout(),
            ExecutionMode::Server,
        );
        Ok(Self {
            state,
            bootstrap,
            pipeline,
        })
    }

    /// Run the key bootstrap; see [`KeyBootstrap::run`]
    pub async fn bootstrap(&self) -> Result<Option<PublicJwk>, BootstrapError> {
        self.bootstrap.run(&self.state).await
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn transfer_state(&self) -> &TransferState {
        &self.state
    }

    /// Serialize the transfer state for embedding in the rendered page
    pub fn finish(self) -> Result<String, TransferError> {
        let json = self.state.to_script_json()?;
        tracing::debug!("Render finished with {} transfer slots", self.state.len());
        Ok(json)
    }
}

/// Client runtime hydrated from a server render
pub struct ClientRuntime {
    state: TransferState,
    session: CryptoSession,
    pipeline: Pipeline,
}

impl ClientRuntime {
    /// Hydrate from `serialized_state` and talk to the configured API over HTTP
    pub async fn hydrate(
        config: &EncryptionConfig,
        serialized_state: &str,
    ) -> Result<Self, RuntimeError> {
        config.validate().map_err(ConfigError::Invalid)?;
        let transport = ReqwestTransport::new(&config.api_base_url, DEFAULT_REQUEST_TIMEOUT)?;
        Self::with_transport(config, serialized_state, Arc::new(transport)).await
    }

    /// Hydrate with an injected transport
    ///
    /// A key that fails to import leaves encryption disabled; the runtime
    /// itself still starts.
    pub async fn with_transport(
        config: &EncryptionConfig,
        serialized_state: &str,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, RuntimeError> {
        config.validate().map_err(ConfigError::Invalid)?;
        let state = TransferState::from_json(serialized_state)?;
        let session = CryptoSession::from_config(config);
        let pipeline = build_pipeline(
            config,
            ExecutionMode::Browser,
            &state,
            &session,
            None,
            transport,
        )?;

        if let Err(e) = session.hydrate(&state).await {
            tracing::warn!("Encryption disabled for this runtime: {}", e);
        }

        Ok(Self {
            state,
            session,
            pipeline,
        })
    }

    pub fn session(&self) -> &CryptoSession {
        &self.session
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn transfer_state(&self) -> &TransferState {
        &self.state
    }
}
