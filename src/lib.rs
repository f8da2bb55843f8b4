// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod bootstrap;
pub mod cli;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod http;
pub mod runtime;
pub mod transfer_state;

// Re-export main types
pub use bootstrap::{BootstrapError, BootstrapPolicy, HttpJwkSource, JwkSource, KeyBootstrap};
pub use config::{ConfigError, EncryptionConfig};
pub use crypto::{
    CryptoError, CryptoSession, PublicJwk, RequestEnvelope, ResponseEnvelope, SealedRequest,
};
pub use http::{ApiRequest, ApiResponse, HttpError, Pipeline, RequestBody, RequestError};
pub use runtime::{ClientRuntime, ExecutionMode, RuntimeError, ServerRender};
pub use transfer_state::{StateKey, TransferState, SERVER_PUBLIC_JWK};
