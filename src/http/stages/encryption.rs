// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Encrypting interceptor
//!
//! Seals eligible JSON request bodies into envelopes and opens encrypted
//! replies, so call sites only ever see plain JSON.
//!
//! ## Request path
//!
//! A request is sealed when the session is ready, the method is POST, PUT or
//! PATCH, the body is JSON (or empty), and the URL is a same-origin API path
//! other than the key endpoint. Sealed requests carry `X-Enc: 1`,
//! `X-Nonce: <nonce>` and `Content-Type: application/json`.
//!
//! ## Response path
//!
//! Replies flagged with `X-Encrypted-Response` are opened whether or not the
//! request was sealed. Error replies are opened too; when that fails the
//! original error is returned as received.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde_json::Value;
use url::Url;

use crate::config::{ConfigError, EncryptionConfig};
use crate::crypto::{CryptoError, CryptoSession, ResponseEnvelope, SealedRequest};
use crate::http::transport::{resolve_url, same_origin};
use crate::http::{ApiRequest, ApiResponse, HttpError, Interceptor, Method, Next, RequestBody, RequestError};
use crate::runtime::ExecutionMode;
use crate::transfer_state::TransferState;

/// Marks a request body as an envelope
pub const ENCRYPTED_HEADER: &str = "x-enc";

/// Correlation nonce of a sealed request
pub const NONCE_HEADER: &str = "x-nonce";

/// Marks a response body as an envelope
pub const ENCRYPTED_RESPONSE_HEADER: &str = "x-encrypted-response";

/// Which requests and responses the stage touches
#[derive(Debug, Clone)]
pub struct EncryptionPolicy {
    api_base: Url,
    path_prefix: String,
    public_key_path: String,
    shape_sniffing: bool,
    bind_request_aad: bool,
}

impl EncryptionPolicy {
    pub fn from_config(config: &EncryptionConfig) -> Result<Self, ConfigError> {
        let api_base = Url::parse(&config.api_base_url).map_err(|e| {
            ConfigError::Invalid(format!("API base URL '{}': {}", config.api_base_url, e))
        })?;
        Ok(Self {
            api_base,
            path_prefix: config.api_path_prefix.clone(),
            public_key_path: config.public_key_path.trim_end_matches('/').to_string(),
            shape_sniffing: config.shape_sniffing,
            bind_request_aad: config.bind_request_aad,
        })
    }

    pub fn shape_sniffing(&self) -> bool {
        self.shape_sniffing
    }

    pub fn bind_request_aad(&self) -> bool {
        self.bind_request_aad
    }

    /// URL path used for the prefix and key-endpoint checks; `None` for a
    /// cross-origin URL
    fn same_origin_path(&self, raw: &str) -> Option<String> {
        match resolve_url(&self.api_base, raw) {
            Ok(url) => same_origin(&url, &self.api_base).then(|| url.path().to_string()),
            Err(_) => Some(raw.split(['?', '#']).next().unwrap_or(raw).to_string()),
        }
    }

    /// Method, body and URL rules; readiness is checked by the stage
    pub fn accepts(&self, request: &ApiRequest) -> bool {
        if !matches!(request.method, Method::POST | Method::PUT | Method::PATCH) {
            return false;
        }
        if !request.body.is_encryptable() {
            return false;
        }
        let Some(path) = self.same_origin_path(&request.url) else {
            return false;
        };
        if path.trim_end_matches('/').ends_with(&self.public_key_path) {
            return false;
        }
        path.starts_with(&self.path_prefix)
    }

    /// Additional data bound to a sealed request, empty unless enabled
    pub fn aad_for(&self, request: &ApiRequest) -> Vec<u8> {
        if !self.bind_request_aad {
            return Vec::new();
        }
        let path = self
            .same_origin_path(&request.url)
            .unwrap_or_else(|| request.url.clone());
        format!("{}:{}", request.method.as_str().to_uppercase(), path).into_bytes()
    }

    /// Whether a reply body should be opened
    ///
    /// The marker header decides. Without it a body is only treated as an
    /// envelope when shape sniffing is on and the body is exactly
    /// `{iv, data, nonce}`.
    pub fn is_encrypted_response(&self, headers: &HeaderMap, body: &Value) -> bool {
        let flagged = headers
            .get(ENCRYPTED_RESPONSE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true"))
            .unwrap_or(false);
        flagged || (self.shape_sniffing && ResponseEnvelope::matches_shape(body))
    }
}

fn attach_envelope(request: &mut ApiRequest, sealed: &SealedRequest) -> Result<(), RequestError> {
    let nonce = HeaderValue::from_str(&sealed.nonce)
        .map_err(|e| RequestError::InvalidRequest(format!("nonce header: {}", e)))?;
    let envelope = serde_json::to_value(&sealed.envelope)
        .map_err(|e| CryptoError::encryption("envelope", e))?;

    request.body = RequestBody::Json(envelope);
    request
        .headers
        .insert(ENCRYPTED_HEADER, HeaderValue::from_static("1"));
    request.headers.insert(NONCE_HEADER, nonce);
    request
        .headers
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(())
}

/// Session of a sealed request still awaiting its exchange
///
/// Dropped without [`release`](Self::release), e.g. when the caller
/// cancels the send, it discards the session key on the spot.
struct PendingNonce {
    session: CryptoSession,
    nonce: Option<String>,
}

impl PendingNonce {
    fn new(session: CryptoSession, nonce: String) -> Self {
        Self {
            session,
            nonce: Some(nonce),
        }
    }

    fn nonce(&self) -> &str {
        self.nonce.as_deref().unwrap_or_default()
    }

    async fn release(mut self) {
        if let Some(nonce) = self.nonce.take() {
            self.session.drop_session(&nonce).await;
        }
    }
}

impl Drop for PendingNonce {
    fn drop(&mut self) {
        if let Some(nonce) = self.nonce.take() {
            tracing::debug!("Sealed request abandoned, discarding its session key");
            self.session.discard_session(&nonce);
        }
    }
}

/// Pipeline stage that seals requests and opens replies
pub struct EncryptionStage {
    session: CryptoSession,
    policy: EncryptionPolicy,
    mode: ExecutionMode,
    transfer_state: Option<TransferState>,
}

impl EncryptionStage {
    pub fn new(session: CryptoSession, policy: EncryptionPolicy, mode: ExecutionMode) -> Self {
        Self {
            session,
            policy,
            mode,
            transfer_state: None,
        }
    }

    /// Hydrate the session from `state` before the first request
    pub fn with_transfer_state(mut self, state: TransferState) -> Self {
        self.transfer_state = Some(state);
        self
    }

    pub fn policy(&self) -> &EncryptionPolicy {
        &self.policy
    }

    /// Full decision: session ready and the policy accepts the request
    pub fn should_encrypt(&self, request: &ApiRequest) -> bool {
        self.session.is_ready() && self.policy.accepts(request)
    }

    async fn ensure_ready(&self) {
        if let Some(state) = &self.transfer_state {
            if let Err(e) = self.session.hydrate(state).await {
                tracing::debug!("Continuing without encryption: {}", e);
            }
        }
        self.session.wait_until_ready().await;
    }

    async fn seal(&self, mut request: ApiRequest) -> Result<(ApiRequest, String), RequestError> {
        let aad = self.policy.aad_for(&request);
        let plaintext = request.body.as_json().cloned().unwrap_or(Value::Null);
        let sealed = self.session.encrypt_with_aad(&plaintext, &aad).await?;

        match attach_envelope(&mut request, &sealed) {
            Ok(()) => Ok((request, sealed.nonce)),
            Err(e) => {
                self.session.drop_session(&sealed.nonce).await;
                Err(e)
            }
        }
    }

    async fn open(&self, body: &Value, sealed_nonce: Option<&str>) -> Result<Value, CryptoError> {
        let envelope = ResponseEnvelope::from_value(body)?;
        if let Some(expected) = sealed_nonce {
            if envelope.nonce != expected {
                return Err(CryptoError::InvalidEnvelope {
                    field: "nonce".to_string(),
                    reason: "does not match the request".to_string(),
                });
            }
        }
        self.session.decrypt(&envelope).await
    }

    async fn open_response(
        &self,
        mut response: ApiResponse,
        sealed_nonce: Option<&str>,
    ) -> Result<ApiResponse, RequestError> {
        if !self
            .policy
            .is_encrypted_response(&response.headers, &response.body)
        {
            return Ok(response);
        }
        response.body = self.open(&response.body, sealed_nonce).await.map_err(|e| {
            tracing::warn!("Encrypted response could not be opened: {}", e);
            RequestError::Crypto(e)
        })?;
        response.headers.remove(ENCRYPTED_RESPONSE_HEADER);
        Ok(response)
    }

    async fn open_error(&self, mut error: HttpError, sealed_nonce: Option<&str>) -> HttpError {
        if !self.policy.is_encrypted_response(&error.headers, &error.body) {
            return error;
        }
        match self.open(&error.body, sealed_nonce).await {
            Ok(body) => {
                error.body = body;
                error.headers.remove(ENCRYPTED_RESPONSE_HEADER);
                error
            }
            Err(e) => {
                tracing::warn!(
                    "Encrypted error body could not be opened, returning it unchanged: {}",
                    e
                );
                error
            }
        }
    }
}

#[async_trait]
impl Interceptor for EncryptionStage {
    fn name(&self) -> &'static str {
        "encryption"
    }

    async fn intercept(
        &self,
        request: ApiRequest,
        next: Next<'_>,
    ) -> Result<ApiResponse, RequestError> {
        if self.mode == ExecutionMode::Server {
            return next.run(request).await;
        }

        self.ensure_ready().await;

        let (request, pending) = if self.should_encrypt(&request) {
            let (request, nonce) = self.seal(request).await?;
            (request, Some(PendingNonce::new(self.session.clone(), nonce)))
        } else {
            tracing::trace!("Passing {} {} through unencrypted", request.method, request.url);
            (request, None)
        };
        let sealed_nonce = pending.as_ref().map(PendingNonce::nonce);

        let outcome = match next.run(request).await {
            Ok(response) => self.open_response(response, sealed_nonce).await,
            Err(RequestError::Http(error)) => {
                Err(RequestError::Http(self.open_error(error, sealed_nonce).await))
            }
            Err(other) => Err(other),
        };

        if let Some(pending) = pending {
            pending.release().await;
        }
        outcome
    }
}
