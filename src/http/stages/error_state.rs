// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Handoff of failed API calls from the server render to the client
//!
//! During a server render, [`ErrorRecordStage`] stores every failed call
//! under `error-<url>` in the transfer state. In the client runtime,
//! [`ErrorReplayStage`] answers the first call to the same URL with the
//! recorded error instead of repeating it.

use async_trait::async_trait;

use crate::http::{ApiRequest, ApiResponse, Interceptor, Next, RecordedError, RequestError};
use crate::runtime::ExecutionMode;
use crate::transfer_state::{StateKey, TransferError, TransferState};

/// Transfer slot for the error recorded for `url`
pub fn error_key(url: &str) -> StateKey<RecordedError> {
    StateKey::named(format!("error-{}", url))
}

/// Server render: record failed calls for the client
pub struct ErrorRecordStage {
    state: TransferState,
    mode: ExecutionMode,
}

impl ErrorRecordStage {
    pub fn new(state: TransferState, mode: ExecutionMode) -> Self {
        Self { state, mode }
    }
}

#[async_trait]
impl Interceptor for ErrorRecordStage {
    fn name(&self) -> &'static str {
        "error-record"
    }

    async fn intercept(
        &self,
        request: ApiRequest,
        next: Next<'_>,
    ) -> Result<ApiResponse, RequestError> {
        if self.mode != ExecutionMode::Server {
            return next.run(request).await;
        }

        let url = request.url.clone();
        let result = next.run(request).await;

        if let Err(RequestError::Http(error)) = &result {
            tracing::warn!("Server render call failed: {}", error);
            match self.state.set(&error_key(&url), &error.to_record()) {
                Ok(()) | Err(TransferError::AlreadyWritten(_)) => {}
                Err(e) => tracing::warn!("Could not record failed call: {}", e),
            }
        }
        result
    }
}

/// Client runtime: replay errors recorded by the server render, once
pub struct ErrorReplayStage {
    state: TransferState,
    mode: ExecutionMode,
}

impl ErrorReplayStage {
    pub fn new(state: TransferState, mode: ExecutionMode) -> Self {
        Self { state, mode }
    }
}

#[async_trait]
impl Interceptor for ErrorReplayStage {
    fn name(&self) -> &'static str {
        "error-replay"
    }

    async fn intercept(
        &self,
        request: ApiRequest,
        next: Next<'_>,
    ) -> Result<ApiResponse, RequestError> {
        if self.mode != ExecutionMode::Browser {
            return next.run(request).await;
        }

        match self.state.take(&error_key(&request.url)) {
            Ok(Some(record)) => {
                tracing::debug!("Replaying server render error for {}", request.url);
                let mut error = record.into_http_error();
                error.url = request.url;
                Err(RequestError::Http(error))
            }
            Ok(None) => next.run(request).await,
            Err(e) => {
                tracing::warn!("Ignoring unreadable recorded error: {}", e);
                next.run(request).await
            }
        }
    }
}
