// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Request error types

use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::crypto::CryptoError;

/// A non-2xx response, with its (decrypted, when applicable) body
#[derive(Debug, Clone, Error)]
#[error("HTTP {status} from {url}")]
pub struct HttpError {
    pub status: StatusCode,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Value,
}

impl HttpError {
    pub fn new(status: StatusCode, url: impl Into<String>, body: Value) -> Self {
        Self {
            status,
            url: url.into(),
            headers: HeaderMap::new(),
            body,
        }
    }

    pub fn to_record(&self) -> RecordedError {
        RecordedError {
            status: self.status.as_u16(),
            message: self.to_string(),
            url: self.url.clone(),
            body: self.body.clone(),
        }
    }
}

/// Serializable form of an [`HttpError`], carried across the render boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedError {
    pub status: u16,
    #[serde(default)]
    pub message: String,
    pub url: String,
    #[serde(default)]
    pub body: Value,
}

impl RecordedError {
    pub fn into_http_error(self) -> HttpError {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        HttpError::new(status, self.url, self.body)
    }
}

#[derive(Debug, Clone, Error)]
pub enum RequestError {
    /// The server answered with an error status
    #[error(transparent)]
    Http(HttpError),

    /// No response was received
    #[error("network error: {0}")]
    Network(String),

    /// A reply could not be decrypted, or the request could not be sealed
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// The request could not be built
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl RequestError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            RequestError::Http(e) => Some(e.status),
            _ => None,
        }
    }

    pub fn as_http(&self) -> Option<&HttpError> {
        match self {
            RequestError::Http(e) => Some(e),
            _ => None,
        }
    }
}

impl From<HttpError> for RequestError {
    fn from(err: HttpError) -> Self {
        RequestError::Http(err)
    }
}

impl From<reqwest::Error> for RequestError {
    fn from(err: reqwest::Error) -> Self {
        RequestError::Network(err.to_string())
    }
}
