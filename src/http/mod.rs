// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! HTTP request model, transport and interceptor pipeline
//!
//! Call sites build an [`ApiRequest`] carrying plain JSON and run it through
//! a [`Pipeline`]. Stages may rewrite the request on the way out and the
//! response on the way back; the innermost stage hands the request to a
//! [`Transport`].

pub mod error;
pub mod pipeline;
pub mod stages;
pub mod transport;

pub use error::{HttpError, RecordedError, RequestError};
pub use pipeline::{Interceptor, Next, Pipeline, PipelineBuilder};
pub use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
pub use reqwest::{Method, StatusCode};
pub use transport::{ReqwestTransport, Transport};

use serde::Serialize;
use serde_json::Value;

/// One field of a multipart form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
    pub name: String,
    pub value: Vec<u8>,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
}

impl FormField {
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into().into_bytes(),
            file_name: None,
            content_type: None,
        }
    }

    pub fn file(
        name: impl Into<String>,
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        value: Vec<u8>,
    ) -> Self {
        Self {
            name: name.into(),
            value,
            file_name: Some(file_name.into()),
            content_type: Some(content_type.into()),
        }
    }
}

static NULL_BODY: Value = Value::Null;

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(Value),
    Multipart(Vec<FormField>),
    Binary { content_type: String, bytes: Vec<u8> },
}

impl RequestBody {
    /// Only JSON bodies (or no body at all) can be sealed into an envelope
    pub fn is_encryptable(&self) -> bool {
        matches!(self, RequestBody::Empty | RequestBody::Json(_))
    }

    /// JSON value sealed for this body; an empty body seals as `null`
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            RequestBody::Json(value) => Some(value),
            RequestBody::Empty => Some(&NULL_BODY),
            _ => None,
        }
    }
}

/// An outgoing API call
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Absolute URL, or a path relative to the API base
    pub url: String,
    pub headers: HeaderMap,
    pub body: RequestBody,
}

impl ApiRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::PUT, url)
    }

    pub fn patch(url: impl Into<String>) -> Self {
        Self::new(Method::PATCH, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::DELETE, url)
    }

    pub fn json_value(mut self, value: Value) -> Self {
        self.body = RequestBody::Json(value);
        self
    }

    /// Serialize `payload` as the JSON body
    pub fn json<T: Serialize + ?Sized>(self, payload: &T) -> Result<Self, RequestError> {
        let value = serde_json::to_value(payload)
            .map_err(|e| RequestError::InvalidRequest(format!("body is not JSON: {}", e)))?;
        Ok(self.json_value(value))
    }

    pub fn multipart(mut self, fields: Vec<FormField>) -> Self {
        self.body = RequestBody::Multipart(fields);
        self
    }

    pub fn binary(mut self, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.body = RequestBody::Binary {
            content_type: content_type.into(),
            bytes,
        };
        self
    }

    /// Add a header, validating its name and value
    pub fn header(mut self, name: &str, value: &str) -> Result<Self, RequestError> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| RequestError::InvalidRequest(format!("header name '{}': {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| RequestError::InvalidRequest(format!("header '{}': {}", name, e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }
}

/// A 2xx reply. The body is JSON, a JSON string for non-JSON text, or
/// `null` when empty.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: Value) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body,
        }
    }

    pub fn ok(body: Value) -> Self {
        Self::new(StatusCode::OK, body)
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, RequestError> {
        serde_json::from_value(self.body.clone())
            .map_err(|e| RequestError::InvalidRequest(format!("unexpected response body: {}", e)))
    }
}

/// Parse a raw response body the way every transport does
pub(crate) fn parse_body(bytes: &[u8]) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}
