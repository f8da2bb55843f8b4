// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Network transport behind the pipeline

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use std::time::Duration;
use url::Url;

use super::{parse_body, ApiRequest, ApiResponse, FormField, HttpError, RequestBody, RequestError};

/// Sends a fully prepared request and reports the raw outcome
///
/// Non-2xx replies are returned as [`RequestError::Http`] with the parsed
/// body attached.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, RequestError>;
}

/// Resolve a request URL against the API base
///
/// Absolute URLs are kept, `/`-rooted paths resolve against the API origin,
/// anything else is appended to the API base path.
pub fn resolve_url(base: &Url, raw: &str) -> Result<Url, url::ParseError> {
    match Url::parse(raw) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            if raw.starts_with('/') {
                base.join(raw)
            } else {
                let mut dir = base.clone();
                if !dir.path().ends_with('/') {
                    let path = format!("{}/", dir.path());
                    dir.set_path(&path);
                }
                dir.join(raw)
            }
        }
        Err(e) => Err(e),
    }
}

/// Scheme, host and effective port all match
pub fn same_origin(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme()
        && a.host_str() == b.host_str()
        && a.port_or_known_default() == b.port_or_known_default()
}

/// reqwest-backed transport
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
    base_url: Url,
}

impl ReqwestTransport {
    /// Create a transport for the API at `base_url`
    ///
    /// # Arguments
    /// * `base_url` - Absolute API base, e.g. `http://localhost:3000/api`
    /// * `timeout` - Per-request timeout
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RequestError> {
        let base_url = Url::parse(base_url.trim())
            .map_err(|e| RequestError::InvalidRequest(format!("API base URL: {}", e)))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RequestError::InvalidRequest(format!("HTTP client: {}", e)))?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

fn build_form(fields: Vec<FormField>) -> Result<Form, RequestError> {
    let mut form = Form::new();
    for field in fields {
        let mut part = Part::bytes(field.value);
        if let Some(file_name) = field.file_name {
            part = part.file_name(file_name);
        }
        if let Some(content_type) = field.content_type {
            part = part.mime_str(&content_type).map_err(|e| {
                RequestError::InvalidRequest(format!("form field '{}': {}", field.name, e))
            })?;
        }
        form = form.part(field.name, part);
    }
    Ok(form)
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, RequestError> {
        let url = resolve_url(&self.base_url, &request.url)
            .map_err(|e| RequestError::InvalidRequest(format!("URL '{}': {}", request.url, e)))?;

        tracing::debug!("➡️  {} {}", request.method, url);

        let builder = self
            .client
            .request(request.method.clone(), url.clone())
            .headers(request.headers);
        let builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Multipart(fields) => builder.multipart(build_form(fields)?),
            RequestBody::Binary {
                content_type,
                bytes,
            } => builder.header(CONTENT_TYPE, content_type).body(bytes),
        };

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.bytes().await?;
        let body = parse_body(&bytes);

        if status.is_success() {
            Ok(ApiResponse {
                status,
                headers,
                body,
            })
        } else {
            tracing::debug!("⬅️  {} {}", status, url);
            Err(RequestError::Http(HttpError {
                status,
                url: url.to_string(),
                headers,
                body,
            }))
        }
    }
}
