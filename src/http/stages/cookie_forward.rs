// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Forwards the visitor's cookie to API calls made during a server render

use async_trait::async_trait;
use reqwest::header::{HeaderValue, COOKIE};
use url::Url;

use crate::http::transport::{resolve_url, same_origin};
use crate::http::{ApiRequest, ApiResponse, Interceptor, Next, RequestError};
use crate::runtime::ExecutionMode;

pub struct CookieForwardStage {
    api_base: Url,
    cookie: Option<HeaderValue>,
    mode: ExecutionMode,
}

impl CookieForwardStage {
    /// `cookie` is the `Cookie` header of the incoming page request. Values
    /// that are not valid header text are dropped.
    pub fn new(api_base: Url, cookie: Option<&str>, mode: ExecutionMode) -> Self {
        let cookie = cookie
            .filter(|c| !c.trim().is_empty())
            .and_then(|c| match HeaderValue::from_str(c) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!("Incoming cookie not forwarded: {}", e);
                    None
                }
            });
        Self {
            api_base,
            cookie,
            mode,
        }
    }

    /// Same origin as the API base and inside its path on a segment boundary
    fn targets_api(&self, raw: &str) -> bool {
        let Ok(url) = resolve_url(&self.api_base, raw) else {
            return false;
        };
        if !same_origin(&url, &self.api_base) {
            return false;
        }
        let base = self.api_base.path().trim_end_matches('/');
        let path = url.path();
        base.is_empty()
            || path == base
            || path
                .strip_prefix(base)
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

#[async_trait]
impl Interceptor for CookieForwardStage {
    fn name(&self) -> &'static str {
        "cookie-forward"
    }

    async fn intercept(
        &self,
        mut request: ApiRequest,
        next: Next<'_>,
    ) -> Result<ApiResponse, RequestError> {
        if self.mode == ExecutionMode::Server {
            if let Some(cookie) = &self.cookie {
                if self.targets_api(&request.url) {
                    request.headers.insert(COOKIE, cookie.clone());
                }
            }
        }
        next.run(request).await
    }
}
