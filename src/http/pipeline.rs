// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Ordered interceptor pipeline
//!
//! Stages run outermost first on the way out and innermost first on the
//! way back. The order is fixed when the pipeline is built and can be
//! inspected with [`Pipeline::stage_names`].

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use super::{ApiRequest, ApiResponse, RequestError, Transport};

/// One named stage of the pipeline
#[async_trait]
pub trait Interceptor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Handle `request`, usually by delegating to `next` and post-processing
    /// its result. A stage may also answer without calling `next`.
    async fn intercept(
        &self,
        request: ApiRequest,
        next: Next<'_>,
    ) -> Result<ApiResponse, RequestError>;
}

/// The remaining stages plus the transport
pub struct Next<'a> {
    stages: &'a [Arc<dyn Interceptor>],
    transport: &'a dyn Transport,
}

impl<'a> Next<'a> {
    pub async fn run(self, request: ApiRequest) -> Result<ApiResponse, RequestError> {
        match self.stages.split_first() {
            Some((stage, rest)) => {
                let next = Next {
                    stages: rest,
                    transport: self.transport,
                };
                stage.intercept(request, next).await
            }
            None => self.transport.send(request).await,
        }
    }
}

#[derive(Clone)]
pub struct Pipeline {
    stages: Vec<Arc<dyn Interceptor>>,
    transport: Arc<dyn Transport>,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// Run `request` through every stage and the transport
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, RequestError> {
        Next {
            stages: &self.stages,
            transport: self.transport.as_ref(),
        }
        .run(request)
        .await
    }

    /// Stage names, outermost first
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .finish()
    }
}

#[derive(Default)]
pub struct PipelineBuilder {
    stages: Vec<Arc<dyn Interceptor>>,
}

impl PipelineBuilder {
    /// Append a stage inside the ones added so far
    pub fn stage<I: Interceptor + 'static>(mut self, stage: I) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    pub fn shared_stage(mut self, stage: Arc<dyn Interceptor>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn build(self, transport: Arc<dyn Transport>) -> Pipeline {
        Pipeline {
            stages: self.stages,
            transport,
        }
    }
}
