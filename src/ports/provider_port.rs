// Copyright (c) 2025 - Cowboy AI, LLC.

//! Provider Port - the uniform contract every model provider adapter
//! implements.
//!
//! Generalizes `chat_port::ChatPort`'s single `send` method into the full
//! completion/stream/list/health surface spec.md §4.6 requires, and carries
//! a richer error taxonomy distinguishing transient (retryable) failures
//! from permanent ones.

use crate::value_objects::{ChatRequest, ChatResponse, ModelDescriptor, StreamingChunk};
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use thiserror::Error;

/// Errors from provider adapter operations.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Connection-level failure: timeout, DNS, TLS, reset. Always retryable.
    #[error("transport error: {0}")]
    Transient(String),

    /// Upstream returned a 5xx. Retryable.
    #[error("upstream server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    /// Upstream returned a 4xx. Never retried.
    #[error("upstream rejected request ({status}): {message}")]
    ClientError { status: u16, message: String },

    #[error("rate limit exceeded, retry after {retry_after_secs:?}s")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("model not available: {0}")]
    ModelNotAvailable(String),

    #[error("response could not be parsed: {0}")]
    InvalidResponse(String),

    #[error("provider misconfigured: {0}")]
    Configuration(String),
}

impl ProviderError {
    /// Whether this error should be retried by the caller's backoff loop.
    /// Per spec.md §9, retry transport/5xx only, never 4xx.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::Transient(_)
                | ProviderError::ServerError { .. }
                | ProviderError::RateLimited { .. }
        )
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;
pub type ProviderChatStream = Pin<Box<dyn Stream<Item = ProviderResult<StreamingChunk>> + Send>>;

#[async_trait]
pub trait ProviderPort: Send + Sync {
    /// Run a single non-streaming completion.
    async fn complete(&self, request: &ChatRequest, model_name: &str) -> ProviderResult<ChatResponse>;

    /// Run a streaming completion; the stream is terminated by a chunk with
    /// `is_final: true`.
    async fn stream_complete(
        &self,
        request: &ChatRequest,
        model_name: &str,
    ) -> ProviderResult<ProviderChatStream>;

    /// List the models this provider currently exposes.
    async fn list_models(&self) -> ProviderResult<Vec<ModelDescriptor>>;

    /// Cheap liveness/credentials probe.
    async fn health_check(&self) -> ProviderResult<()>;

    /// Provider name for logging/metrics.
    fn provider_name(&self) -> &'static str;
}
