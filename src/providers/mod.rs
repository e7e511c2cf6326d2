// Copyright (c) 2025 - Cowboy AI, LLC.

//! Provider adapters implementing `ports::ProviderPort` (spec.md §4.6).
//!
//! Each adapter owns its own `RateLimiter` (concurrency semaphore plus a
//! minimum inter-request interval) and runs outgoing calls through
//! [`with_retry`], which retries only transient/5xx failures with
//! exponential backoff, per the uniform retry policy `DESIGN.md` settles on.
//!
//! Grounded on `ai_providers::provider_manager::RateLimiter`'s semaphore +
//! sliding-window pattern, simplified from an RPM window to the spec's
//! explicit `60 / rate_limit` minimum interval.
//!
//! `anthropic` and `openai` parse real `text/event-stream` bodies via
//! `reqwest-eventsource` (attested in the wider pack's
//! `LLM-Dev-Ops-inference-gateway` manifest); `ollama` keeps the teacher's
//! own manual `bytes_stream()` + newline-delimited-JSON parsing from
//! `ports::adapters::ollama`, since Ollama's wire format isn't SSE.

pub mod anthropic;
pub mod mock;
pub mod ollama;
pub mod openai;

pub use anthropic::AnthropicProvider;
pub use mock::MockProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

use crate::ports::{ProviderError, ProviderResult};
use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// Per-provider rate limiting: bounds concurrency and enforces a minimum
/// gap between successive requests.
pub struct RateLimiter {
    concurrency: Semaphore,
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(max_concurrency: usize, requests_per_minute: u32) -> Self {
        let min_interval = if requests_per_minute == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(60.0 / requests_per_minute as f64)
        };
        Self {
            concurrency: Semaphore::new(max_concurrency.max(1)),
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    /// Acquire a concurrency slot and wait out the minimum interval since
    /// the last request began.
    pub async fn acquire(&self) -> tokio::sync::SemaphorePermit<'_> {
        let permit = self
            .concurrency
            .acquire()
            .await
            .expect("rate limiter semaphore never closes");

        let wait = {
            let mut last = self.last_request.lock().unwrap();
            let now = Instant::now();
            let wait = match *last {
                Some(prev) if now.duration_since(prev) < self.min_interval => {
                    self.min_interval - now.duration_since(prev)
                }
                _ => Duration::ZERO,
            };
            *last = Some(now + wait);
            wait
        };

        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }

        permit
    }
}

/// Retry `op` with exponential backoff (1s, 2s, 4s, ...), retrying only
/// while `ProviderError::is_retryable()` and the attempt budget remains.
/// Never retries client (4xx) errors.
pub async fn with_retry<T, F, Fut>(max_retries: u32, mut op: F) -> ProviderResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ProviderResult<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < max_retries => {
                let backoff = Duration::from_secs(2u64.pow(attempt));
                tracing::warn!(attempt, ?backoff, error = %err, "retrying provider request");
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

fn map_status(status: u16, body: String) -> ProviderError {
    if status >= 500 {
        ProviderError::ServerError {
            status,
            message: body,
        }
    } else if status == 429 {
        ProviderError::RateLimited {
            retry_after_secs: None,
        }
    } else {
        ProviderError::ClientError {
            status,
            message: body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn with_retry_stops_on_client_error() {
        let calls = AtomicU32::new(0);
        let result: ProviderResult<()> = with_retry(3, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(ProviderError::ClientError {
                    status: 400,
                    message: "bad".into(),
                })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn with_retry_retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_retry(3, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ProviderError::Transient("reset".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
