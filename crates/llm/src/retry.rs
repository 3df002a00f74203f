//! Retry with exponential backoff for transient provider failures.
//!
//! Only [`RagError::Upstream`] responses with status 429 or 5xx are retried.
//! A delay requested by the provider wins over the computed backoff, capped
//! at `max_delay_ms`.

use async_trait::async_trait;
use neurorag_common::{RagError, Result};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::client::{LlmClient, LlmRequest, LlmResponse};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

pub struct RetryingClient<T: LlmClient> {
    inner: T,
    config: RetryConfig,
}

impl<T: LlmClient> RetryingClient<T> {
    pub fn new(inner: T, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// Delay before retry number `attempt + 1`, or `None` if `err` is final.
    fn retry_delay(&self, err: &RagError, attempt: u32) -> Option<u64> {
        match err {
            RagError::Upstream {
                status,
                retry_after_ms,
                ..
            } if *status == 429 || (500..600).contains(status) => Some(
                retry_after_ms
                    .unwrap_or_else(|| self.backoff(attempt))
                    .min(self.config.max_delay_ms),
            ),
            _ => None,
        }
    }

    fn backoff(&self, attempt: u32) -> u64 {
        let base = self.config.initial_delay_ms as f64
            * self.config.backoff_multiplier.powi(attempt as i32);
        let jitter = base * 0.1 * jitter_fraction(attempt);
        ((base + jitter) as u64).min(self.config.max_delay_ms)
    }
}

/// Deterministic spread in `[0, 1)` so parallel callers do not retry in lockstep.
fn jitter_fraction(attempt: u32) -> f64 {
    (attempt.wrapping_mul(2654435761) % 100) as f64 / 100.0
}

/// `Retry-After: <seconds>` in milliseconds. HTTP-date values are ignored.
pub(crate) fn retry_after_header(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| secs.saturating_mul(1000))
}

#[async_trait]
impl<T: LlmClient> LlmClient for RetryingClient<T> {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let mut attempt = 0;
        loop {
            let err = match self.inner.complete(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(e) => e,
            };

            let delay = match self.retry_delay(&err, attempt) {
                Some(delay) if attempt < self.config.max_retries => delay,
                _ => return Err(err),
            };

            warn!(
                attempt = attempt + 1,
                max_retries = self.config.max_retries,
                delay_ms = delay,
                error = %err,
                "Retrying LLM request"
            );
            tokio::time::sleep(tokio::time::Duration::from_millis(delay)).await;
            attempt += 1;
        }
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}
