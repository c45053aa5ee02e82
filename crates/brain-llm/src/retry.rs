use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use tracing::warn;

use brain_core::context::LlmContext;
use brain_core::errors::GatewayError;
use brain_core::provider::{LlmProvider, StreamOptions};
use brain_core::stream::StreamEvent;

#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Retries retryable gateway errors with exponential backoff.
///
/// Only the request is retried. Once a stream has been handed out, errors
/// inside it are the caller's.
pub struct RetryProvider<P: LlmProvider> {
    inner: P,
    config: RetryConfig,
    total_retries: AtomicU64,
}

impl<P: LlmProvider> RetryProvider<P> {
    pub fn new(inner: P, config: RetryConfig) -> Self {
        Self {
            inner,
            config,
            total_retries: AtomicU64::new(0),
        }
    }

    /// `retry_after` from the backend wins over backoff, capped at `max_delay`.
    fn retry_delay(&self, attempt: u32, suggested: Option<Duration>) -> Duration {
        let delay = suggested.unwrap_or_else(|| {
            self.config
                .base_delay
                .saturating_mul(2u32.saturating_pow(attempt))
        });
        delay.min(self.config.max_delay)
    }

    pub fn total_retries(&self) -> u64 {
        self.total_retries.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl<P: LlmProvider> LlmProvider for RetryProvider<P> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    async fn stream(
        &self,
        context: &LlmContext,
        options: &StreamOptions,
    ) -> Result<Pin<Box<dyn Stream<Item = StreamEvent> + Send>>, GatewayError> {
        let mut attempt = 0;
        loop {
            match self.inner.stream(context, options).await {
                Ok(stream) => return Ok(stream),
                Err(e) if !e.is_retryable() || attempt >= self.config.max_retries => {
                    return Err(e)
                }
                Err(e) => {
                    let delay = self.retry_delay(attempt, e.suggested_delay());
                    self.total_retries.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        attempt = attempt + 1,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        error_kind = e.error_kind(),
                        "retrying model request"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
