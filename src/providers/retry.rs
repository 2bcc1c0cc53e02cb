//! Retry configuration, backoff, and the discovery retry decorator.
//!
//! Generation attempts are never retried here: a failed attempt moves the
//! fallback walk to the next candidate. Discovery is different: it runs in
//! the background, and a transient error there would otherwise drop a
//! provider's models until the next refresh. [`RetryingDiscovery`] wraps a
//! [`ModelDiscovery`] with exponential backoff via [`with_retry`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use super::traits::ModelDiscovery;
use crate::telemetry;
use crate::types::ModelCapability;
use crate::{BifrostError, Result};

/// Configuration for retry behaviour on transient errors.
///
/// ```rust
/// # use bifrost::RetryConfig;
/// # use std::time::Duration;
/// let config = RetryConfig::new()
///     .max_attempts(5)
///     .initial_delay(Duration::from_millis(200));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first). 1 = no retry. Default: 3.
    pub max_attempts: u32,
    /// Delay before the first retry. Default: 500ms.
    pub initial_delay: Duration,
    /// Cap on exponential growth. Default: 30s.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single attempt, no retry.
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// `initial_delay * 2^attempt` (0-indexed), capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.initial_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay)
    }

    /// A server `retry_after` hint wins over computed backoff.
    pub fn effective_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        retry_after.unwrap_or_else(|| self.delay_for_attempt(attempt))
    }
}

/// Run `f` until it succeeds, fails permanently, or attempts run out.
///
/// Only errors where [`BifrostError::is_transient`] holds are retried.
pub(crate) async fn with_retry<F, Fut, T>(config: &RetryConfig, provider: &str, f: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = config.max_attempts.max(1);
    let mut last_err = None;
    for attempt in 0..attempts {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() => {
                if attempt + 1 < attempts {
                    let delay = config.effective_delay(attempt, e.retry_after());
                    metrics::counter!(telemetry::DISCOVERY_RETRIES_TOTAL,
                        "provider" => provider.to_owned(),
                    )
                    .increment(1);
                    warn!(
                        provider,
                        attempt = attempt + 1,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying after transient error"
                    );
                    tokio::time::sleep(delay).await;
                }
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or(BifrostError::NoProvider))
}

/// [`ModelDiscovery`] decorator that retries transient failures.
pub struct RetryingDiscovery {
    inner: Arc<dyn ModelDiscovery>,
    config: RetryConfig,
}

impl RetryingDiscovery {
    pub fn new(inner: Arc<dyn ModelDiscovery>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl ModelDiscovery for RetryingDiscovery {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn discover_models(&self) -> Result<Vec<ModelCapability>> {
        with_retry(&self.config, self.inner.name(), || self.inner.discover_models()).await
    }
}
