use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::EngineConfig;
use crate::error::{DownloadError, Result};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts allowed after the first one.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl From<&EngineConfig> for RetryPolicy {
    fn from(config: &EngineConfig) -> Self {
        Self {
            max_retries: config.max_retry_count,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
        }
    }
}

impl RetryPolicy {
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(multiplier)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Runs `operation` until it succeeds, fails permanently, or the retry budget runs out.
///
/// Exhaustion yields [`DownloadError::RetriesExhausted`] carrying every attempt's error,
/// the last one last. A permanent failure after earlier transient ones ends the loop the
/// same way. A single failed attempt is returned as is.
pub async fn retry<F, Fut, T>(
    policy: &RetryPolicy,
    token: &CancellationToken,
    operation: &'static str,
    mut f: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut errors = vec![];

    for attempt in 0..=policy.max_retries {
        if token.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }

        match f(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_cancelled() || (errors.is_empty() && !err.is_retryable()) => {
                return Err(err);
            }
            Err(err) if !err.is_retryable() => {
                errors.push(err);
                break;
            }
            Err(err) => {
                warn!(
                    operation,
                    attempt = attempt + 1,
                    max = policy.max_retries + 1,
                    error = %err,
                    "Attempt failed"
                );
                errors.push(err);
                if attempt >= policy.max_retries {
                    break;
                }

                let delay = policy.delay_for_attempt(attempt);
                tokio::select! {
                    _ = token.cancelled() => return Err(DownloadError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    if errors.len() == 1 {
        return Err(errors.remove(0));
    }
    Err(DownloadError::RetriesExhausted {
        operation,
        attempts: errors.len() as u32,
        errors,
    })
}
