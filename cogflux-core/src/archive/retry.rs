//! Retry logic for archive writes
//!
//! Exponential backoff without jitter: archive writes are per-agent and
//! serialized by the agent lock, so there is no herd to spread out.

use std::time::Duration;

use crate::config::ArchiveConfig;

/// Retry policy
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: usize,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            initial_delay: Duration::from_millis(100),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A single attempt
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Policy matching an archive configuration
    pub fn from_config(config: &ArchiveConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: config.retry_delay,
            ..Default::default()
        }
    }

    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Delay after the given failed attempt (0-indexed)
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let millis =
            self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_millis(millis as u64)
    }
}

/// Run `operation` until it succeeds or the policy's attempts are used up.
///
/// Returns the last error once attempts are exhausted.
pub async fn with_retry<F, Fut, T, E>(policy: &RetryPolicy, operation: F) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                attempt += 1;
                if attempt >= policy.max_attempts {
                    return Err(e);
                }

                let delay = policy.delay_for_attempt(attempt - 1);
                tracing::warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    error = %e,
                    "Retrying after {:?}",
                    delay
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
