//! Retry with exponential backoff for pipeline attempts.

use std::future::Future;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use query_structs::{PredictorError, Result};
use tracing::warn;

/// How many times to retry a failed attempt and how long to wait.
///
/// Retry `n` (counting from zero) waits `base_delay × 2^n`. Only errors for
/// which [`PredictorError::is_retryable`] holds are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Training: 3 retries after 60 s, 120 s and 240 s.
    pub const TRAINING: Self = Self {
        max_retries: 3,
        base_delay: Duration::from_secs(60),
    };

    /// Validation: 2 retries after 30 s and 60 s.
    pub const VALIDATION: Self = Self {
        max_retries: 2,
        base_delay: Duration::from_secs(30),
    };

    /// Delay before retry `retry`, counting from zero.
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(retry))
    }

    fn backoff(&self) -> ExponentialBuilder {
        let longest = u32::try_from(self.max_retries.saturating_sub(1)).unwrap_or(u32::MAX);
        ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_max_delay(self.delay_for(longest))
            .with_factor(2.0)
            .with_max_times(self.max_retries)
    }
}

/// Runs `attempt` until it succeeds, fails with a non-retryable error, or
/// the policy is exhausted. The last error is returned unchanged.
///
/// # Errors
///
/// Returns the error of the final attempt.
pub async fn run_with_retry<T, F, Fut>(policy: RetryPolicy, label: &str, attempt: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    attempt
        .retry(policy.backoff())
        .when(PredictorError::is_retryable)
        .notify(|err: &PredictorError, delay: Duration| {
            warn!(
                task = label,
                error = %err,
                delay_secs = delay.as_secs_f64(),
                "Attempt failed, will retry"
            );
        })
        .await
}
