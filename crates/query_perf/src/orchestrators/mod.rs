//! Pipelines that run training and validation jobs.

use std::time::Duration;

use query_structs::{PredictorError, Result};
use tokio::time::Instant;

pub mod training;
pub mod validation;

pub use training::{TrainingOrchestrator, TrainingOutcome, TrainingSettings};
pub use validation::{ValidationOrchestrator, ValidationOutcome, ValidationSettings, score};

/// Cooperative time limit checked between pipeline stages.
///
/// A limit too large to represent as an instant never expires.
#[derive(Debug, Clone, Copy)]
pub struct SoftDeadline {
    limit: Duration,
    deadline: Option<Instant>,
}

impl SoftDeadline {
    #[must_use]
    pub fn start(limit: Duration) -> Self {
        Self {
            limit,
            deadline: Instant::now().checked_add(limit),
        }
    }

    /// Fails once the limit has passed.
    ///
    /// # Errors
    ///
    /// Returns [`PredictorError::Timeout`] naming the stage that finished late.
    pub fn check(&self, stage: &str) -> Result<()> {
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Err(PredictorError::Timeout(format!(
                "soft time limit of {}s exceeded after {stage}",
                self.limit.as_secs()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_limit_expires_immediately() {
        let deadline = SoftDeadline::start(Duration::ZERO);
        let err = deadline.check("extraction").unwrap_err();
        assert!(matches!(err, PredictorError::Timeout(_)));
        assert!(err.to_string().contains("extraction"));
    }

    #[tokio::test]
    async fn test_generous_limit_passes() {
        let deadline = SoftDeadline::start(Duration::from_secs(60));
        assert!(deadline.check("training").is_ok());
    }

    #[test]
    fn test_unrepresentable_limit_never_expires() {
        let deadline = SoftDeadline::start(Duration::from_secs(u64::MAX));
        assert!(deadline.check("training").is_ok());
    }
}
