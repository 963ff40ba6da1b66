//! Error taxonomy for the prediction pipeline.

use core::fmt;

/// Result type alias using [`PredictorError`].
pub type Result<T> = core::result::Result<T, PredictorError>;

/// Errors raised by feature engineering, models, storage, and orchestration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PredictorError {
    /// Unknown algorithm kind or unreadable model bundle.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Predict or evaluate called before the model was fitted.
    #[error("Model not trained. Call train() first.")]
    NotTrained,

    /// Fewer rows than the configured training minimum.
    #[error("Insufficient training data: need at least {required} samples, found {found}")]
    InsufficientData { found: usize, required: usize },

    /// Wrong feature shape or non-finite values.
    #[error("Feature validation failed: {0}")]
    FeatureValidationFailure(String),

    /// Extraction or persistence I/O against the metrics store.
    #[error("External store failure: {0}")]
    ExternalStoreFailure(String),

    /// Soft or hard time limit exceeded.
    #[error("Time limit exceeded: {0}")]
    Timeout(String),

    /// Unknown job, query, or model.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Job state machine rejected the update.
    #[error("Invalid job transition: {0}")]
    InvalidTransition(String),

    /// Unexpected failure inside a worker (panicked task, closed queue).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PredictorError {
    /// Wraps any displayable error as a store failure.
    pub fn store<E: fmt::Display>(err: E) -> Self {
        Self::ExternalStoreFailure(err.to_string())
    }

    /// Wraps any displayable error as an internal failure.
    pub fn internal<E: fmt::Display>(err: E) -> Self {
        Self::Internal(err.to_string())
    }

    /// Whether another attempt could succeed.
    ///
    /// Only store I/O is transient; bad input and timeouts fail fast.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ExternalStoreFailure(_))
    }

    /// Stable machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfiguration(_) => "INVALID_CONFIGURATION",
            Self::NotTrained => "NOT_TRAINED",
            Self::InsufficientData { .. } => "INSUFFICIENT_DATA",
            Self::FeatureValidationFailure(_) => "FEATURE_VALIDATION_FAILURE",
            Self::ExternalStoreFailure(_) => "EXTERNAL_STORE_FAILURE",
            Self::Timeout(_) => "TIMEOUT",
            Self::NotFound(_) => "NOT_FOUND",
            Self::InvalidTransition(_) => "INVALID_TRANSITION",
            Self::Internal(_) => "INTERNAL",
        }
    }
}

impl From<serde_json::Error> for PredictorError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidConfiguration(format!("model bundle: {err}"))
    }
}

impl From<std::io::Error> for PredictorError {
    fn from(err: std::io::Error) -> Self {
        Self::ExternalStoreFailure(format!("IO error: {err}"))
    }
}
