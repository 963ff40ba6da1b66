use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use database::MetricsStore;
use ml_model::metrics::round_to;
use query_structs::{PredictorError, Result, ValidationRecord};
use serde::Serialize;
use tracing::{error, info, warn};

use super::SoftDeadline;
use crate::jobs::{JobParams, JobRegistry, JobResult, JobStatus, ValidationParams};
use crate::retry::{RetryPolicy, run_with_retry};

/// Largest percent error still counted as inside the acceptance band.
pub const ACCEPTABLE_ERROR_PERCENT: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationSettings {
    pub soft_time_limit: Duration,
    pub retry: RetryPolicy,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            soft_time_limit: Duration::from_secs(540),
            retry: RetryPolicy::VALIDATION,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ValidationOutcome {
    Validated(ValidationRecord),
    Failed { prediction_id: String, error: String },
}

/// Scores a prediction against the observed execution time.
#[must_use]
pub fn score(params: &ValidationParams) -> ValidationRecord {
    let error_ms = (params.predicted_ms - params.actual_ms).abs();
    let error_percent = if params.actual_ms > 0.0 {
        error_ms / params.actual_ms * 100.0
    } else {
        0.0
    };
    let accuracy = (1.0 - error_percent / 100.0).max(0.0);

    ValidationRecord {
        prediction_id: params.prediction_id.clone(),
        query_hash: params.query_hash,
        model_version: params.model_version.clone(),
        predicted_ms: params.predicted_ms,
        actual_ms: params.actual_ms,
        error_ms,
        error_percent: round_to(error_percent, 2),
        accuracy_score: round_to(accuracy, 3),
        within_interval: error_percent <= ACCEPTABLE_ERROR_PERCENT,
        validated_at: Utc::now(),
    }
}

/// Compares predictions with actual execution times and records the result.
pub struct ValidationOrchestrator {
    store: Arc<dyn MetricsStore>,
    registry: Arc<JobRegistry>,
    settings: ValidationSettings,
}

impl ValidationOrchestrator {
    #[must_use]
    pub fn new(
        store: Arc<dyn MetricsStore>,
        registry: Arc<JobRegistry>,
        settings: ValidationSettings,
    ) -> Self {
        Self {
            store,
            registry,
            settings,
        }
    }

    /// Runs the validation job `job_id` using its stored parameters.
    pub async fn run_job(&self, job_id: &str) -> ValidationOutcome {
        match self.registry.get(job_id).map(|job| job.params) {
            Some(JobParams::Validation(params)) => self.run(&params, Some(job_id)).await,
            _ => {
                let error =
                    PredictorError::NotFound(format!("validation job {job_id}")).to_string();
                warn!(job_id, %error, "Cannot run validation");
                ValidationOutcome::Failed {
                    prediction_id: String::new(),
                    error,
                }
            }
        }
    }

    /// Validates one prediction. Failures are reported in the outcome.
    ///
    /// When `job_id` is given the job is moved through its lifecycle as well.
    pub async fn run(&self, params: &ValidationParams, job_id: Option<&str>) -> ValidationOutcome {
        if let Some(id) = job_id
            && let Err(err) = self.registry.set_status(id, JobStatus::Training)
        {
            return self.fail(params, job_id, &err);
        }

        let result =
            run_with_retry(self.settings.retry, "validation", || self.attempt(params)).await;

        match result {
            Ok(record) => {
                info!(
                    prediction_id = %record.prediction_id,
                    error_percent = record.error_percent,
                    within_interval = record.within_interval,
                    "Prediction validated"
                );
                if let Some(id) = job_id
                    && let Err(err) = self
                        .registry
                        .set_result(id, JobResult::Validation(record.clone()))
                {
                    return self.fail(params, job_id, &err);
                }
                ValidationOutcome::Validated(record)
            }
            Err(err) => self.fail(params, job_id, &err),
        }
    }

    async fn attempt(&self, params: &ValidationParams) -> Result<ValidationRecord> {
        let deadline = SoftDeadline::start(self.settings.soft_time_limit);

        self.store.ping().await?;
        let record = score(params);
        // Once the record is written the attempt counts as done.
        deadline.check("scoring")?;
        self.store.record_validation(&record).await?;

        Ok(record)
    }

    fn fail(
        &self,
        params: &ValidationParams,
        job_id: Option<&str>,
        err: &PredictorError,
    ) -> ValidationOutcome {
        let message = err.to_string();
        error!(
            prediction_id = %params.prediction_id,
            code = err.code(),
            error = %message,
            "Validation failed"
        );

        if let Some(id) = job_id
            && let Err(update_err) = self.registry.set_error(id, message.clone())
        {
            warn!(job_id = id, error = %update_err, "Could not record validation failure");
        }

        ValidationOutcome::Failed {
            prediction_id: params.prediction_id.clone(),
            error: message,
        }
    }
}
