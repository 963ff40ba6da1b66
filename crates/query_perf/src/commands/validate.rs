//! Validate command - scores a prediction against the observed time.

use std::sync::Arc;

use anyhow::{Result, bail};
use config::Config;
use database::PgMetricsStore;
use query_perf::jobs::{JobResult, ValidationParams};
use query_perf::{PredictorService, ServiceSettings};
use tracing::info;

/// Runs the validate command.
///
/// # Errors
///
/// Returns an error if the validation could not be recorded.
pub async fn run(config: &Config, store: &PgMetricsStore, params: ValidationParams) -> Result<()> {
    info!(prediction_id = %params.prediction_id, "Validating prediction");

    let service = PredictorService::start(ServiceSettings::from(config), Arc::new(store.clone()));
    let job = service.submit_validation(params)?;
    let job = super::finish_job(service, &job.id, config.task_time_limit).await?;

    if let Some(error) = job.error() {
        bail!("Validation job {} failed: {error}", job.id);
    }

    if let Some(JobResult::Validation(record)) = job.result() {
        info!(
            "Predicted {:.1} ms, actual {:.1} ms: error {:.2}%, accuracy {:.3}{}",
            record.predicted_ms,
            record.actual_ms,
            record.error_percent,
            record.accuracy_score,
            if record.within_interval { "" } else { " (outside acceptance band)" }
        );
    }

    println!("{}", serde_json::to_string_pretty(&job)?);
    Ok(())
}
