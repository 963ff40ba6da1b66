//! Train command - fits a model on recent query metrics.

use std::sync::Arc;

use anyhow::{Result, bail};
use config::Config;
use database::PgMetricsStore;
use ml_model::ModelKind;
use query_perf::jobs::{JobResult, TrainingParams};
use query_perf::{PredictorService, ServiceSettings};
use tracing::info;

/// Runs the train command.
///
/// # Errors
///
/// Returns an error if the training job fails.
pub async fn run(
    config: &Config,
    store: &PgMetricsStore,
    model_type: Option<ModelKind>,
    lookback_days: Option<u32>,
) -> Result<()> {
    let params = TrainingParams {
        model_kind: model_type.unwrap_or(config.model_type),
        lookback_days: lookback_days.unwrap_or(config.lookback_days),
    };
    info!(
        kind = %params.model_kind,
        lookback_days = params.lookback_days,
        "Starting training"
    );

    let service = PredictorService::start(ServiceSettings::from(config), Arc::new(store.clone()));
    let job = service.submit_training(params)?;
    let job = super::finish_job(service, &job.id, config.task_time_limit).await?;

    if let Some(error) = job.error() {
        bail!("Training job {} failed: {error}", job.id);
    }

    if let Some(JobResult::Training(summary)) = job.result() {
        let metrics = &summary.metrics;
        info!("=== Training Summary ===");
        info!("  Model:    {} ({})", metrics.model_name, metrics.model_id);
        info!("  Kind:     {}", metrics.model_kind);
        info!("  Samples:  {}", metrics.training_samples);
        info!("  R²:       {:.4}", metrics.r_squared);
        info!("  RMSE:     {:.2} ms", metrics.rmse);
        info!("  MAE:      {:.2} ms", metrics.mae);
        if let Some(path) = &summary.bundle_path {
            info!("  Bundle:   {}", path.display());
        }
    }

    println!("{}", serde_json::to_string_pretty(&job)?);
    Ok(())
}
