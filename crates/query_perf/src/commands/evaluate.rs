//! Evaluate command - scores a saved model on recent query metrics.

use std::path::Path;

use anyhow::{Context, Result, bail};
use database::{MetricsStore, PgMetricsStore};
use feature_extractor::{MissingValueStrategy, handle_missing_values};
use ml_model::PerformanceModel;
use tracing::info;

/// Runs the evaluate command.
///
/// # Errors
///
/// Returns an error if the model cannot be loaded or no data is available.
pub async fn run(store: &PgMetricsStore, model_path: &Path, lookback_days: u32) -> Result<()> {
    let model = PerformanceModel::load(model_path)
        .with_context(|| format!("Failed to load model from {}", model_path.display()))?;

    let data = store.extract_training_data(lookback_days).await?;
    if data.is_empty() {
        bail!("No query metrics in the last {lookback_days} days");
    }
    info!(samples = data.len(), lookback_days, "Evaluating {model}");

    let features = handle_missing_values(&data.features, MissingValueStrategy::Zero);
    let report = model.evaluate(&features, &data.labels)?;

    info!("=== Evaluation ===");
    info!("  R²:           {:.4}", report.r_squared);
    info!("  RMSE:         {:.2} ms", report.rmse);
    info!("  MAE:          {:.2} ms", report.mae);
    info!("  Median error: {:.2}%", report.median_error_percent);
    info!("  Mean error:   {:.2}%", report.mean_error_percent);
    info!("  Max error:    {:.2}%", report.max_error_percent);

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
