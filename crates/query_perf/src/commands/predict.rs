//! Predict command - serves a prediction for one query.

use std::path::Path;

use anyhow::{Context, Result};
use database::PgMetricsStore;
use ml_model::PerformanceModel;
use tracing::info;

/// Runs the predict command.
///
/// # Errors
///
/// Returns an error if the model cannot be loaded or the query is unknown.
pub async fn run(store: &PgMetricsStore, model_path: &Path, query_hash: i64) -> Result<()> {
    let model = PerformanceModel::load(model_path)
        .with_context(|| format!("Failed to load model from {}", model_path.display()))?;
    info!(model = %model, "Loaded model");

    let prediction = query_perf::predict_query(store, &model, query_hash).await?;

    println!("{}", serde_json::to_string_pretty(&prediction)?);
    Ok(())
}
