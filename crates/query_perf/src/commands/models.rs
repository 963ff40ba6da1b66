//! Models command - lists stored model metadata.

use anyhow::Result;
use database::MetricsStore;
use tracing::info;

/// Runs the models command.
///
/// # Errors
///
/// Returns an error if the metadata cannot be read.
pub async fn run(store: &dyn MetricsStore, limit: usize) -> Result<()> {
    let Some(latest) = store.latest_model().await? else {
        info!("No models stored yet");
        return Ok(());
    };
    info!(
        "Latest model: {} ({}, created {})",
        latest.model_name,
        latest.model_kind,
        latest
            .created_at
            .map_or_else(|| "-".to_string(), |at| at.to_rfc3339())
    );

    let models = store.list_models(limit).await?;

    for model in &models {
        info!(
            "  {:<40} {:<18} samples={:<6} r2={}",
            model.model_name,
            model.model_kind,
            model.training_sample_size,
            model
                .r_squared
                .map_or_else(|| "-".to_string(), |r| format!("{r:.4}"))
        );
    }

    println!("{}", serde_json::to_string_pretty(&models)?);
    Ok(())
}
