//! Access to the query metrics database.
//!
//! [`MetricsStore`] is the boundary the training and validation pipelines
//! talk to. [`PgMetricsStore`] reads and writes the `PostgreSQL` metrics
//! schema; [`MemoryStore`] keeps everything in process for tests and local
//! runs.

use async_trait::async_trait;
use query_structs::{ModelRecord, QueryMetrics, Result, TrainingData, ValidationRecord};
use tracing::debug;

mod memory;
mod models;
mod postgres;

pub use memory::{MemoryStore, RecordedPrediction, StoreOp};
pub use models::StoredModel;
pub use postgres::PgMetricsStore;

/// Maximum rows returned by a training extraction.
pub const TRAINING_ROW_LIMIT: usize = 10_000;

/// Storage collaborator for training, prediction and validation.
#[async_trait]
pub trait MetricsStore: Send + Sync {
    /// Checks that the store is reachable.
    async fn ping(&self) -> Result<()>;

    /// Training rows seen within the last `lookback_days`, newest first.
    ///
    /// Only rows with a positive execution time are returned, capped at
    /// [`TRAINING_ROW_LIMIT`]. Missing feature values are `NaN`.
    async fn extract_training_data(&self, lookback_days: u32) -> Result<TrainingData>;

    /// Raw feature values for one query, or `None` if the hash is unknown.
    async fn extract_features_for_query(&self, query_hash: i64) -> Result<Option<QueryMetrics>>;

    /// Inserts model metadata, or updates it when the name already exists.
    async fn save_model_metadata(&self, record: &ModelRecord) -> Result<()>;

    /// Most recently created model, if any.
    async fn latest_model(&self) -> Result<Option<StoredModel>>;

    /// Up to `limit` models, newest first.
    async fn list_models(&self, limit: usize) -> Result<Vec<StoredModel>>;

    /// Records a served prediction.
    async fn record_prediction(
        &self,
        query_hash: i64,
        predicted_ms: f64,
        confidence: f64,
    ) -> Result<()> {
        debug!(query_hash, predicted_ms, confidence, "Prediction recorded");
        Ok(())
    }

    /// Records the outcome of validating a prediction.
    async fn record_validation(&self, record: &ValidationRecord) -> Result<()> {
        debug!(
            prediction_id = %record.prediction_id,
            error_percent = record.error_percent,
            accuracy_score = record.accuracy_score,
            "Validation recorded"
        );
        Ok(())
    }
}
