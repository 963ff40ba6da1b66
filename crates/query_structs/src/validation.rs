use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of comparing a prediction with the observed execution time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRecord {
    pub prediction_id: String,
    pub query_hash: i64,
    pub model_version: String,
    pub predicted_ms: f64,
    pub actual_ms: f64,
    pub error_ms: f64,
    /// Rounded to 2 decimal places.
    pub error_percent: f64,
    /// Rounded to 3 decimal places.
    pub accuracy_score: f64,
    /// Error within the 30% acceptance band.
    pub within_interval: bool,
    pub validated_at: DateTime<Utc>,
}
