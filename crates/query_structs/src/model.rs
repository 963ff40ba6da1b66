use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ModelKind;

/// Model metadata as stored in the metrics database.
///
/// Upserts are keyed by `model_name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub model_id: String,
    pub model_name: String,
    pub model_kind: ModelKind,
    pub feature_names: Vec<String>,
    pub training_sample_size: usize,
    pub r_squared: f64,
    pub rmse: f64,
    pub mae: f64,
    pub created_at: DateTime<Utc>,
}
