//! Row types read from the metrics database.

use chrono::{DateTime, Utc};
use query_structs::{FEATURE_COUNT, ModelKind, PredictorError, QueryMetrics};
use serde::{Deserialize, Serialize};

/// Model metadata as stored in `query_performance_models`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredModel {
    pub id: i64,
    pub model_kind: ModelKind,
    pub model_name: String,
    pub feature_names: Vec<String>,
    pub training_sample_size: i64,
    pub r_squared: Option<f64>,
    pub created_at: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Raw `query_performance_models` row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct ModelRow {
    pub id: i64,
    pub model_type: String,
    pub model_name: String,
    pub feature_names: Option<Vec<String>>,
    pub training_sample_size: Option<i64>,
    pub r_squared: Option<f64>,
    pub created_at: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl TryFrom<ModelRow> for StoredModel {
    type Error = PredictorError;

    fn try_from(row: ModelRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            model_kind: row.model_type.parse()?,
            model_name: row.model_name,
            feature_names: row.feature_names.unwrap_or_default(),
            training_sample_size: row.training_sample_size.unwrap_or(0),
            r_squared: row.r_squared,
            created_at: row.created_at,
            last_updated: row.last_updated,
        })
    }
}

/// Feature columns of one `metrics_pg_stats_query` row.
///
/// Columns without a database default may be `NULL`.
#[derive(Debug, Clone, Default, sqlx::FromRow)]
pub(crate) struct FeatureRow {
    pub query_calls_per_hour: Option<f64>,
    pub mean_table_size_mb: Option<f64>,
    pub index_count: Option<f64>,
    pub has_seq_scan: Option<f64>,
    pub has_nested_loop: Option<f64>,
    pub subquery_depth: Option<f64>,
    pub concurrent_queries_avg: Option<f64>,
    pub available_memory_pct: Option<f64>,
    pub std_dev_calls: Option<f64>,
    pub peak_hour_calls: Option<f64>,
    pub table_row_count: Option<f64>,
    pub avg_row_width_bytes: Option<f64>,
}

impl FeatureRow {
    /// Values in schema order.
    pub const fn values(&self) -> [Option<f64>; FEATURE_COUNT] {
        [
            self.query_calls_per_hour,
            self.mean_table_size_mb,
            self.index_count,
            self.has_seq_scan,
            self.has_nested_loop,
            self.subquery_depth,
            self.concurrent_queries_avg,
            self.available_memory_pct,
            self.std_dev_calls,
            self.peak_hour_calls,
            self.table_row_count,
            self.avg_row_width_bytes,
        ]
    }

    /// Row values with `NULL` read as `NaN`.
    pub fn to_features(&self) -> Vec<f64> {
        self.values()
            .iter()
            .map(|v| v.unwrap_or(f64::NAN))
            .collect()
    }

    /// Row as a metrics map with `NULL` kept as JSON `null`.
    pub fn to_metrics(&self) -> QueryMetrics {
        query_structs::FEATURE_NAMES
            .iter()
            .zip(self.values())
            .map(|(name, value)| {
                let json = value
                    .and_then(serde_json::Number::from_f64)
                    .map_or(serde_json::Value::Null, serde_json::Value::Number);
                ((*name).to_string(), json)
            })
            .collect()
    }
}

/// Training row: features plus mean execution time.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct TrainingRow {
    #[sqlx(flatten)]
    pub features: FeatureRow,
    pub target: Option<f64>,
}
