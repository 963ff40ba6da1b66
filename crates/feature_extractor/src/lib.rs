//! Feature extractor crate for the query performance model.
//!
//! This crate turns raw per-query metrics into the fixed 12-column feature
//! layout and provides the batch transformations applied before training:
//! validation, missing-value handling, outlier clipping, z-score
//! normalization, and statistical reports.
//!
//! Every transformation is stateless. Statistics are computed from the batch
//! passed in and never carried across calls.

use ndarray::{Array1, Array2};
use serde_json::Value;

mod cleaning;
mod report;
mod scaling;
pub mod stats;

pub use cleaning::{MissingValueStrategy, clip_outliers, handle_missing_values, validate};
pub use query_structs::{FEATURE_COUNT, FEATURE_NAMES, QueryMetrics};
pub use report::{ColumnStats, FeatureReport, feature_descriptions, log_feature_info, report};
pub use scaling::{Normalized, column_means, column_stds, normalize};

/// A batch of feature rows, one column per entry in [`FEATURE_NAMES`].
pub type FeatureMatrix = Array2<f64>;

/// Feature vector extracted for a single query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector(pub [f64; FEATURE_COUNT]);

impl Default for FeatureVector {
    fn default() -> Self {
        Self([0.0; FEATURE_COUNT])
    }
}

impl FeatureVector {
    /// Returns the raw values in schema order.
    #[must_use]
    pub const fn values(&self) -> &[f64; FEATURE_COUNT] {
        &self.0
    }

    /// Looks up a value by feature name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<f64> {
        FEATURE_NAMES
            .iter()
            .position(|candidate| *candidate == name)
            .and_then(|idx| self.0.get(idx).copied())
    }

    /// Returns the vector as a one-dimensional array.
    #[must_use]
    pub fn to_array(&self) -> Array1<f64> {
        Array1::from(self.0.to_vec())
    }

    /// Returns the vector as a single-row batch.
    #[must_use]
    pub fn to_matrix(&self) -> FeatureMatrix {
        self.to_array().insert_axis(ndarray::Axis(0))
    }
}

/// Extracts a feature vector from a metrics map.
///
/// Fields are read in [`FEATURE_NAMES`] order. A missing key, a `null`, or a
/// value that cannot be read as a finite number becomes `0.0`. Booleans map to
/// `1.0` / `0.0` and numeric strings are parsed.
#[must_use]
pub fn extract(metrics: &QueryMetrics) -> FeatureVector {
    let mut features = FeatureVector::default();

    for (slot, name) in features.0.iter_mut().zip(FEATURE_NAMES) {
        *slot = metrics.get(name).map_or(0.0, coerce_numeric);
    }

    features
}

/// Reads a JSON value as a number, defaulting to zero.
fn coerce_numeric(value: &Value) -> f64 {
    let parsed = match value {
        Value::Number(number) => number.as_f64(),
        Value::Bool(flag) => Some(if *flag { 1.0 } else { 0.0 }),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    };

    parsed.filter(|v| v.is_finite()).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn sample_metrics() -> QueryMetrics {
        let value = json!({
            "query_calls_per_hour": 100,
            "mean_table_size_mb": 512,
            "index_count": 3,
            "has_seq_scan": 1,
            "has_nested_loop": 0,
            "subquery_depth": 0,
            "concurrent_queries_avg": 5,
            "available_memory_pct": 60,
            "std_dev_calls": 20,
            "peak_hour_calls": 150,
            "table_row_count": 50000,
            "avg_row_width_bytes": 256,
        });
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_extract_preserves_schema_order() {
        let features = extract(&sample_metrics());
        assert_eq!(features.values().len(), FEATURE_COUNT);
        assert!((features.0[0] - 100.0).abs() < f64::EPSILON);
        assert!((features.0[10] - 50000.0).abs() < f64::EPSILON);
        assert!((features.0[11] - 256.0).abs() < f64::EPSILON);
        assert_eq!(features.get("peak_hour_calls"), Some(150.0));
    }

    #[test]
    fn test_extract_missing_keys_default_to_zero() {
        let mut metrics = QueryMetrics::new();
        metrics.insert("query_calls_per_hour".into(), json!(100));
        metrics.insert("mean_table_size_mb".into(), json!(512));

        let features = extract(&metrics);
        assert_eq!(features.values().len(), FEATURE_COUNT);
        assert!(features.0[2].abs() < f64::EPSILON, "index_count missing");
        assert!(features.0[2..].iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_extract_bad_values_default_to_zero() {
        let mut metrics = sample_metrics();
        metrics.insert("index_count".into(), Value::Null);
        metrics.insert("subquery_depth".into(), json!("not a number"));
        metrics.insert("has_seq_scan".into(), json!(true));
        metrics.insert("table_row_count".into(), json!(" 42.5 "));
        metrics.insert("std_dev_calls".into(), json!([1, 2]));

        let features = extract(&metrics);
        assert_eq!(features.get("index_count"), Some(0.0));
        assert_eq!(features.get("subquery_depth"), Some(0.0));
        assert_eq!(features.get("has_seq_scan"), Some(1.0));
        assert_eq!(features.get("table_row_count"), Some(42.5));
        assert_eq!(features.get("std_dev_calls"), Some(0.0));
    }

    #[test]
    fn test_extract_is_always_finite() {
        let mut metrics = QueryMetrics::new();
        metrics.insert("query_calls_per_hour".into(), json!("inf"));
        metrics.insert("mean_table_size_mb".into(), json!("NaN"));

        let features = extract(&metrics);
        assert!(features.values().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_to_matrix_is_single_row() {
        let matrix = extract(&sample_metrics()).to_matrix();
        assert_eq!(matrix.dim(), (1, FEATURE_COUNT));
        assert!(validate(&matrix));
    }

    #[test]
    fn test_get_unknown_feature() {
        assert_eq!(FeatureVector::default().get("unknown"), None);
    }
}
