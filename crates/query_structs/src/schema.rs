//! The fixed feature schema and the training batch container.

use ndarray::{Array1, Array2};

use crate::PredictorError;

/// Number of features per query sample.
pub const FEATURE_COUNT: usize = 12;

/// Feature names in the order every vector and matrix column uses.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "query_calls_per_hour",
    "mean_table_size_mb",
    "index_count",
    "has_seq_scan",
    "has_nested_loop",
    "subquery_depth",
    "concurrent_queries_avg",
    "available_memory_pct",
    "std_dev_calls",
    "peak_hour_calls",
    "table_row_count",
    "avg_row_width_bytes",
];

/// Raw metrics for a single query, keyed by feature name.
pub type QueryMetrics = serde_json::Map<String, serde_json::Value>;

/// Feature rows plus the observed execution time (ms) for each row.
#[derive(Debug, Clone, Default)]
pub struct TrainingData {
    /// One row per sample, one column per feature.
    pub features: Array2<f64>,
    /// Mean execution time in milliseconds, aligned with `features` rows.
    pub labels: Array1<f64>,
}

impl TrainingData {
    /// Pairs a feature matrix with its labels.
    ///
    /// # Errors
    ///
    /// Returns an error if the row count and label count differ.
    pub fn new(features: Array2<f64>, labels: Array1<f64>) -> Result<Self, PredictorError> {
        if features.nrows() != labels.len() {
            return Err(PredictorError::FeatureValidationFailure(format!(
                "{} feature rows but {} labels",
                features.nrows(),
                labels.len()
            )));
        }
        Ok(Self { features, labels })
    }

    /// Builds a batch from `(row, label)` pairs.
    ///
    /// # Errors
    ///
    /// Returns an error if rows have differing lengths.
    pub fn from_rows<I>(rows: I) -> Result<Self, PredictorError>
    where
        I: IntoIterator<Item = (Vec<f64>, f64)>,
    {
        let mut flat = Vec::new();
        let mut labels = Vec::new();
        let mut width = None;

        for (row, label) in rows {
            let expected = *width.get_or_insert(row.len());
            if row.len() != expected {
                return Err(PredictorError::FeatureValidationFailure(format!(
                    "ragged rows: expected {expected} columns, found {}",
                    row.len()
                )));
            }
            flat.extend(row);
            labels.push(label);
        }

        let width = width.unwrap_or(FEATURE_COUNT);
        let features = Array2::from_shape_vec((labels.len(), width), flat)
            .map_err(|e| PredictorError::FeatureValidationFailure(e.to_string()))?;

        Ok(Self {
            features,
            labels: Array1::from(labels),
        })
    }

    /// Returns the number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Returns true if there are no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_names_are_unique() {
        let mut names = FEATURE_NAMES.to_vec();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), FEATURE_COUNT);
    }

    #[test]
    fn test_from_rows() {
        let data = TrainingData::from_rows(vec![
            (vec![1.0; FEATURE_COUNT], 10.0),
            (vec![2.0; FEATURE_COUNT], 20.0),
        ])
        .unwrap();

        assert_eq!(data.len(), 2);
        assert_eq!(data.features.ncols(), FEATURE_COUNT);
        assert!((data.labels[1] - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_from_rows_rejects_ragged_input() {
        let result = TrainingData::from_rows(vec![(vec![1.0; 12], 1.0), (vec![1.0; 11], 2.0)]);
        assert!(matches!(
            result,
            Err(PredictorError::FeatureValidationFailure(_))
        ));
    }

    #[test]
    fn test_empty_batch_keeps_schema_width() {
        let data = TrainingData::from_rows(Vec::new()).unwrap();
        assert!(data.is_empty());
        assert_eq!(data.features.ncols(), FEATURE_COUNT);
    }

    #[test]
    fn test_new_rejects_mismatched_labels() {
        let result = TrainingData::new(Array2::zeros((3, FEATURE_COUNT)), Array1::zeros(2));
        assert!(result.is_err());
    }
}
