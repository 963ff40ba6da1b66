use ndarray::{Array2, Axis};
use serde::Serialize;
use tracing::{debug, info};

use crate::{FEATURE_COUNT, FEATURE_NAMES, stats};

/// Summary statistics for one feature column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnStats {
    pub name: String,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
}

/// Statistical report over a feature batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureReport {
    pub num_samples: usize,
    pub num_features: usize,
    /// One entry per column, in schema order.
    pub feature_stats: Vec<ColumnStats>,
}

impl FeatureReport {
    /// Looks up the statistics for a named feature.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ColumnStats> {
        self.feature_stats.iter().find(|s| s.name == name)
    }
}

/// Builds a report of per-column mean, std, min, max and median.
///
/// Columns beyond the schema are named `feature_{index}`. Statistics of an
/// empty batch are `NaN`.
#[must_use]
pub fn report(features: &Array2<f64>) -> FeatureReport {
    let feature_stats = features
        .axis_iter(Axis(1))
        .enumerate()
        .map(|(idx, column)| {
            let values = column.to_vec();
            let name = FEATURE_NAMES
                .get(idx)
                .map_or_else(|| format!("feature_{idx}"), |n| (*n).to_string());

            ColumnStats {
                name,
                mean: stats::mean(column).unwrap_or(f64::NAN),
                std: stats::std_dev(column).unwrap_or(f64::NAN),
                min: values.iter().copied().reduce(f64::min).unwrap_or(f64::NAN),
                max: values.iter().copied().reduce(f64::max).unwrap_or(f64::NAN),
                median: stats::median(&values).unwrap_or(f64::NAN),
            }
        })
        .collect();

    FeatureReport {
        num_samples: features.nrows(),
        num_features: features.ncols(),
        feature_stats,
    }
}

/// Human-readable description of each feature, in schema order.
#[must_use]
pub const fn feature_descriptions() -> [(&'static str, &'static str); FEATURE_COUNT] {
    [
        ("query_calls_per_hour", "Average number of query executions per hour"),
        ("mean_table_size_mb", "Average size of tables accessed by the query in MB"),
        ("index_count", "Number of indexes available on the accessed tables"),
        ("has_seq_scan", "Whether the plan uses a sequential scan (1 = yes, 0 = no)"),
        ("has_nested_loop", "Whether the plan uses a nested loop join (1 = yes, 0 = no)"),
        ("subquery_depth", "Nesting depth of subqueries (0 = none)"),
        ("concurrent_queries_avg", "Average number of concurrent queries during execution"),
        ("available_memory_pct", "Percentage of system memory available"),
        ("std_dev_calls", "Standard deviation of calls per minute"),
        ("peak_hour_calls", "Maximum calls observed in a single hour"),
        ("table_row_count", "Total number of rows in the accessed tables"),
        ("avg_row_width_bytes", "Average row width in bytes"),
    ]
}

/// Logs the batch shape at `info` and per-column statistics at `debug`.
pub fn log_feature_info(features: &Array2<f64>) {
    let report = report(features);
    info!(
        samples = report.num_samples,
        features = report.num_features,
        "Feature batch shape"
    );

    for column in &report.feature_stats {
        debug!(
            feature = %column.name,
            mean = column.mean,
            std = column.std,
            min = column.min,
            max = column.max,
            "Feature statistics"
        );
    }
}
