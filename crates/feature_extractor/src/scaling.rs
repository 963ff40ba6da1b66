use ndarray::{Array1, Array2, Axis};

use crate::stats;

/// Z-scored batch plus the parameters used to produce it.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub normalized: Array2<f64>,
    pub mean: Array1<f64>,
    /// Zero entries are already replaced by `1.0`.
    pub std: Array1<f64>,
}

/// Per-column means of a batch. Empty batches yield zeros.
#[must_use]
pub fn column_means(features: &Array2<f64>) -> Array1<f64> {
    features
        .axis_iter(Axis(1))
        .map(|column| stats::mean(column).unwrap_or(0.0))
        .collect()
}

/// Per-column population standard deviations. Empty batches yield zeros.
#[must_use]
pub fn column_stds(features: &Array2<f64>) -> Array1<f64> {
    features
        .axis_iter(Axis(1))
        .map(|column| stats::std_dev(column).unwrap_or(0.0))
        .collect()
}

/// Applies z-score normalization column by column.
///
/// Missing `mean` / `std` are computed from `features`. Any zero standard
/// deviation, computed or supplied, is replaced by `1.0`.
#[must_use]
pub fn normalize(
    features: &Array2<f64>,
    mean: Option<&Array1<f64>>,
    std: Option<&Array1<f64>>,
) -> Normalized {
    let mean = mean.cloned().unwrap_or_else(|| column_means(features));
    let std = std
        .cloned()
        .unwrap_or_else(|| column_stds(features))
        .mapv(|s| if s == 0.0 { 1.0 } else { s });

    let normalized = (features - &mean) / &std;

    Normalized {
        normalized,
        mean,
        std,
    }
}
