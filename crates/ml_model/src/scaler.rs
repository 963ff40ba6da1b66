//! Per-column standardization fitted alongside each model.

use feature_extractor::normalize;
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

/// Mean and standard deviation captured from a training batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Array1<f64>,
    /// Never contains zeros.
    pub std: Array1<f64>,
}

impl StandardScaler {
    /// Fits the scaler and returns it with the scaled batch.
    #[must_use]
    pub fn fit_transform(features: &Array2<f64>) -> (Self, Array2<f64>) {
        let result = normalize(features, None, None);
        (
            Self {
                mean: result.mean,
                std: result.std,
            },
            result.normalized,
        )
    }

    /// Scales a batch with the captured parameters.
    #[must_use]
    pub fn transform(&self, features: &Array2<f64>) -> Array2<f64> {
        normalize(features, Some(&self.mean), Some(&self.std)).normalized
    }

    /// Scales a single row with the captured parameters.
    #[must_use]
    pub fn transform_row(&self, row: ArrayView1<'_, f64>) -> Array1<f64> {
        (&row - &self.mean) / &self.std
    }

    /// Number of columns the scaler was fitted on.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.mean.len()
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn test_row_and_batch_scaling_agree() {
        let features = array![[1.0, 10.0], [3.0, 10.0], [5.0, 40.0]];
        let (scaler, scaled) = StandardScaler::fit_transform(&features);

        assert_eq!(scaler.n_features(), 2);
        assert_eq!(scaler.transform(&features), scaled);

        let row = scaler.transform_row(features.row(2));
        assert_eq!(row, scaled.row(2));
    }

    #[test]
    fn test_constant_column_keeps_unit_std() {
        let features = array![[2.0], [2.0]];
        let (scaler, scaled) = StandardScaler::fit_transform(&features);
        assert_eq!(scaler.std, array![1.0]);
        assert_eq!(scaled, array![[0.0], [0.0]]);
    }
}
