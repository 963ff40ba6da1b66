//! Bootstrap-aggregated regression trees.

use ndarray::{Array1, Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::tree::{RegressionTree, TreeParams};

/// Forest size and sampling seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub seed: u64,
    pub tree: TreeParams,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            seed: 42,
            tree: TreeParams::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    params: ForestParams,
    trees: Vec<RegressionTree>,
}

impl RandomForest {
    /// Fits each tree on a bootstrap resample of the batch.
    ///
    /// The same batch and seed always produce the same forest.
    #[must_use]
    pub fn fit(features: &Array2<f64>, labels: &Array1<f64>, params: ForestParams) -> Self {
        let n = features.nrows();
        let mut rng = StdRng::seed_from_u64(params.seed);

        let trees = (0..params.n_estimators)
            .map(|_| {
                let rows: Vec<usize> = if n == 0 {
                    Vec::new()
                } else {
                    (0..n).map(|_| rng.gen_range(0..n)).collect()
                };
                RegressionTree::fit_rows(features, labels, rows, params.tree)
            })
            .collect();

        Self { params, trees }
    }

    /// Mean of the per-tree predictions.
    #[must_use]
    #[expect(clippy::cast_precision_loss, reason = "tree counts are far below 2^52")]
    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let total: f64 = self.trees.iter().map(|t| t.predict_row(row)).sum();
        total / self.trees.len() as f64
    }

    #[must_use]
    pub fn predict(&self, features: &Array2<f64>) -> Array1<f64> {
        features
            .rows()
            .into_iter()
            .map(|row| self.predict_row(row))
            .collect()
    }

    #[must_use]
    pub fn n_estimators(&self) -> usize {
        self.trees.len()
    }

    pub(crate) fn is_well_formed(&self, n_features: usize) -> bool {
        !self.trees.is_empty() && self.trees.iter().all(|t| t.is_well_formed(n_features))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Array2<f64>, Array1<f64>) {
        let features = Array2::from_shape_fn((40, 2), |(i, j)| ((i * 7 + j * 3) % 11) as f64);
        let labels = features
            .rows()
            .into_iter()
            .map(|r| 2.0 * r[0] + r[1])
            .collect();
        (features, labels)
    }

    #[test]
    fn test_same_seed_same_forest() {
        let (features, labels) = sample();
        let params = ForestParams {
            n_estimators: 10,
            ..ForestParams::default()
        };

        let a = RandomForest::fit(&features, &labels, params);
        let b = RandomForest::fit(&features, &labels, params);
        assert_eq!(a, b);
        assert_eq!(a.n_estimators(), 10);
        assert_eq!(a.predict(&features), b.predict(&features));
    }

    #[test]
    fn test_predictions_stay_within_label_range() {
        let (features, labels) = sample();
        let forest = RandomForest::fit(&features, &labels, ForestParams::default());

        let min = labels.iter().copied().fold(f64::INFINITY, f64::min);
        let max = labels.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        for p in forest.predict(&features) {
            assert!(p >= min - 1e-9 && p <= max + 1e-9);
        }
    }
}
