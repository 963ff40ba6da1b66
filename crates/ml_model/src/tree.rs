//! CART regression trees.

use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

/// Growth limits for a regression tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: 15,
            min_samples_split: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Node {
    Leaf {
        value: f64,
    },
    /// Rows with `x[feature] <= threshold` go left.
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// A fitted regression tree stored as a flat node list rooted at index 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    params: TreeParams,
    n_features: usize,
    nodes: Vec<Node>,
}

struct Candidate {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

impl RegressionTree {
    /// Fits a tree on every row of the batch.
    #[must_use]
    pub fn fit(features: &Array2<f64>, labels: &Array1<f64>, params: TreeParams) -> Self {
        let indices: Vec<usize> = (0..features.nrows()).collect();
        Self::fit_rows(features, labels, indices, params)
    }

    /// Fits a tree on the given rows. Rows may repeat.
    #[must_use]
    pub fn fit_rows(
        features: &Array2<f64>,
        labels: &Array1<f64>,
        rows: Vec<usize>,
        params: TreeParams,
    ) -> Self {
        let mut tree = Self {
            params,
            n_features: features.ncols(),
            nodes: Vec::new(),
        };
        tree.grow(features, labels, rows, 0);
        tree
    }

    /// Predicts a single scaled row.
    #[must_use]
    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes.get(idx) {
                Some(Node::Leaf { value }) => return *value,
                Some(Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    idx = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
                None => return 0.0,
            }
        }
    }

    /// Predicts every row of a scaled batch.
    #[must_use]
    pub fn predict(&self, features: &Array2<f64>) -> Array1<f64> {
        features
            .rows()
            .into_iter()
            .map(|row| self.predict_row(row))
            .collect()
    }

    #[must_use]
    pub const fn n_features(&self) -> usize {
        self.n_features
    }

    /// Number of edges on the longest root-to-leaf path.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth_from(0)
    }

    #[must_use]
    pub fn leaf_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }

    /// Checks that every split references an existing node and feature.
    pub(crate) fn is_well_formed(&self, n_features: usize) -> bool {
        !self.nodes.is_empty()
            && self.n_features == n_features
            && self.nodes.iter().all(|node| match node {
                Node::Leaf { value } => value.is_finite(),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    *feature < n_features
                        && threshold.is_finite()
                        && *left < self.nodes.len()
                        && *right < self.nodes.len()
                }
            })
    }

    fn depth_from(&self, idx: usize) -> usize {
        match self.nodes.get(idx) {
            Some(Node::Split { left, right, .. }) => {
                1 + self.depth_from(*left).max(self.depth_from(*right))
            }
            _ => 0,
        }
    }

    /// Grows the subtree for `rows` and returns its node index.
    #[expect(clippy::cast_precision_loss, reason = "row counts are far below 2^52")]
    fn grow(
        &mut self,
        features: &Array2<f64>,
        labels: &Array1<f64>,
        rows: Vec<usize>,
        depth: usize,
    ) -> usize {
        let (sum, sum_sq) = rows.iter().fold((0.0, 0.0), |(s, sq), &r| {
            (s + labels[r], labels[r].mul_add(labels[r], sq))
        });
        let count = rows.len() as f64;
        let mean = if rows.is_empty() { 0.0 } else { sum / count };
        let impurity = sum.mul_add(-mean, sum_sq);

        let idx = self.nodes.len();
        self.nodes.push(Node::Leaf { value: mean });

        if depth >= self.params.max_depth
            || rows.len() < self.params.min_samples_split
            || impurity <= f64::EPSILON * sum_sq.max(1.0)
        {
            return idx;
        }

        let Some(best) = best_split(features, labels, &rows) else {
            return idx;
        };
        if best.impurity > impurity {
            return idx;
        }

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&r| features[[r, best.feature]] <= best.threshold);

        let left = self.grow(features, labels, left_rows, depth + 1);
        let right = self.grow(features, labels, right_rows, depth + 1);

        self.nodes[idx] = Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left,
            right,
        };
        idx
    }
}

/// Finds the split with the lowest summed squared error.
///
/// Features are scanned in order and ties keep the earliest candidate.
#[expect(clippy::cast_precision_loss, reason = "row counts are far below 2^52")]
fn best_split(features: &Array2<f64>, labels: &Array1<f64>, rows: &[usize]) -> Option<Candidate> {
    let total: f64 = rows.iter().map(|&r| labels[r]).sum();
    let total_sq: f64 = rows.iter().map(|&r| labels[r] * labels[r]).sum();
    let n = rows.len();

    let mut best: Option<Candidate> = None;
    let mut sorted = rows.to_vec();

    for feature in 0..features.ncols() {
        sorted.sort_by(|&a, &b| features[[a, feature]].total_cmp(&features[[b, feature]]));

        let mut left_sum = 0.0;
        let mut left_sq = 0.0;

        for split in 1..n {
            let prev = sorted[split - 1];
            left_sum += labels[prev];
            left_sq += labels[prev] * labels[prev];

            let lo = features[[prev, feature]];
            let hi = features[[sorted[split], feature]];
            if lo >= hi {
                continue;
            }

            let left_n = split as f64;
            let right_n = (n - split) as f64;
            let right_sum = total - left_sum;
            let right_sq = total_sq - left_sq;
            let impurity = (left_sq - left_sum * left_sum / left_n)
                + (right_sq - right_sum * right_sum / right_n);

            if best.as_ref().is_none_or(|b| impurity < b.impurity) {
                let mut threshold = lo.midpoint(hi);
                if threshold >= hi {
                    threshold = lo;
                }
                best = Some(Candidate {
                    feature,
                    threshold,
                    impurity,
                });
            }
        }
    }

    best
}
