use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{FEATURE_COUNT, stats};

/// How `NaN` entries are filled before training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingValueStrategy {
    /// Replace with `0.0`.
    #[default]
    Zero,
    /// Replace with the mean of the non-`NaN` values in the same column.
    Mean,
}

/// Checks that a batch has the schema width and only finite values.
///
/// Never fails; the reason for rejection is logged.
#[must_use]
pub fn validate(features: &Array2<f64>) -> bool {
    if features.ncols() != FEATURE_COUNT {
        warn!(
            expected = FEATURE_COUNT,
            found = features.ncols(),
            "Feature count mismatch"
        );
        return false;
    }

    if features.iter().any(|v| v.is_nan()) {
        warn!("Features contain NaN values");
        return false;
    }

    if features.iter().any(|v| v.is_infinite()) {
        warn!("Features contain infinite values");
        return false;
    }

    true
}

/// Fills `NaN` entries according to `strategy`.
///
/// With [`MissingValueStrategy::Mean`] a column with no finite values falls
/// back to `0.0`.
#[must_use]
#[expect(clippy::cast_precision_loss, reason = "row counts are far below 2^52")]
pub fn handle_missing_values(
    features: &Array2<f64>,
    strategy: MissingValueStrategy,
) -> Array2<f64> {
    let mut filled = features.clone();

    for mut column in filled.axis_iter_mut(Axis(1)) {
        let replacement = match strategy {
            MissingValueStrategy::Zero => 0.0,
            MissingValueStrategy::Mean => {
                let present: Vec<f64> = column.iter().copied().filter(|v| !v.is_nan()).collect();
                if present.is_empty() {
                    0.0
                } else {
                    present.iter().sum::<f64>() / present.len() as f64
                }
            }
        };

        column.mapv_inplace(|v| if v.is_nan() { replacement } else { v });
    }

    filled
}

/// Caps each column at its `percentile` value.
///
/// Only the upper tail is clipped. Values are never raised.
#[must_use]
pub fn clip_outliers(features: &Array2<f64>, percentile: f64) -> Array2<f64> {
    let mut clipped = features.clone();

    for mut column in clipped.axis_iter_mut(Axis(1)) {
        let values = column.to_vec();
        let Some(cap) = stats::percentile(&values, percentile) else {
            continue;
        };
        column.mapv_inplace(|v| v.min(cap));
    }

    clipped
}

#[cfg(test)]
mod tests {
    use ndarray::{Array2, array};
    use proptest::prelude::*;

    use super::*;

    fn batch(rows: usize) -> Array2<f64> {
        Array2::from_shape_fn((rows, FEATURE_COUNT), |(i, j)| (i * FEATURE_COUNT + j) as f64)
    }

    #[test]
    fn test_validate_accepts_finite_batch() {
        assert!(validate(&batch(10)));
    }

    #[test]
    fn test_validate_rejects_wrong_width() {
        assert!(!validate(&Array2::zeros((10, 11))));
        assert!(!validate(&Array2::zeros((10, 13))));
    }

    #[test]
    fn test_validate_rejects_nan_and_inf() {
        let mut features = batch(4);
        features[[2, 5]] = f64::NAN;
        assert!(!validate(&features));

        let mut features = batch(4);
        features[[0, 0]] = f64::NEG_INFINITY;
        assert!(!validate(&features));
    }

    #[test]
    fn test_zero_strategy() {
        let mut features = batch(3);
        features[[1, 1]] = f64::NAN;
        let filled = handle_missing_values(&features, MissingValueStrategy::Zero);
        assert!(filled[[1, 1]].abs() < f64::EPSILON);
        assert!((filled[[0, 1]] - 1.0).abs() < f64::EPSILON);
        assert!(validate(&filled));
    }

    #[test]
    fn test_mean_strategy_uses_column_mean() {
        let mut features = Array2::zeros((3, FEATURE_COUNT));
        features[[0, 0]] = 2.0;
        features[[1, 0]] = f64::NAN;
        features[[2, 0]] = 4.0;

        let filled = handle_missing_values(&features, MissingValueStrategy::Mean);
        assert!((filled[[1, 0]] - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_mean_strategy_all_nan_column_becomes_zero() {
        let mut features = batch(3);
        features.column_mut(4).fill(f64::NAN);

        let filled = handle_missing_values(&features, MissingValueStrategy::Mean);
        assert!(filled.column(4).iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_clip_outliers_caps_upper_tail_only() {
        let features = array![[1.0, 10.0], [2.0, 10.0], [3.0, 10.0], [1000.0, 10.0]];
        let clipped = clip_outliers(&features, 99.0);

        assert!((clipped[[0, 0]] - 1.0).abs() < f64::EPSILON);
        assert!(clipped[[3, 0]] < 1000.0);
        assert!(clipped[[3, 0]] > 3.0);
        assert!(clipped.column(1).iter().all(|v| (*v - 10.0).abs() < f64::EPSILON));
    }

    #[test]
    fn test_clip_outliers_empty_batch() {
        let clipped = clip_outliers(&Array2::zeros((0, FEATURE_COUNT)), 99.0);
        assert_eq!(clipped.dim(), (0, FEATURE_COUNT));
    }

    proptest! {
        #[test]
        fn test_clip_never_increases(
            values in prop::collection::vec(-1e6f64..1e6, 1..64),
            q in 50.0f64..100.0,
        ) {
            let features = Array2::from_shape_vec((values.len(), 1), values.clone()).unwrap();
            let cap = stats::percentile(&values, q).unwrap();
            let clipped = clip_outliers(&features, q);

            for (before, after) in features.iter().zip(clipped.iter()) {
                prop_assert!(after <= before);
                prop_assert!(*after <= cap);
            }
        }

        #[test]
        fn test_validate_rejects_any_non_finite(
            row in 0usize..8,
            col in 0usize..FEATURE_COUNT,
            bad in prop_oneof![Just(f64::NAN), Just(f64::INFINITY), Just(f64::NEG_INFINITY)],
        ) {
            let mut features = batch(8);
            features[[row, col]] = bad;
            prop_assert!(!validate(&features));
        }

        #[test]
        fn test_validate_rejects_wrong_width_any(width in 0usize..32) {
            prop_assume!(width != FEATURE_COUNT);
            prop_assert!(!validate(&Array2::zeros((3, width))));
        }
    }
}
