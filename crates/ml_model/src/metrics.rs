//! Regression metrics.

use ndarray::Array1;

/// Coefficient of determination.
///
/// A constant target scores `1.0` when predicted exactly and `0.0` otherwise.
#[must_use]
pub fn r_squared(actual: &Array1<f64>, predicted: &Array1<f64>) -> f64 {
    let Some(mean) = actual.mean() else {
        return 0.0;
    };

    let ss_res: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    let ss_tot: f64 = actual.iter().map(|a| (a - mean).powi(2)).sum();

    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }

    1.0 - ss_res / ss_tot
}

/// Root mean squared error.
#[must_use]
pub fn rmse(actual: &Array1<f64>, predicted: &Array1<f64>) -> f64 {
    (actual - predicted).mapv(|e| e * e).mean().unwrap_or(0.0).sqrt()
}

/// Mean absolute error.
#[must_use]
pub fn mae(actual: &Array1<f64>, predicted: &Array1<f64>) -> f64 {
    (actual - predicted).mapv(f64::abs).mean().unwrap_or(0.0)
}

/// Absolute error as a percentage of each actual value.
///
/// Samples with a non-positive actual value contribute `0.0`.
#[must_use]
pub fn percent_errors(actual: &Array1<f64>, predicted: &Array1<f64>) -> Vec<f64> {
    actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| if *a > 0.0 { (a - p).abs() / a * 100.0 } else { 0.0 })
        .collect()
}

/// Rounds half away from zero to `decimals` places.
#[must_use]
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
