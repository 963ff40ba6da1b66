//! Column statistics shared by the batch transformations.

use ndarray::ArrayView1;

/// Percentile of `values` using linear interpolation between closest ranks.
///
/// `q` is in percent (`0.0..=100.0`) and is clamped to that range. Returns
/// `None` for an empty slice.
#[must_use]
#[expect(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "ranks are small non-negative indices"
)]
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let rank = q.clamp(0.0, 100.0) / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f64;

    Some((sorted[upper] - sorted[lower]).mul_add(fraction, sorted[lower]))
}

/// Median of `values`, or `None` if empty.
#[must_use]
pub fn median(values: &[f64]) -> Option<f64> {
    percentile(values, 50.0)
}

/// Arithmetic mean of a column, or `None` if empty.
#[must_use]
pub fn mean(column: ArrayView1<'_, f64>) -> Option<f64> {
    column.mean()
}

/// Population standard deviation of a column, or `None` if empty.
#[must_use]
pub fn std_dev(column: ArrayView1<'_, f64>) -> Option<f64> {
    if column.is_empty() {
        return None;
    }
    Some(column.std(0.0))
}
