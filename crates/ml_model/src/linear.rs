//! Ordinary least squares with an intercept.

use ndarray::{Array1, Array2, ArrayView1, Axis, s};
use serde::{Deserialize, Serialize};

/// Relative pivot size below which a column is treated as redundant.
const PIVOT_TOLERANCE: f64 = 1e-10;

/// Fitted linear model: `y = intercept + coefficients · x`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearRegression {
    pub intercept: f64,
    pub coefficients: Array1<f64>,
}

impl LinearRegression {
    /// Fits by solving the normal equations.
    ///
    /// Columns that are constant or linear combinations of earlier columns
    /// get a zero coefficient.
    #[must_use]
    pub fn fit(features: &Array2<f64>, labels: &Array1<f64>) -> Self {
        let width = features.ncols() + 1;

        let mut design = Array2::<f64>::ones((features.nrows(), width));
        design.slice_mut(s![.., 1..]).assign(features);

        let gram = design.t().dot(&design);
        let moments = design.t().dot(labels);
        let solution = solve_normal_equations(gram, &moments);

        Self {
            intercept: solution[0],
            coefficients: solution.slice(s![1..]).to_owned(),
        }
    }

    /// Predicts a single scaled row.
    #[must_use]
    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        self.intercept + self.coefficients.dot(&row)
    }

    /// Predicts every row of a scaled batch.
    #[must_use]
    pub fn predict(&self, features: &Array2<f64>) -> Array1<f64> {
        features.dot(&self.coefficients) + self.intercept
    }

    #[must_use]
    pub fn n_features(&self) -> usize {
        self.coefficients.len()
    }
}

/// Gauss-Jordan elimination with partial pivoting on `gram · x = moments`.
fn solve_normal_equations(gram: Array2<f64>, moments: &Array1<f64>) -> Array1<f64> {
    let n = moments.len();
    let mut augmented = Array2::<f64>::zeros((n, n + 1));
    augmented.slice_mut(s![.., ..n]).assign(&gram);
    augmented.column_mut(n).assign(moments);

    let scale = gram
        .diag()
        .iter()
        .fold(1.0_f64, |acc, v| acc.max(v.abs()));
    let tolerance = PIVOT_TOLERANCE * scale;

    let mut pivot_rows: Vec<Option<usize>> = vec![None; n];
    let mut row = 0;

    for col in 0..n {
        if row == n {
            break;
        }

        let (best, magnitude) = (row..n)
            .map(|r| (r, augmented[[r, col]].abs()))
            .fold((row, -1.0), |acc, cur| if cur.1 > acc.1 { cur } else { acc });

        if magnitude <= tolerance {
            continue;
        }

        if best != row {
            for c in 0..=n {
                augmented.swap([row, c], [best, c]);
            }
        }

        let pivot = augmented[[row, col]];
        augmented.row_mut(row).mapv_inplace(|v| v / pivot);
        let pivot_row = augmented.row(row).to_owned();

        for (r, mut other) in augmented.axis_iter_mut(Axis(0)).enumerate() {
            if r == row {
                continue;
            }
            let factor = other[col];
            if factor != 0.0 {
                other.scaled_add(-factor, &pivot_row);
            }
        }

        pivot_rows[col] = Some(row);
        row += 1;
    }

    pivot_rows
        .iter()
        .map(|pivot| pivot.map_or(0.0, |r| augmented[[r, n]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn test_recovers_exact_coefficients() {
        let features = array![[0.0, 1.0], [1.0, 0.0], [2.0, 1.0], [3.0, 5.0], [4.0, 2.0]];
        let labels = features
            .rows()
            .into_iter()
            .map(|r| 50.0 + 5.0 * r[0] + 3.0 * r[1])
            .collect::<Array1<f64>>();

        let model = LinearRegression::fit(&features, &labels);
        assert!((model.intercept - 50.0).abs() < 1e-8);
        assert!((model.coefficients[0] - 5.0).abs() < 1e-8);
        assert!((model.coefficients[1] - 3.0).abs() < 1e-8);

        let predicted = model.predict(&features);
        for (p, y) in predicted.iter().zip(&labels) {
            assert!((p - y).abs() < 1e-8);
        }
    }

    #[test]
    fn test_constant_column_gets_zero_coefficient() {
        let features = array![[1.0, 0.0], [2.0, 0.0], [3.0, 0.0]];
        let labels = array![2.0, 4.0, 6.0];

        let model = LinearRegression::fit(&features, &labels);
        assert!(model.coefficients[1].abs() < f64::EPSILON);
        assert!((model.predict_row(array![4.0, 0.0].view()) - 8.0).abs() < 1e-8);
    }

    #[test]
    fn test_duplicated_column_still_fits() {
        let features = array![[1.0, 1.0], [2.0, 2.0], [3.0, 3.0], [4.0, 4.0]];
        let labels = array![3.0, 5.0, 7.0, 9.0];

        let model = LinearRegression::fit(&features, &labels);
        let predicted = model.predict(&features);
        for (p, y) in predicted.iter().zip(&labels) {
            assert!((p - y).abs() < 1e-8);
        }
    }
}
