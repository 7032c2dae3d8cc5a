//! Least squares via SVD.

use nalgebra::{DMatrix, DVector};

/// Singular values below `RELATIVE_TOL * max_sv` are treated as zero.
const RELATIVE_TOL: f64 = 1e-10;

#[derive(Debug, Clone)]
pub(crate) struct LeastSquares {
    pub coefficients: Vec<f64>,
    pub residuals: Vec<f64>,
}

/// Solve `min ||X b - y||` for a row-major design `X` (`rows x cols`).
///
/// Returns `None` for an empty or underdetermined system, or when the
/// solution is not finite.
pub(crate) fn least_squares(
    rows: usize,
    cols: usize,
    design: &[f64],
    target: &[f64],
) -> Option<LeastSquares> {
    if cols == 0 || rows <= cols || design.len() != rows * cols || target.len() != rows {
        return None;
    }

    let x = DMatrix::from_row_slice(rows, cols, design);
    let y = DVector::from_column_slice(target);

    let svd = x.clone().svd(true, true);
    let max_sv = svd.singular_values.max();
    if !max_sv.is_finite() || max_sv <= 0.0 {
        return None;
    }
    let beta = svd.solve(&y, max_sv * RELATIVE_TOL).ok()?;
    if beta.iter().any(|b| !b.is_finite()) {
        return None;
    }

    let fitted = &x * &beta;
    let residuals = (&y - fitted).iter().copied().collect();

    Some(LeastSquares {
        coefficients: beta.iter().copied().collect(),
        residuals,
    })
}
