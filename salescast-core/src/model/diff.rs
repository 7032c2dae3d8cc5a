//! Differencing and integration.

use crate::exog::ExogMatrix;

/// Apply first differences `d` times. Each pass shortens the series by one.
pub fn difference(data: &[f64], d: usize) -> Vec<f64> {
    let mut out = data.to_vec();
    for _ in 0..d {
        if out.len() < 2 {
            return Vec::new();
        }
        out = out.windows(2).map(|w| w[1] - w[0]).collect();
    }
    out
}

/// Difference every column of `m` `d` times.
pub fn difference_rows(m: &ExogMatrix, d: usize) -> ExogMatrix {
    if d == 0 {
        return m.clone();
    }
    let rows: Vec<Vec<f64>> = m.rows().map(<[f64]>::to_vec).collect();
    let mut out = rows;
    for _ in 0..d {
        if out.len() < 2 {
            return ExogMatrix::zeros(0, m.width());
        }
        out = out
            .windows(2)
            .map(|w| w[1].iter().zip(&w[0]).map(|(b, a)| b - a).collect())
            .collect();
    }
    ExogMatrix::from_rows(&out).unwrap_or_else(|| ExogMatrix::zeros(0, m.width()))
}

/// Last value of `data` differenced `k` times, for `k = 0..d`.
///
/// These anchor the cumulative sums that undo differencing.
pub(crate) fn level_tails(data: &[f64], d: usize) -> Vec<f64> {
    let mut tails = Vec::with_capacity(d);
    let mut level = data.to_vec();
    for _ in 0..d {
        match level.last() {
            Some(v) => tails.push(*v),
            None => break,
        }
        level = difference(&level, 1);
    }
    tails
}

/// Undo `tails.len()` rounds of differencing on a forecast path.
pub(crate) fn integrate(diffed: &[f64], tails: &[f64]) -> Vec<f64> {
    let mut out = diffed.to_vec();
    for anchor in tails.iter().rev() {
        let mut level = *anchor;
        for v in out.iter_mut() {
            level += *v;
            *v = level;
        }
    }
    out
}
