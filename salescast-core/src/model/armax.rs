//! ARMAX estimation on an already differenced series.
//!
//! Model: `w_t = c + x_t·β + Σ φ_i w_{t-i} + Σ θ_j e_{t-j} + e_t`.
//!
//! Estimation is Hannan–Rissanen: a long autoregression supplies residual
//! proxies, then one regression on `[1, x_t, w lags, ê lags]` gives initial
//! parameters. Those are refined by re-regressing on the recursively computed
//! conditional residuals while the conditional sum of squares decreases.

use std::f64::consts::PI;

use super::ols::least_squares;
use crate::exog::ExogMatrix;

const MIN_LONG_AR: usize = 10;
const REFINE_ROUNDS: usize = 5;
const SIGMA2_FLOOR: f64 = 1e-12;

/// Inputs shared by every candidate order.
#[derive(Debug, Clone)]
pub(crate) struct ArmaxData<'a> {
    pub w: &'a [f64],
    pub x: &'a ExogMatrix,
    pub intercept: bool,
    /// First index of the CSS sum, identical for all candidates.
    pub offset: usize,
}

/// Why a candidate was not viable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Rejection {
    TooShort,
    Singular,
    NonStationary,
    NonInvertible,
    NonFinite,
}

#[derive(Debug, Clone)]
pub(crate) struct ArmaxFit {
    pub p: usize,
    pub q: usize,
    pub intercept: f64,
    pub beta: Vec<f64>,
    pub ar: Vec<f64>,
    pub ma: Vec<f64>,
    pub residuals: Vec<f64>,
    pub sigma2: f64,
    pub aic: f64,
}

#[derive(Debug, Clone)]
struct Params {
    intercept: f64,
    beta: Vec<f64>,
    ar: Vec<f64>,
    ma: Vec<f64>,
}

impl Params {
    fn n_params(&self, with_intercept: bool) -> usize {
        usize::from(with_intercept) + self.beta.len() + self.ar.len() + self.ma.len()
    }

    fn from_coefficients(coef: &[f64], with_intercept: bool, k: usize, p: usize) -> Self {
        let mut it = coef.iter().copied();
        let intercept = if with_intercept {
            it.next().unwrap_or(0.0)
        } else {
            0.0
        };
        let beta: Vec<f64> = it.by_ref().take(k).collect();
        let ar: Vec<f64> = it.by_ref().take(p).collect();
        let ma: Vec<f64> = it.collect();
        Self {
            intercept,
            beta,
            ar,
            ma,
        }
    }

    fn mean_at(&self, x_row: &[f64]) -> f64 {
        self.intercept
            + x_row
                .iter()
                .zip(&self.beta)
                .map(|(x, b)| x * b)
                .sum::<f64>()
    }
}

/// Fit one (p, q) candidate.
pub(crate) fn fit_armax(data: &ArmaxData<'_>, p: usize, q: usize) -> Result<ArmaxFit, Rejection> {
    let n = data.w.len();
    if data.offset < p || data.offset >= n {
        return Err(Rejection::TooShort);
    }

    let proxies = if q > 0 {
        Some(long_ar_residuals(data, p + q)?)
    } else {
        None
    };

    let (start, lagged_e) = match &proxies {
        Some((m, e)) => (p.max(m + q), e.as_slice()),
        None => (p, &[][..]),
    };
    let mut params = regress(data, p, q, start, lagged_e)?;
    let mut residuals = css_residuals(data, &params);
    let mut css = css_sum(&residuals, data.offset);

    if q > 0 {
        for _ in 0..REFINE_ROUNDS {
            let refined = match regress(data, p, q, p.max(q), &residuals) {
                Ok(r) => r,
                Err(_) => break,
            };
            let refined_residuals = css_residuals(data, &refined);
            let refined_css = css_sum(&refined_residuals, data.offset);
            if !(refined_css.is_finite() && refined_css < css * (1.0 - 1e-9)) {
                break;
            }
            params = refined;
            residuals = refined_residuals;
            css = refined_css;
        }
    }

    if !is_stationary(&params.ar) {
        return Err(Rejection::NonStationary);
    }
    let neg_ma: Vec<f64> = params.ma.iter().map(|t| -t).collect();
    if !is_stationary(&neg_ma) {
        return Err(Rejection::NonInvertible);
    }

    let n_eff = n - data.offset;
    let n_params = params.n_params(data.intercept);
    if n_eff <= n_params + 1 {
        return Err(Rejection::TooShort);
    }

    let sigma2 = (css / n_eff as f64).max(SIGMA2_FLOOR);
    let all_finite = params.intercept.is_finite()
        && params
            .beta
            .iter()
            .chain(&params.ar)
            .chain(&params.ma)
            .all(|v| v.is_finite());
    if !all_finite || !sigma2.is_finite() {
        return Err(Rejection::NonFinite);
    }

    let nf = n_eff as f64;
    let aic = nf * ((2.0 * PI * sigma2).ln() + 1.0) + 2.0 * (n_params + 1) as f64;
    if !aic.is_finite() {
        return Err(Rejection::NonFinite);
    }

    Ok(ArmaxFit {
        p,
        q,
        intercept: params.intercept,
        beta: params.beta,
        ar: params.ar,
        ma: params.ma,
        residuals,
        sigma2,
        aic,
    })
}

/// Residuals of a long autoregression, used as innovation proxies.
/// Returns the AR order `m` and proxies (zero before index `m`).
fn long_ar_residuals(data: &ArmaxData<'_>, min_order: usize) -> Result<(usize, Vec<f64>), Rejection> {
    let n = data.w.len();
    let m = min_order.max(MIN_LONG_AR).min(n / 4);
    if m == 0 {
        return Err(Rejection::TooShort);
    }
    let fit = regress(data, m, 0, m, &[])?;
    let fitted = css_residuals(data, &fit);
    let mut proxies = vec![0.0; n];
    proxies[m..].copy_from_slice(&fitted[m..]);
    Ok((m, proxies))
}

/// Regress `w_t` for `t in start..n` on `[1?, x_t, w_{t-1..p}, e_{t-1..q}]`.
fn regress(
    data: &ArmaxData<'_>,
    p: usize,
    q: usize,
    start: usize,
    lagged_e: &[f64],
) -> Result<Params, Rejection> {
    let n = data.w.len();
    let k = data.x.width();
    let cols = usize::from(data.intercept) + k + p + q;
    if start >= n || (q > 0 && lagged_e.len() != n) {
        return Err(Rejection::TooShort);
    }
    let rows = n - start;
    if cols == 0 {
        // Pure white noise around zero: nothing to estimate.
        return Ok(Params {
            intercept: 0.0,
            beta: Vec::new(),
            ar: Vec::new(),
            ma: Vec::new(),
        });
    }
    if rows <= cols {
        return Err(Rejection::TooShort);
    }

    let mut design = Vec::with_capacity(rows * cols);
    for t in start..n {
        if data.intercept {
            design.push(1.0);
        }
        design.extend_from_slice(data.x.row(t));
        design.extend((1..=p).map(|i| data.w[t - i]));
        design.extend((1..=q).map(|j| lagged_e[t - j]));
    }

    let fit = least_squares(rows, cols, &design, &data.w[start..]).ok_or(Rejection::Singular)?;
    Ok(Params::from_coefficients(
        &fit.coefficients,
        data.intercept,
        k,
        p,
    ))
}

/// Conditional residuals: zero before index `p`, then the model recursion.
fn css_residuals(data: &ArmaxData<'_>, params: &Params) -> Vec<f64> {
    let n = data.w.len();
    let p = params.ar.len();
    let mut e = vec![0.0; n];
    for t in p..n {
        let mut pred = params.mean_at(data.x.row(t));
        pred += params
            .ar
            .iter()
            .enumerate()
            .map(|(i, phi)| phi * data.w[t - i - 1])
            .sum::<f64>();
        pred += params
            .ma
            .iter()
            .enumerate()
            .filter(|(j, _)| t > *j)
            .map(|(j, theta)| theta * e[t - j - 1])
            .sum::<f64>();
        e[t] = data.w[t] - pred;
    }
    e
}

fn css_sum(residuals: &[f64], offset: usize) -> f64 {
    residuals[offset.min(residuals.len())..]
        .iter()
        .map(|e| e * e)
        .sum()
}

/// Stationarity of `1 - Σ a_i z^i` by the step-down recursion: every
/// reflection coefficient must lie strictly inside the unit interval.
pub(crate) fn is_stationary(coefficients: &[f64]) -> bool {
    let mut a = coefficients.to_vec();
    while let Some(&r) = a.last() {
        if !r.is_finite() || r.abs() >= 1.0 {
            return false;
        }
        let k = a.len();
        let denom = 1.0 - r * r;
        let lower: Vec<f64> = (0..k - 1)
            .map(|j| (a[j] + r * a[k - 2 - j]) / denom)
            .collect();
        a = lower;
    }
    true
}

/// Multi-step forecast of the differenced series.
///
/// `w_tail` holds the last `p` observed values, `e_tail` the last `q`
/// residuals (both oldest first); future innovations are zero.
pub(crate) fn forecast_differenced(
    intercept: f64,
    beta: &[f64],
    ar: &[f64],
    ma: &[f64],
    w_tail: &[f64],
    e_tail: &[f64],
    future_x: &ExogMatrix,
) -> Vec<f64> {
    let mut w: Vec<f64> = w_tail.to_vec();
    let mut e: Vec<f64> = e_tail.to_vec();
    let mut out = Vec::with_capacity(future_x.n_rows());

    for row in future_x.rows() {
        let mut pred = intercept + row.iter().zip(beta).map(|(x, b)| x * b).sum::<f64>();
        pred += ar
            .iter()
            .enumerate()
            .filter_map(|(i, phi)| w.len().checked_sub(i + 1).map(|idx| phi * w[idx]))
            .sum::<f64>();
        pred += ma
            .iter()
            .enumerate()
            .filter_map(|(j, theta)| e.len().checked_sub(j + 1).map(|idx| theta * e[idx]))
            .sum::<f64>();
        w.push(pred);
        e.push(0.0);
        out.push(pred);
    }
    out
}
