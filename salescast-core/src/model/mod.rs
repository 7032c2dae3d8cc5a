//! Order selection and fitting of ARIMA models with exogenous regressors.
//!
//! `fit` chooses the differencing order with repeated KPSS tests, runs a
//! bounded stepwise search over (p, q) on the differenced series, and keeps
//! the state needed to forecast forward from the end of the sample.

mod armax;
pub mod diff;
pub mod kpss;
mod ols;
mod stepwise;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::exog::ExogMatrix;
use armax::{forecast_differenced, ArmaxData};
use diff::{difference, difference_rows, integrate, level_tails};

/// Minimum number of differenced observations beyond the CSS offset.
const MIN_EFFECTIVE_OBS: usize = 10;

/// Columns whose differenced variance falls below this are dropped.
const CONSTANT_COLUMN_VAR: f64 = 1e-12;

/// Non-seasonal ARIMA order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArimaOrder {
    pub p: usize,
    pub d: usize,
    pub q: usize,
}

impl fmt::Display for ArimaOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{},{})", self.p, self.d, self.q)
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("series too short to fit: need {needed} observations, got {got}")]
    InsufficientData { needed: usize, got: usize },

    #[error("no viable order found with d={d} after {evaluated} candidates")]
    NoViableOrder { d: usize, evaluated: usize },

    #[error("non-finite value in {0}")]
    NonFinite(&'static str),

    #[error("exogenous shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: usize, got: usize },

    #[error("evaluation needs at least one held-out observation")]
    EmptyTestSet,
}

/// Bounds of the order search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub max_p: usize,
    pub max_q: usize,
    /// Upper bound on `p + q`.
    pub max_order: usize,
    pub max_d: usize,
    /// Maximum number of (p, q) candidates scored.
    pub max_steps: usize,
    /// Score each neighbour batch on the rayon pool.
    pub parallel: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_p: 5,
            max_q: 5,
            max_order: 5,
            max_d: 2,
            max_steps: 100,
            parallel: true,
        }
    }
}

/// A fitted model plus the in-sample state needed to forecast.
#[derive(Debug, Clone)]
pub struct FittedModel {
    order: ArimaOrder,
    intercept: f64,
    /// Exogenous columns kept for the fit, indices into the input matrix.
    active_columns: Vec<usize>,
    beta: Vec<f64>,
    ar: Vec<f64>,
    ma: Vec<f64>,
    sigma2: f64,
    aic: f64,
    n_obs: usize,
    models_evaluated: usize,
    exog_width: usize,
    /// Last `p` differenced observations, oldest first.
    w_tail: Vec<f64>,
    /// Last `q` residuals, oldest first.
    e_tail: Vec<f64>,
    /// Last value of the target differenced `k` times, `k = 0..d`.
    level_tails: Vec<f64>,
    /// Last `d` raw exogenous rows, for differencing future rows.
    exog_tail: ExogMatrix,
}

impl FittedModel {
    pub fn order(&self) -> ArimaOrder {
        self.order
    }

    pub fn aic(&self) -> f64 {
        self.aic
    }

    pub fn sigma2(&self) -> f64 {
        self.sigma2
    }

    pub fn ar(&self) -> &[f64] {
        &self.ar
    }

    pub fn ma(&self) -> &[f64] {
        &self.ma
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    /// Coefficient per input exogenous column; 0 for dropped columns.
    pub fn exog_coefficients(&self) -> Vec<f64> {
        let mut out = vec![0.0; self.exog_width];
        for (col, b) in self.active_columns.iter().zip(&self.beta) {
            out[*col] = *b;
        }
        out
    }

    pub fn n_obs(&self) -> usize {
        self.n_obs
    }

    pub fn models_evaluated(&self) -> usize {
        self.models_evaluated
    }

    /// Forecast `future_exog.n_rows()` steps past the end of the sample, on
    /// the scale the model was fitted on.
    pub fn forecast(&self, future_exog: &ExogMatrix) -> Result<Vec<f64>, ModelError> {
        if future_exog.width() != self.exog_width {
            return Err(ModelError::ShapeMismatch {
                expected: self.exog_width,
                got: future_exog.width(),
            });
        }
        if future_exog.is_empty() {
            return Ok(Vec::new());
        }

        let d = self.order.d;
        let joined = self
            .exog_tail
            .concat(future_exog)
            .ok_or(ModelError::ShapeMismatch {
                expected: self.exog_width,
                got: future_exog.width(),
            })?;
        let future_x = difference_rows(&joined, d)
            .tail(future_exog.n_rows())
            .select_columns(&self.active_columns);

        let diffed = forecast_differenced(
            self.intercept,
            &self.beta,
            &self.ar,
            &self.ma,
            &self.w_tail,
            &self.e_tail,
            &future_x,
        );
        let path = integrate(&diffed, &self.level_tails);

        if path.iter().any(|v| !v.is_finite()) {
            return Err(ModelError::NonFinite("forecast"));
        }
        Ok(path)
    }
}

/// Select an order and fit it.
///
/// `target` and `exog` must be row-aligned. The same exogenous matrix is
/// used for the search and the returned fit.
pub fn fit(
    target: &[f64],
    exog: &ExogMatrix,
    config: &SearchConfig,
) -> Result<FittedModel, ModelError> {
    let n = target.len();
    if exog.n_rows() != n {
        return Err(ModelError::ShapeMismatch {
            expected: n,
            got: exog.n_rows(),
        });
    }
    if target.iter().any(|v| !v.is_finite()) {
        return Err(ModelError::NonFinite("target"));
    }
    if exog.rows().flatten().any(|v| !v.is_finite()) {
        return Err(ModelError::NonFinite("exogenous regressors"));
    }

    let needed = config.max_d + config.max_p + MIN_EFFECTIVE_OBS;
    if n < needed {
        return Err(ModelError::InsufficientData { needed, got: n });
    }

    let d = kpss::ndiffs(target, config.max_d);
    let w = difference(target, d);
    let x_full = difference_rows(exog, d);
    let active_columns = varying_columns(&x_full);
    let x = x_full.select_columns(&active_columns);

    let data = ArmaxData {
        w: &w,
        x: &x,
        intercept: d <= 1,
        offset: config.max_p,
    };
    let outcome = stepwise::stepwise_search(&data, d, config);
    let best = outcome.best.ok_or(ModelError::NoViableOrder {
        d,
        evaluated: outcome.evaluated,
    })?;

    let order = ArimaOrder {
        p: best.p,
        d,
        q: best.q,
    };
    debug!(
        %order,
        aic = best.aic,
        evaluated = outcome.evaluated,
        exog = active_columns.len(),
        "order selected"
    );

    let w_tail = w[w.len().saturating_sub(best.p)..].to_vec();
    let e_tail = best.residuals[best.residuals.len().saturating_sub(best.q)..].to_vec();

    Ok(FittedModel {
        order,
        intercept: best.intercept,
        active_columns,
        beta: best.beta,
        ar: best.ar,
        ma: best.ma,
        sigma2: best.sigma2,
        aic: best.aic,
        n_obs: n,
        models_evaluated: outcome.evaluated,
        exog_width: exog.width(),
        w_tail,
        e_tail,
        level_tails: level_tails(target, d),
        exog_tail: exog.tail(d),
    })
}

fn varying_columns(x: &ExogMatrix) -> Vec<usize> {
    (0..x.width())
        .filter(|&j| {
            let col = x.column(j);
            let n = col.len() as f64;
            if col.is_empty() {
                return false;
            }
            let mean = col.iter().sum::<f64>() / n;
            let var = col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            var > CONSTANT_COLUMN_VAR
        })
        .collect()
}
