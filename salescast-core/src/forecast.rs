//! Evaluation and future forecasts for a single store.
//!
//! The model is fitted on `log1p(sales)`; both forecasts are mapped back
//! with `expm1`. The held-out forecast is left unclamped so the error metric
//! reflects what the model actually produced; future values are clamped at
//! zero since negative sales are not a usable plan.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{DailyObservation, DailySeries, StoreId};
use crate::exog::ExogMatrix;
use crate::model::{self, ArimaOrder, FittedModel, ModelError, SearchConfig};

/// How covariates are filled in for days after the training window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FutureExogPolicy {
    /// Repeat the last observed training row.
    #[default]
    RepeatLastObserved,
    /// Assume no promotion and no holidays.
    NoPromoNoHoliday,
}

impl FutureExogPolicy {
    /// Build `horizon` future rows from the training covariates.
    pub fn future_exog(&self, train_exog: &ExogMatrix, horizon: usize) -> ExogMatrix {
        match (self, train_exog.last_row()) {
            (Self::RepeatLastObserved, Some(last)) => ExogMatrix::repeat_row(last, horizon),
            _ => ExogMatrix::zeros(horizon, train_exog.width()),
        }
    }
}

/// Tunables for one store's forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastOptions {
    /// Leading share of the series used for fitting.
    pub train_fraction: f64,
    /// Days forecast past the last training date.
    pub horizon: usize,
    pub exog_policy: FutureExogPolicy,
    pub search: SearchConfig,
}

impl Default for ForecastOptions {
    fn default() -> Self {
        Self {
            train_fraction: 0.8,
            horizon: 30,
            exog_policy: FutureExogPolicy::default(),
            search: SearchConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationPoint {
    pub date: NaiveDate,
    pub actual: f64,
    pub predicted: f64,
}

/// Held-out forecast aligned with the test dates, and its RMSE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub points: Vec<EvaluationPoint>,
    pub rmse: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub store_id: StoreId,
    pub order_used: ArimaOrder,
    pub aic: f64,
    pub models_evaluated: usize,
    pub last_train_date: NaiveDate,
    pub evaluation: Evaluation,
    pub future: Vec<ForecastPoint>,
    pub exog_policy: FutureExogPolicy,
}

impl ForecastResult {
    /// RMSE of the held-out forecast.
    pub fn error_metric(&self) -> f64 {
        self.evaluation.rmse
    }
}

/// Fit on `log1p` of the training sales.
pub fn fit_log_model(
    train: &[DailyObservation],
    train_exog: &ExogMatrix,
    search: &SearchConfig,
) -> Result<FittedModel, ModelError> {
    let target: Vec<f64> = train.iter().map(|o| o.sales.ln_1p()).collect();
    model::fit(&target, train_exog, search)
}

/// Forecast the held-out days and score them.
pub fn evaluate(
    fitted: &FittedModel,
    test: &[DailyObservation],
    test_exog: &ExogMatrix,
) -> Result<Evaluation, ModelError> {
    if test.is_empty() {
        return Err(ModelError::EmptyTestSet);
    }
    if test_exog.n_rows() != test.len() {
        return Err(ModelError::ShapeMismatch {
            expected: test.len(),
            got: test_exog.n_rows(),
        });
    }

    let log_path = fitted.forecast(test_exog)?;
    let points: Vec<EvaluationPoint> = test
        .iter()
        .zip(log_path)
        .map(|(obs, log_value)| EvaluationPoint {
            date: obs.date,
            actual: obs.sales,
            predicted: log_value.exp_m1(),
        })
        .collect();

    if points.iter().any(|p| !p.predicted.is_finite()) {
        return Err(ModelError::NonFinite("evaluation forecast"));
    }
    let rmse = rmse(&points);
    if !rmse.is_finite() {
        return Err(ModelError::NonFinite("error metric"));
    }

    Ok(Evaluation { points, rmse })
}

/// Forecast `horizon` consecutive days starting the day after
/// `last_train_date`.
pub fn forecast_future(
    fitted: &FittedModel,
    last_train_date: NaiveDate,
    train_exog: &ExogMatrix,
    horizon: usize,
    policy: FutureExogPolicy,
) -> Result<Vec<ForecastPoint>, ModelError> {
    let future_exog = policy.future_exog(train_exog, horizon);
    let log_path = fitted.forecast(&future_exog)?;

    let dates: Vec<NaiveDate> = last_train_date.iter_days().skip(1).take(horizon).collect();
    if dates.len() != horizon {
        return Err(ModelError::NonFinite("forecast dates"));
    }

    dates
        .into_iter()
        .zip(log_path)
        .map(|(date, log_value)| {
            let value = log_value.exp_m1();
            if value.is_finite() {
                Ok(ForecastPoint {
                    date,
                    value: value.max(0.0),
                })
            } else {
                Err(ModelError::NonFinite("future forecast"))
            }
        })
        .collect()
}

/// Split, fit, evaluate, and forecast ahead for one store's series.
pub fn run_forecast(
    series: &DailySeries,
    options: &ForecastOptions,
) -> Result<ForecastResult, ModelError> {
    let split = series.split(options.train_fraction);
    let last_train_date = split.last_train_date().ok_or(ModelError::InsufficientData {
        needed: 2,
        got: series.len(),
    })?;

    let train_exog = ExogMatrix::encode(split.train);
    let test_exog = ExogMatrix::encode(split.test);

    let fitted = fit_log_model(split.train, &train_exog, &options.search)?;
    let evaluation = evaluate(&fitted, split.test, &test_exog)?;
    let future = forecast_future(
        &fitted,
        last_train_date,
        &train_exog,
        options.horizon,
        options.exog_policy,
    )?;

    debug!(
        store_id = series.store_id(),
        order = %fitted.order(),
        rmse = evaluation.rmse,
        "store forecast complete"
    );

    Ok(ForecastResult {
        store_id: series.store_id(),
        order_used: fitted.order(),
        aic: fitted.aic(),
        models_evaluated: fitted.models_evaluated(),
        last_train_date,
        evaluation,
        future,
        exog_policy: options.exog_policy,
    })
}

fn rmse(points: &[EvaluationPoint]) -> f64 {
    let n = points.len() as f64;
    let sse: f64 = points
        .iter()
        .map(|p| (p.actual - p.predicted).powi(2))
        .sum();
    (sse / n).sqrt()
}
