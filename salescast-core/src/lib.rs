//! SalesCast Core: domain types, data loading, preprocessing, order search, forecasting.
//!
//! This crate contains the per-store forecasting pipeline:
//! - Domain types (raw records, store attributes, daily series, train/test split)
//! - Sales sources (CSV exports, in-memory fixtures)
//! - Preprocessing to a gap-free, forward-filled daily series
//! - Exogenous covariate encoding
//! - KPSS differencing and stepwise ARIMA order search with exogenous regressors
//! - Held-out evaluation and fixed-horizon future forecasts

pub mod data;
pub mod domain;
pub mod exog;
pub mod forecast;
pub mod model;
pub mod preprocess;

pub use data::{CsvSalesSource, InMemorySource, LoadError, SalesSource};
pub use domain::{DailySeries, RawRecord, StateHoliday, StoreAttributes, StoreFrame, StoreId};
pub use exog::ExogMatrix;
pub use forecast::{
    evaluate, forecast_future, run_forecast, Evaluation, ForecastOptions, ForecastPoint,
    ForecastResult, FutureExogPolicy,
};
pub use model::{fit, ArimaOrder, FittedModel, ModelError, SearchConfig};
pub use preprocess::{build_daily_series, PreprocessError};
