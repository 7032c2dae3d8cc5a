//! Single-store pipeline: load -> preprocess -> fit -> forecast.
//!
//! Every failure is returned as a `PipelineError` with a `FailureKind`, so
//! the batch runner can record it and move on. Panics inside the model code
//! are caught here and reported as model-fit failures.

use std::panic::{catch_unwind, AssertUnwindSafe};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::BatchConfig;
use crate::persistence::PersistenceError;
use salescast_core::data::{LoadError, SalesSource};
use salescast_core::domain::StoreId;
use salescast_core::forecast::{run_forecast, ForecastOptions, ForecastResult};
use salescast_core::model::ModelError;
use salescast_core::preprocess::{build_daily_series, PreprocessError};

/// Coarse failure category recorded per store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Load,
    InsufficientData,
    ModelFit,
    Persistence,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("load failed: {0}")]
    Load(#[from] LoadError),

    #[error(transparent)]
    Preprocess(#[from] PreprocessError),

    #[error("store {store_id}: {observations} daily observations, need at least {required}")]
    TooFewObservations {
        store_id: StoreId,
        observations: usize,
        required: usize,
    },

    #[error("model fit failed: {0}")]
    Model(#[from] ModelError),

    #[error("model fit panicked: {0}")]
    Panicked(String),

    #[error("persistence failed: {0}")]
    Persistence(#[from] PersistenceError),
}

impl PipelineError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Load(_) => FailureKind::Load,
            Self::Preprocess(_) | Self::TooFewObservations { .. } => FailureKind::InsufficientData,
            Self::Model(_) | Self::Panicked(_) => FailureKind::ModelFit,
            Self::Persistence(_) => FailureKind::Persistence,
        }
    }
}

/// The subset of `BatchConfig` a single store run needs.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub forecast: ForecastOptions,
    pub min_observations: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            forecast: ForecastOptions::default(),
            min_observations: 60,
        }
    }
}

impl From<&BatchConfig> for PipelineSettings {
    fn from(config: &BatchConfig) -> Self {
        Self {
            forecast: config.forecast.clone(),
            min_observations: config.min_observations,
        }
    }
}

/// Run the full pipeline for one store.
pub fn run_store(
    source: &dyn SalesSource,
    store_id: StoreId,
    settings: &PipelineSettings,
) -> Result<ForecastResult, PipelineError> {
    let frame = source.load_store(store_id)?;
    let series = build_daily_series(store_id, &frame.records)?;

    if series.len() < settings.min_observations {
        return Err(PipelineError::TooFewObservations {
            store_id,
            observations: series.len(),
            required: settings.min_observations,
        });
    }

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        run_forecast(&series, &settings.forecast)
    }));
    match outcome {
        Ok(result) => Ok(result?),
        Err(payload) => Err(PipelineError::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
