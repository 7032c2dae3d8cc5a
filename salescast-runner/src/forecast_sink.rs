//! Forecast persistence.
//!
//! `CsvForecastTable` keeps every store's future forecast in one
//! `forecasts.csv` keyed by (store_id, date). Writing a store upserts its
//! rows and rewrites the table atomically. Optional per-store exports:
//! - `store_{id}_forecast.csv`: `date,forecasted_sales`
//! - `store_{id}_evaluation.csv`: `date,actual,predicted` over the held-out days

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::persistence::{write_atomic, PersistenceError};
use salescast_core::domain::StoreId;
use salescast_core::forecast::ForecastResult;

/// Destination for completed store forecasts.
pub trait ForecastSink {
    /// Persist one store's result. Must be durable before returning `Ok`.
    fn write(&mut self, result: &ForecastResult) -> Result<(), PersistenceError>;
}

/// One row of the forecast table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRow {
    pub store_id: StoreId,
    pub date: NaiveDate,
    pub forecasted_sales: f64,
}

#[derive(Debug, Serialize)]
struct FutureExportRow {
    date: NaiveDate,
    forecasted_sales: f64,
}

#[derive(Debug, Serialize)]
struct EvaluationExportRow {
    date: NaiveDate,
    actual: f64,
    predicted: f64,
}

/// CSV forecast table with upsert semantics.
#[derive(Debug)]
pub struct CsvForecastTable {
    dir: PathBuf,
    export_per_store: bool,
    rows: BTreeMap<(StoreId, NaiveDate), f64>,
}

impl CsvForecastTable {
    pub const TABLE_FILE: &'static str = "forecasts.csv";

    /// Open the table in `dir`, loading any existing rows.
    pub fn open(dir: impl Into<PathBuf>, export_per_store: bool) -> Result<Self, PersistenceError> {
        let dir = dir.into();
        let table_path = dir.join(Self::TABLE_FILE);
        let mut rows = BTreeMap::new();

        if table_path.exists() {
            let mut reader =
                csv::Reader::from_path(&table_path).map_err(|e| PersistenceError::csv(&table_path, e))?;
            for row in reader.deserialize::<ForecastRow>() {
                let row = row.map_err(|e| PersistenceError::csv(&table_path, e))?;
                rows.insert((row.store_id, row.date), row.forecasted_sales);
            }
        }

        Ok(Self {
            dir,
            export_per_store,
            rows,
        })
    }

    pub fn table_path(&self) -> PathBuf {
        self.dir.join(Self::TABLE_FILE)
    }

    pub fn store_forecast_path(&self, store_id: StoreId) -> PathBuf {
        self.dir.join(format!("store_{store_id}_forecast.csv"))
    }

    pub fn store_evaluation_path(&self, store_id: StoreId) -> PathBuf {
        self.dir.join(format!("store_{store_id}_evaluation.csv"))
    }

    /// All rows, ordered by (store_id, date).
    pub fn rows(&self) -> Vec<ForecastRow> {
        self.rows
            .iter()
            .map(|(&(store_id, date), &forecasted_sales)| ForecastRow {
                store_id,
                date,
                forecasted_sales,
            })
            .collect()
    }

    pub fn rows_for(&self, store_id: StoreId) -> Vec<ForecastRow> {
        self.rows()
            .into_iter()
            .filter(|r| r.store_id == store_id)
            .collect()
    }

    fn flush_table(&self) -> Result<(), PersistenceError> {
        let path = self.table_path();
        let bytes = to_csv_bytes(&path, self.rows())?;
        write_atomic(&path, &bytes)
    }

    fn export_store(&self, result: &ForecastResult) -> Result<(), PersistenceError> {
        let future_path = self.store_forecast_path(result.store_id);
        let future = result.future.iter().map(|p| FutureExportRow {
            date: p.date,
            forecasted_sales: p.value,
        });
        write_atomic(&future_path, &to_csv_bytes(&future_path, future)?)?;

        let eval_path = self.store_evaluation_path(result.store_id);
        let eval = result.evaluation.points.iter().map(|p| EvaluationExportRow {
            date: p.date,
            actual: p.actual,
            predicted: p.predicted,
        });
        write_atomic(&eval_path, &to_csv_bytes(&eval_path, eval)?)
    }
}

impl ForecastSink for CsvForecastTable {
    fn write(&mut self, result: &ForecastResult) -> Result<(), PersistenceError> {
        let previous = self.rows.clone();
        for point in &result.future {
            self.rows.insert((result.store_id, point.date), point.value);
        }
        if let Err(e) = self.flush_table() {
            self.rows = previous;
            return Err(e);
        }
        if self.export_per_store {
            self.export_store(result)?;
        }
        debug!(
            store_id = result.store_id,
            rows = result.future.len(),
            "forecast persisted"
        );
        Ok(())
    }
}

fn to_csv_bytes<T: Serialize>(
    path: &Path,
    rows: impl IntoIterator<Item = T>,
) -> Result<Vec<u8>, PersistenceError> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    for row in rows {
        wtr.serialize(row).map_err(|e| PersistenceError::csv(path, e))?;
    }
    wtr.into_inner()
        .map_err(|e| PersistenceError::io(path, e.into_error()))
}

/// In-memory sink for tests and dry runs.
#[derive(Debug, Default, Clone)]
pub struct MemoryForecastSink {
    results: Vec<ForecastResult>,
}

impl MemoryForecastSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn results(&self) -> &[ForecastResult] {
        &self.results
    }
}

impl ForecastSink for MemoryForecastSink {
    fn write(&mut self, result: &ForecastResult) -> Result<(), PersistenceError> {
        self.results.push(result.clone());
        Ok(())
    }
}
