//! SalesCast Runner: batch orchestration over the forecasting core.
//!
//! This crate builds on `salescast-core` to provide:
//! - TOML batch configuration with a stable run id
//! - JSONL checkpoint log (last write wins, resumable)
//! - Forecast table persistence with upsert semantics
//! - Single-store pipeline with per-store failure isolation
//! - Batch runner that skips completed stores
//! - Initial inventory estimation

pub mod batch;
pub mod checkpoint;
pub mod config;
pub mod forecast_sink;
pub mod inventory;
pub mod persistence;
pub mod pipeline;

pub use batch::{
    BatchError, BatchReport, BatchRunner, ForecastSummary, StoreOutcome, StoreReport,
    StoreSelection,
};
pub use checkpoint::{
    CheckpointRecord, CheckpointStatus, CheckpointStore, JsonlCheckpointLog, MemoryCheckpoint,
};
pub use config::{BatchConfig, ConfigError, OutputConfig, RunId, SourceConfig};
pub use forecast_sink::{CsvForecastTable, ForecastRow, ForecastSink, MemoryForecastSink};
pub use inventory::{estimate_all, estimate_store, CategorySplit, InventoryEstimate, StockBasis};
pub use persistence::{write_atomic, PersistenceError};
pub use pipeline::{run_store, FailureKind, PipelineError, PipelineSettings};
