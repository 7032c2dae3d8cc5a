//! Batch runner: checkpointed, failure-isolated forecasting over many stores.
//!
//! Per store: `not_started -> pending -> {completed, failed}`.
//! - Completed stores are skipped without touching the sales source
//! - Any load, preprocess, fit or forecast error marks the store failed and
//!   the batch moves on
//! - A forecast-write error is recorded as a failed store of kind
//!   `Persistence`; a checkpoint-write error aborts the batch
//!
//! Stores run sequentially; the only shared state is the checkpoint store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::checkpoint::{CheckpointStatus, CheckpointStore};
use crate::config::RunId;
use crate::forecast_sink::ForecastSink;
use crate::persistence::PersistenceError;
use crate::pipeline::{self, FailureKind, PipelineError, PipelineSettings};
use salescast_core::data::SalesSource;
use salescast_core::domain::StoreId;
use salescast_core::forecast::ForecastResult;
use salescast_core::model::ArimaOrder;

/// Which stores a batch covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreSelection {
    All,
    Single { store_id: StoreId },
    /// 1-based inclusive positions over the source's ascending store ids.
    Range { from: usize, to: usize },
}

impl StoreSelection {
    /// Resolve against the ids a source offers (ascending).
    ///
    /// A single id is kept even when the source lacks it, so the miss is
    /// recorded as a load failure rather than silently dropped.
    pub fn resolve(&self, available: &[StoreId]) -> Vec<StoreId> {
        match self {
            Self::All => available.to_vec(),
            Self::Single { store_id } => vec![*store_id],
            Self::Range { from, to } => {
                let start = from.saturating_sub(1);
                let end = (*to).min(available.len());
                if start >= end {
                    Vec::new()
                } else {
                    available[start..end].to_vec()
                }
            }
        }
    }
}

/// What a completed store produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSummary {
    pub order: ArimaOrder,
    pub error_metric: f64,
    pub horizon: usize,
    pub models_evaluated: usize,
}

impl From<&ForecastResult> for ForecastSummary {
    fn from(result: &ForecastResult) -> Self {
        Self {
            order: result.order_used,
            error_metric: result.error_metric(),
            horizon: result.future.len(),
            models_evaluated: result.models_evaluated,
        }
    }
}

/// Result of one store within a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StoreOutcome {
    Skipped,
    Completed(ForecastSummary),
    Failed { kind: FailureKind, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreReport {
    pub store_id: StoreId,
    #[serde(flatten)]
    pub outcome: StoreOutcome,
    pub duration_ms: u64,
}

/// Aggregate of one invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub run_id: Option<RunId>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stores: Vec<StoreReport>,
    /// True when a cancel flag stopped the batch before the selection ended.
    pub cancelled: bool,
}

impl BatchReport {
    pub fn completed(&self) -> usize {
        self.count(|o| matches!(o, StoreOutcome::Completed(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, StoreOutcome::Failed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, StoreOutcome::Skipped))
    }

    /// Stores whose forecast could not be persisted.
    pub fn persistence_failures(&self) -> usize {
        self.count(|o| {
            matches!(
                o,
                StoreOutcome::Failed {
                    kind: FailureKind::Persistence,
                    ..
                }
            )
        })
    }

    fn count(&self, pred: impl Fn(&StoreOutcome) -> bool) -> usize {
        self.stores.iter().filter(|s| pred(&s.outcome)).count()
    }
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("checkpoint write failed for store {store_id}: {source}")]
    Persistence {
        store_id: StoreId,
        #[source]
        source: PersistenceError,
    },
}

/// Drives the pipeline over a store selection.
pub struct BatchRunner<S, C, F> {
    source: S,
    checkpoint: C,
    sink: F,
    settings: PipelineSettings,
}

impl<S, C, F> BatchRunner<S, C, F>
where
    S: SalesSource,
    C: CheckpointStore,
    F: ForecastSink,
{
    pub fn new(source: S, checkpoint: C, sink: F, settings: PipelineSettings) -> Self {
        Self {
            source,
            checkpoint,
            sink,
            settings,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn checkpoint(&self) -> &C {
        &self.checkpoint
    }

    pub fn sink(&self) -> &F {
        &self.sink
    }

    pub fn into_parts(self) -> (S, C, F) {
        (self.source, self.checkpoint, self.sink)
    }

    /// Run every selected store. Checked for cancellation between stores.
    pub fn run(
        &mut self,
        selection: &StoreSelection,
        run_id: Option<RunId>,
        cancel: Option<&AtomicBool>,
    ) -> Result<BatchReport, BatchError> {
        let started_at = Utc::now();
        let store_ids = selection.resolve(&self.source.store_ids());
        info!(
            source = self.source.name(),
            stores = store_ids.len(),
            "batch started"
        );

        let mut stores = Vec::with_capacity(store_ids.len());
        let mut cancelled = false;
        for store_id in store_ids {
            if cancel.is_some_and(|f| f.load(Ordering::Relaxed)) {
                info!("batch cancelled");
                cancelled = true;
                break;
            }
            stores.push(self.run_store(store_id)?);
        }

        let report = BatchReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            stores,
            cancelled,
        };
        info!(
            completed = report.completed(),
            failed = report.failed(),
            skipped = report.skipped(),
            "batch finished"
        );
        Ok(report)
    }

    /// Run one store inside the failure boundary.
    pub fn run_store(&mut self, store_id: StoreId) -> Result<StoreReport, BatchError> {
        let started = Instant::now();
        let ckpt_err = |source| BatchError::Persistence { store_id, source };

        if self.checkpoint.status(store_id).map_err(ckpt_err)? == Some(CheckpointStatus::Completed) {
            debug!(store_id, "already completed, skipping");
            return Ok(StoreReport {
                store_id,
                outcome: StoreOutcome::Skipped,
                duration_ms: 0,
            });
        }

        self.checkpoint
            .record(store_id, CheckpointStatus::Pending, None, None)
            .map_err(ckpt_err)?;
        info!(store_id, "store started");

        let outcome = match self.forecast_and_persist(store_id) {
            Ok(summary) => {
                self.checkpoint
                    .record(
                        store_id,
                        CheckpointStatus::Completed,
                        Some(summary.error_metric),
                        None,
                    )
                    .map_err(ckpt_err)?;
                info!(
                    store_id,
                    order = %summary.order,
                    rmse = summary.error_metric,
                    "store completed"
                );
                StoreOutcome::Completed(summary)
            }
            Err(e) => {
                let reason = e.to_string();
                warn!(store_id, kind = ?e.kind(), error = %reason, "store failed");
                self.checkpoint
                    .record(store_id, CheckpointStatus::Failed, None, Some(&reason))
                    .map_err(ckpt_err)?;
                StoreOutcome::Failed {
                    kind: e.kind(),
                    reason,
                }
            }
        };

        Ok(StoreReport {
            store_id,
            outcome,
            duration_ms: duration_ms(started.elapsed()),
        })
    }

    fn forecast_and_persist(&mut self, store_id: StoreId) -> Result<ForecastSummary, PipelineError> {
        let result = pipeline::run_store(&self.source, store_id, &self.settings)?;
        self.sink.write(&result)?;
        Ok(ForecastSummary::from(&result))
    }
}

/// Whole milliseconds, saturating at `u64::MAX`.
fn duration_ms(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_resolution() {
        let ids = [1, 2, 5, 9, 12];
        assert_eq!(StoreSelection::All.resolve(&ids), ids.to_vec());
        assert_eq!(StoreSelection::Single { store_id: 77 }.resolve(&ids), vec![77]);
        assert_eq!(
            StoreSelection::Range { from: 2, to: 4 }.resolve(&ids),
            vec![2, 5, 9]
        );
        assert_eq!(
            StoreSelection::Range { from: 4, to: 100 }.resolve(&ids),
            vec![9, 12]
        );
        assert!(StoreSelection::Range { from: 6, to: 8 }.resolve(&ids).is_empty());
        assert!(StoreSelection::Range { from: 3, to: 2 }.resolve(&ids).is_empty());
        assert_eq!(StoreSelection::Range { from: 0, to: 1 }.resolve(&ids), vec![1]);
    }

    #[test]
    fn duration_saturates() {
        assert_eq!(duration_ms(Duration::from_micros(2_500)), 2);
        assert_eq!(duration_ms(Duration::MAX), u64::MAX);
    }

    #[test]
    fn outcome_serializes_tagged() {
        let report = StoreReport {
            store_id: 3,
            outcome: StoreOutcome::Failed {
                kind: FailureKind::InsufficientData,
                reason: "closed".into(),
            },
            duration_ms: 4,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["outcome"], "failed");
        assert_eq!(json["kind"], "insufficient_data");
        assert_eq!(json["store_id"], 3);

        let skipped = serde_json::to_value(StoreReport {
            store_id: 1,
            outcome: StoreOutcome::Skipped,
            duration_ms: 0,
        })
        .unwrap();
        assert_eq!(skipped["outcome"], "skipped");
    }
}
