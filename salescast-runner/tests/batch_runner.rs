//! Integration tests for the batch runner.
//!
//! Drives `BatchRunner` over synthetic stores with in-memory and file-backed
//! checkpoint/sink pairs. Tests: resume skips completed stores, failure
//! isolation, last-write-wins checkpoints, upsert without duplicates,
//! persistence failures and cancellation.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use chrono::NaiveDate;
use salescast_core::data::{CsvSalesSource, InMemorySource, LoadError, SalesSource};
use salescast_core::domain::{RawRecord, StateHoliday, StoreFrame, StoreId};
use salescast_core::forecast::ForecastResult;
use salescast_runner::{
    BatchError, BatchRunner, CheckpointRecord, CheckpointStatus, CheckpointStore,
    CsvForecastTable, FailureKind, ForecastSink, JsonlCheckpointLog, MemoryCheckpoint,
    MemoryForecastSink, PersistenceError, PipelineSettings, StoreOutcome, StoreSelection,
};

fn store_records(store_id: StoreId, days: usize, open: bool) -> Vec<RawRecord> {
    let start = NaiveDate::from_ymd_opt(2014, 1, 1).unwrap();
    (0..days)
        .map(|t| {
            let level = 3000.0 + 100.0 * store_id as f64 + 6.0 * t as f64;
            RawRecord {
                store_id,
                date: start + chrono::Duration::days(t as i64),
                sales: if open {
                    level + 150.0 * ((t % 7) as f64 - 3.0) / 3.0
                } else {
                    0.0
                },
                customers: if open { 300 } else { 0 },
                open,
                promo: t % 14 < 5,
                state_holiday: StateHoliday::None,
                school_holiday: false,
            }
        })
        .collect()
}

/// Stores 1 and 3 are healthy; store 2 never opens.
fn mixed_source() -> InMemorySource {
    InMemorySource::new()
        .with_records(store_records(1, 120, true))
        .with_records(store_records(2, 120, false))
        .with_records(store_records(3, 120, true))
}

/// Wraps a source and counts `load_store` calls per store.
struct CountingSource {
    inner: InMemorySource,
    loads: RefCell<BTreeMap<StoreId, usize>>,
}

impl CountingSource {
    fn new(inner: InMemorySource) -> Self {
        Self {
            inner,
            loads: RefCell::new(BTreeMap::new()),
        }
    }

    fn loads(&self, store_id: StoreId) -> usize {
        self.loads.borrow().get(&store_id).copied().unwrap_or(0)
    }
}

impl SalesSource for CountingSource {
    fn name(&self) -> &str {
        "counting"
    }

    fn store_ids(&self) -> Vec<StoreId> {
        self.inner.store_ids()
    }

    fn load_store(&self, store_id: StoreId) -> Result<StoreFrame, LoadError> {
        *self.loads.borrow_mut().entry(store_id).or_default() += 1;
        self.inner.load_store(store_id)
    }
}

/// Sink whose writes always fail.
struct BrokenSink;

impl ForecastSink for BrokenSink {
    fn write(&mut self, _result: &ForecastResult) -> Result<(), PersistenceError> {
        Err(PersistenceError::Io {
            path: PathBuf::from("/unwritable/forecasts.csv"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "read-only"),
        })
    }
}

/// Checkpoint store whose writes always fail.
#[derive(Default)]
struct BrokenCheckpoint;

impl CheckpointStore for BrokenCheckpoint {
    fn latest(&self, _store_id: StoreId) -> Result<Option<CheckpointRecord>, PersistenceError> {
        Ok(None)
    }

    fn record(
        &mut self,
        _store_id: StoreId,
        _status: CheckpointStatus,
        _error_metric: Option<f64>,
        _reason: Option<&str>,
    ) -> Result<(), PersistenceError> {
        Err(PersistenceError::Io {
            path: PathBuf::from("/unwritable/checkpoints.jsonl"),
            source: io::Error::new(io::ErrorKind::Other, "disk full"),
        })
    }

    fn snapshot(&self) -> Result<Vec<CheckpointRecord>, PersistenceError> {
        Ok(Vec::new())
    }
}

#[test]
fn failing_store_does_not_stop_the_batch() {
    let mut runner = BatchRunner::new(
        mixed_source(),
        MemoryCheckpoint::new(),
        MemoryForecastSink::new(),
        PipelineSettings::default(),
    );
    let report = runner.run(&StoreSelection::All, None, None).unwrap();

    assert_eq!(report.stores.len(), 3);
    assert_eq!(report.completed(), 2);
    assert_eq!(report.failed(), 1);
    assert!(!report.cancelled);

    match &report.stores[1].outcome {
        StoreOutcome::Failed { kind, reason } => {
            assert_eq!(*kind, FailureKind::InsufficientData);
            assert!(!reason.is_empty());
        }
        other => panic!("store 2 should fail, got {other:?}"),
    }

    let ckpt = runner.checkpoint();
    assert_eq!(ckpt.status(1).unwrap(), Some(CheckpointStatus::Completed));
    assert_eq!(ckpt.status(2).unwrap(), Some(CheckpointStatus::Failed));
    assert_eq!(ckpt.status(3).unwrap(), Some(CheckpointStatus::Completed));

    let completed = ckpt.latest(1).unwrap().unwrap();
    assert!(completed.error_metric.is_some_and(|m| m.is_finite() && m >= 0.0));
    assert!(ckpt.latest(2).unwrap().unwrap().reason.is_some());

    let stored: Vec<StoreId> = runner.sink().results().iter().map(|r| r.store_id).collect();
    assert_eq!(stored, vec![1, 3]);
}

fn train_csv(records: &[RawRecord]) -> String {
    let mut out = String::from("Store,Date,Sales,Customers,Open,Promo,StateHoliday,SchoolHoliday\n");
    for r in records {
        out.push_str(&format!(
            "{},{},{},{},{},{},{},{}\n",
            r.store_id,
            r.date,
            r.sales,
            r.customers,
            u8::from(r.open),
            u8::from(r.promo),
            r.state_holiday,
            u8::from(r.school_holiday),
        ));
    }
    out
}

#[test]
fn malformed_row_fails_only_its_store() {
    let mut records = store_records(1, 120, true);
    records.extend(store_records(2, 120, true));
    let mut csv = train_csv(&records);
    csv.push_str("7,31/07/2015,5000,400,1,0,0,0\n");

    let source = CsvSalesSource::from_readers(csv.as_bytes(), "Store\n".as_bytes()).unwrap();
    let mut runner = BatchRunner::new(
        source,
        MemoryCheckpoint::new(),
        MemoryForecastSink::new(),
        PipelineSettings::default(),
    );
    let report = runner.run(&StoreSelection::All, None, None).unwrap();

    assert_eq!(report.completed(), 2);
    assert_eq!(report.failed(), 1);
    assert!(matches!(
        report.stores[2].outcome,
        StoreOutcome::Failed {
            kind: FailureKind::Load,
            ..
        }
    ));
    assert_eq!(
        runner.checkpoint().status(7).unwrap(),
        Some(CheckpointStatus::Failed)
    );
}

#[test]
fn pending_precedes_terminal_status() {
    let mut runner = BatchRunner::new(
        mixed_source(),
        MemoryCheckpoint::new(),
        MemoryForecastSink::new(),
        PipelineSettings::default(),
    );
    runner
        .run(&StoreSelection::Single { store_id: 1 }, None, None)
        .unwrap();

    let statuses: Vec<CheckpointStatus> = runner
        .checkpoint()
        .history()
        .iter()
        .map(|r| r.status)
        .collect();
    assert_eq!(
        statuses,
        vec![CheckpointStatus::Pending, CheckpointStatus::Completed]
    );
}

#[test]
fn completed_stores_are_skipped_without_loading() {
    let mut checkpoint = MemoryCheckpoint::new();
    checkpoint
        .record(1, CheckpointStatus::Completed, Some(42.0), None)
        .unwrap();

    let mut runner = BatchRunner::new(
        CountingSource::new(mixed_source()),
        checkpoint,
        MemoryForecastSink::new(),
        PipelineSettings::default(),
    );
    let report = runner.run(&StoreSelection::All, None, None).unwrap();

    assert_eq!(report.skipped(), 1);
    assert_eq!(report.stores[0].outcome, StoreOutcome::Skipped);
    assert_eq!(runner.source().loads(1), 0);
    assert_eq!(runner.source().loads(3), 1);

    // The skipped store's checkpoint is untouched.
    let one = runner.checkpoint().latest(1).unwrap().unwrap();
    assert_eq!(one.error_metric, Some(42.0));
}

#[test]
fn failed_and_pending_stores_are_retried() {
    let mut checkpoint = MemoryCheckpoint::new();
    checkpoint
        .record(1, CheckpointStatus::Failed, None, Some("earlier crash"))
        .unwrap();
    checkpoint
        .record(3, CheckpointStatus::Pending, None, None)
        .unwrap();

    let mut runner = BatchRunner::new(
        CountingSource::new(mixed_source()),
        checkpoint,
        MemoryForecastSink::new(),
        PipelineSettings::default(),
    );
    runner.run(&StoreSelection::All, None, None).unwrap();

    assert_eq!(runner.source().loads(1), 1);
    assert_eq!(runner.source().loads(3), 1);
    assert_eq!(
        runner.checkpoint().status(1).unwrap(),
        Some(CheckpointStatus::Completed)
    );
}

#[test]
fn checkpoint_last_write_wins_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("checkpoints.jsonl");

    {
        let mut log = JsonlCheckpointLog::open(&path).unwrap();
        log.record(5, CheckpointStatus::Completed, Some(12.3), None)
            .unwrap();
        log.record(5, CheckpointStatus::Failed, None, Some("refit failed"))
            .unwrap();
        assert_eq!(log.status(5).unwrap(), Some(CheckpointStatus::Failed));
    }

    let log = JsonlCheckpointLog::open(&path).unwrap();
    let latest = log.latest(5).unwrap().unwrap();
    assert_eq!(latest.status, CheckpointStatus::Failed);
    assert_eq!(latest.error_metric, None);

    let lines = std::fs::read_to_string(&path).unwrap().lines().count();
    assert_eq!(lines, 2);
}

#[test]
fn resume_from_file_backends() {
    let dir = tempfile::tempdir().unwrap();
    let ckpt_path = dir.path().join("checkpoints.jsonl");

    {
        let mut runner = BatchRunner::new(
            mixed_source(),
            JsonlCheckpointLog::open(&ckpt_path).unwrap(),
            CsvForecastTable::open(dir.path(), false).unwrap(),
            PipelineSettings::default(),
        );
        let first = runner.run(&StoreSelection::All, None, None).unwrap();
        assert_eq!(first.completed(), 2);
    }

    let mut runner = BatchRunner::new(
        CountingSource::new(mixed_source()),
        JsonlCheckpointLog::open(&ckpt_path).unwrap(),
        CsvForecastTable::open(dir.path(), false).unwrap(),
        PipelineSettings::default(),
    );
    let second = runner.run(&StoreSelection::All, None, None).unwrap();

    assert_eq!(second.skipped(), 2);
    assert_eq!(second.failed(), 1);
    assert_eq!(runner.source().loads(1), 0);
    assert_eq!(runner.source().loads(2), 1);

    let table = runner.sink();
    assert_eq!(table.rows_for(1).len(), 30);
    assert_eq!(table.rows_for(3).len(), 30);
    assert!(table.rows_for(2).is_empty());
}

#[test]
fn rerunning_a_store_upserts_without_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let mut runner = BatchRunner::new(
        mixed_source(),
        MemoryCheckpoint::new(),
        CsvForecastTable::open(dir.path(), true).unwrap(),
        PipelineSettings::default(),
    );
    runner
        .run(&StoreSelection::Single { store_id: 1 }, None, None)
        .unwrap();
    let first = runner.sink().rows_for(1);

    // Force a rerun by overwriting the completed status.
    let (source, mut checkpoint, sink) = runner.into_parts();
    checkpoint
        .record(1, CheckpointStatus::Failed, None, Some("manual retry"))
        .unwrap();
    let mut runner = BatchRunner::new(source, checkpoint, sink, PipelineSettings::default());
    runner
        .run(&StoreSelection::Single { store_id: 1 }, None, None)
        .unwrap();

    let second = runner.sink().rows_for(1);
    assert_eq!(first.len(), 30);
    assert_eq!(second.len(), 30);
    assert_eq!(first, second);

    let csv = std::fs::read_to_string(runner.sink().table_path()).unwrap();
    assert_eq!(csv.lines().count(), 31);
    assert!(runner.sink().store_forecast_path(1).exists());
    assert!(runner.sink().store_evaluation_path(1).exists());
}

#[test]
fn sink_failure_is_recorded_as_persistence_failure() {
    let mut runner = BatchRunner::new(
        mixed_source(),
        MemoryCheckpoint::new(),
        BrokenSink,
        PipelineSettings::default(),
    );
    let report = runner
        .run(&StoreSelection::Single { store_id: 1 }, None, None)
        .unwrap();

    assert_eq!(report.persistence_failures(), 1);
    assert_eq!(
        runner.checkpoint().status(1).unwrap(),
        Some(CheckpointStatus::Failed)
    );
}

#[test]
fn checkpoint_failure_aborts_the_batch() {
    let mut runner = BatchRunner::new(
        mixed_source(),
        BrokenCheckpoint,
        MemoryForecastSink::new(),
        PipelineSettings::default(),
    );
    let err = runner.run(&StoreSelection::All, None, None).unwrap_err();
    assert!(matches!(err, BatchError::Persistence { store_id: 1, .. }));
    assert!(runner.sink().results().is_empty());
}

#[test]
fn unknown_single_store_is_a_load_failure() {
    let mut runner = BatchRunner::new(
        mixed_source(),
        MemoryCheckpoint::new(),
        MemoryForecastSink::new(),
        PipelineSettings::default(),
    );
    let report = runner
        .run(&StoreSelection::Single { store_id: 99 }, None, None)
        .unwrap();

    assert!(matches!(
        report.stores[0].outcome,
        StoreOutcome::Failed {
            kind: FailureKind::Load,
            ..
        }
    ));
    assert_eq!(
        runner.checkpoint().status(99).unwrap(),
        Some(CheckpointStatus::Failed)
    );
}

#[test]
fn range_selection_uses_sorted_positions() {
    let mut runner = BatchRunner::new(
        CountingSource::new(mixed_source()),
        MemoryCheckpoint::new(),
        MemoryForecastSink::new(),
        PipelineSettings::default(),
    );
    let report = runner
        .run(&StoreSelection::Range { from: 2, to: 3 }, None, None)
        .unwrap();

    let ids: Vec<StoreId> = report.stores.iter().map(|s| s.store_id).collect();
    assert_eq!(ids, vec![2, 3]);
    assert_eq!(runner.source().loads(1), 0);
}

#[test]
fn cancel_flag_stops_before_the_next_store() {
    let cancel = AtomicBool::new(true);
    let mut runner = BatchRunner::new(
        mixed_source(),
        MemoryCheckpoint::new(),
        MemoryForecastSink::new(),
        PipelineSettings::default(),
    );
    let report = runner
        .run(&StoreSelection::All, Some("run-1".into()), Some(&cancel))
        .unwrap();

    assert!(report.cancelled);
    assert!(report.stores.is_empty());
    assert_eq!(report.run_id.as_deref(), Some("run-1"));
    assert!(runner.checkpoint().history().is_empty());
}
