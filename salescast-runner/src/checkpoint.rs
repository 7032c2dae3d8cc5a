//! Per-store checkpoint log: JSONL append-only persistence, last write wins.
//!
//! Each status change is one JSON object per line. On open the whole log is
//! replayed into an index holding the newest row per store, so a store's
//! status is whatever was recorded last, including across process restarts.
//! Malformed lines (e.g. a torn final write) are skipped, and a torn final
//! line is newline-terminated on open so later appends start on a fresh line.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::persistence::{append_line, close_partial_line, PersistenceError};
use salescast_core::domain::StoreId;

/// Lifecycle state of one store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    /// Started but not finished; an interrupted run leaves this behind.
    Pending,
    Completed,
    Failed,
}

impl CheckpointStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// One row of the checkpoint log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub store_id: StoreId,
    pub status: CheckpointStatus,
    pub error_metric: Option<f64>,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Durable per-store status.
pub trait CheckpointStore {
    /// Most recent record for a store.
    fn latest(&self, store_id: StoreId) -> Result<Option<CheckpointRecord>, PersistenceError>;

    /// Append a status change. Must be durable before returning `Ok`.
    fn record(
        &mut self,
        store_id: StoreId,
        status: CheckpointStatus,
        error_metric: Option<f64>,
        reason: Option<&str>,
    ) -> Result<(), PersistenceError>;

    /// Most recent record of every store, ordered by store id.
    fn snapshot(&self) -> Result<Vec<CheckpointRecord>, PersistenceError>;

    fn status(&self, store_id: StoreId) -> Result<Option<CheckpointStatus>, PersistenceError> {
        Ok(self.latest(store_id)?.map(|r| r.status))
    }
}

fn new_record(
    store_id: StoreId,
    status: CheckpointStatus,
    error_metric: Option<f64>,
    reason: Option<&str>,
) -> CheckpointRecord {
    CheckpointRecord {
        store_id,
        status,
        error_metric,
        reason: reason.map(str::to_string),
        timestamp: Utc::now(),
    }
}

/// JSONL checkpoint file with an in-memory last-write-wins index.
#[derive(Debug)]
pub struct JsonlCheckpointLog {
    path: PathBuf,
    index: BTreeMap<StoreId, CheckpointRecord>,
}

impl JsonlCheckpointLog {
    /// Open (or lazily create) the log at `path` and replay it.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let path = path.into();
        let mut index = BTreeMap::new();

        if path.exists() {
            let file = fs::File::open(&path).map_err(|e| PersistenceError::io(&path, e))?;
            let reader = io::BufReader::new(file);
            let mut skipped = 0usize;

            for line in reader.lines() {
                let line = line.map_err(|e| PersistenceError::io(&path, e))?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<CheckpointRecord>(&line) {
                    Ok(record) => {
                        index.insert(record.store_id, record);
                    }
                    Err(_) => skipped += 1,
                }
            }
            if skipped > 0 {
                warn!(path = %path.display(), skipped, "skipped malformed checkpoint lines");
            }
            if close_partial_line(&path)? {
                warn!(path = %path.display(), "terminated torn final checkpoint line");
            }
        }

        Ok(Self { path, index })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of stores with at least one record.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

impl CheckpointStore for JsonlCheckpointLog {
    fn latest(&self, store_id: StoreId) -> Result<Option<CheckpointRecord>, PersistenceError> {
        Ok(self.index.get(&store_id).cloned())
    }

    fn record(
        &mut self,
        store_id: StoreId,
        status: CheckpointStatus,
        error_metric: Option<f64>,
        reason: Option<&str>,
    ) -> Result<(), PersistenceError> {
        let record = new_record(store_id, status, error_metric, reason);
        let json = serde_json::to_string(&record)?;
        append_line(&self.path, &json)?;
        self.index.insert(store_id, record);
        Ok(())
    }

    fn snapshot(&self) -> Result<Vec<CheckpointRecord>, PersistenceError> {
        Ok(self.index.values().cloned().collect())
    }
}

/// In-memory checkpoint for tests and dry runs. Keeps the full history.
#[derive(Debug, Default, Clone)]
pub struct MemoryCheckpoint {
    history: Vec<CheckpointRecord>,
}

impl MemoryCheckpoint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every recorded row, oldest first.
    pub fn history(&self) -> &[CheckpointRecord] {
        &self.history
    }
}

impl CheckpointStore for MemoryCheckpoint {
    fn latest(&self, store_id: StoreId) -> Result<Option<CheckpointRecord>, PersistenceError> {
        Ok(self
            .history
            .iter()
            .rev()
            .find(|r| r.store_id == store_id)
            .cloned())
    }

    fn record(
        &mut self,
        store_id: StoreId,
        status: CheckpointStatus,
        error_metric: Option<f64>,
        reason: Option<&str>,
    ) -> Result<(), PersistenceError> {
        self.history
            .push(new_record(store_id, status, error_metric, reason));
        Ok(())
    }

    fn snapshot(&self) -> Result<Vec<CheckpointRecord>, PersistenceError> {
        let mut latest: BTreeMap<StoreId, CheckpointRecord> = BTreeMap::new();
        for r in &self.history {
            latest.insert(r.store_id, r.clone());
        }
        Ok(latest.into_values().collect())
    }
}
