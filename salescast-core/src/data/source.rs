//! Sales source trait and structured load errors.
//!
//! The `SalesSource` trait abstracts over where per-store records come from
//! (CSV export, in-memory fixtures) so the batch runner can be driven by a
//! mock in tests.

use std::collections::BTreeMap;
use std::path::PathBuf;

use thiserror::Error;

use crate::domain::{RawRecord, StoreAttributes, StoreFrame, StoreId};

/// Errors from reading source records.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("malformed row at {file}:{line}: {reason}")]
    Malformed {
        file: String,
        line: usize,
        reason: String,
    },

    #[error("store {0} not present in the source")]
    UnknownStore(StoreId),
}

/// A read-only source of per-store transaction records.
pub trait SalesSource {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Store ids that have transaction data, ascending.
    fn store_ids(&self) -> Vec<StoreId>;

    /// Every store id the source knows about, including stores that only
    /// have attributes, ascending.
    fn all_store_ids(&self) -> Vec<StoreId> {
        self.store_ids()
    }

    /// Load the joined frame for a single store.
    fn load_store(&self, store_id: StoreId) -> Result<StoreFrame, LoadError>;
}

/// Source backed by records already in memory.
#[derive(Debug, Default, Clone)]
pub struct InMemorySource {
    records: BTreeMap<StoreId, Vec<RawRecord>>,
    attributes: BTreeMap<StoreId, StoreAttributes>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add records; they are grouped by their own `store_id`.
    pub fn with_records(mut self, records: impl IntoIterator<Item = RawRecord>) -> Self {
        for record in records {
            self.records.entry(record.store_id).or_default().push(record);
        }
        self
    }

    pub fn with_attributes(mut self, attributes: StoreAttributes) -> Self {
        self.records.entry(attributes.store_id).or_default();
        self.attributes.insert(attributes.store_id, attributes);
        self
    }
}

impl SalesSource for InMemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    fn store_ids(&self) -> Vec<StoreId> {
        self.records.keys().copied().collect()
    }

    fn load_store(&self, store_id: StoreId) -> Result<StoreFrame, LoadError> {
        let records = self
            .records
            .get(&store_id)
            .ok_or(LoadError::UnknownStore(store_id))?;
        Ok(StoreFrame {
            store_id,
            records: records.clone(),
            attributes: self.attributes.get(&store_id).cloned(),
        })
    }
}
