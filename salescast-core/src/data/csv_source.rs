//! CSV-backed sales source.
//!
//! Reads a transactions export (`train.csv`) and a store attribute export
//! (`store.csv`), groups transactions by store and left-joins attributes.
//! Missing fields take the same defaults the inventory application used
//! when importing these files:
//! - empty Sales/Customers -> 0, empty Open -> open, empty Promo/SchoolHoliday -> 0
//! - missing attribute numbers -> 0, missing type/assortment -> `NA`
//! - Promo2 values other than 0/1 -> 0
//!
//! A malformed transaction row only poisons its own store: the store stays
//! listed and `load_store` reports the first bad row. Rows whose store id
//! cannot be read at all still fail the whole source.

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::Path;

use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::source::{LoadError, SalesSource};
use crate::domain::{RawRecord, StateHoliday, StoreAttributes, StoreFrame, StoreId};

const TRAIN_FILE: &str = "train.csv";
const STORE_FILE: &str = "store.csv";

#[derive(Debug, Deserialize)]
struct TransactionRow {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Sales", default)]
    sales: Option<f64>,
    #[serde(rename = "Customers", default)]
    customers: Option<f64>,
    #[serde(rename = "Open", default)]
    open: Option<f64>,
    #[serde(rename = "Promo", default)]
    promo: Option<f64>,
    #[serde(rename = "StateHoliday", default)]
    state_holiday: Option<String>,
    #[serde(rename = "SchoolHoliday", default)]
    school_holiday: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct StoreRow {
    #[serde(rename = "Store")]
    store: String,
    #[serde(rename = "StoreType", default)]
    store_type: Option<String>,
    #[serde(rename = "Assortment", default)]
    assortment: Option<String>,
    #[serde(rename = "CompetitionDistance", default)]
    competition_distance: Option<f64>,
    #[serde(rename = "CompetitionOpenSinceMonth", default)]
    competition_open_since_month: Option<f64>,
    #[serde(rename = "CompetitionOpenSinceYear", default)]
    competition_open_since_year: Option<f64>,
    #[serde(rename = "Promo2", default)]
    promo2: Option<f64>,
    #[serde(rename = "Promo2SinceWeek", default)]
    promo2_since_week: Option<f64>,
    #[serde(rename = "Promo2SinceYear", default)]
    promo2_since_year: Option<f64>,
    #[serde(rename = "PromoInterval", default)]
    promo_interval: Option<String>,
}

/// Sales source over the two CSV exports, fully indexed at open.
#[derive(Debug)]
pub struct CsvSalesSource {
    records: BTreeMap<StoreId, Vec<RawRecord>>,
    attributes: BTreeMap<StoreId, StoreAttributes>,
    faults: BTreeMap<StoreId, RowFault>,
}

/// First malformed transaction row seen for a store.
#[derive(Debug, Clone)]
struct RowFault {
    line: usize,
    reason: String,
}

impl CsvSalesSource {
    /// Open both files from disk.
    pub fn open(train_csv: &Path, store_csv: &Path) -> Result<Self, LoadError> {
        let train = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(train_csv)
            .map_err(|source| LoadError::Open {
                path: train_csv.to_path_buf(),
                source,
            })?;
        let store = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(store_csv)
            .map_err(|source| LoadError::Open {
                path: store_csv.to_path_buf(),
                source,
            })?;

        let source = Self::from_csv_readers(train, store)?;
        info!(
            train = %train_csv.display(),
            stores = source.records.len(),
            "sales source indexed"
        );
        Ok(source)
    }

    /// Build from any pair of readers (used by tests and stdin pipelines).
    pub fn from_readers<R: io::Read>(train: R, store: R) -> Result<Self, LoadError> {
        let train = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(train);
        let store = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(store);
        Self::from_csv_readers(train, store)
    }

    fn from_csv_readers<R: io::Read>(
        mut train: csv::Reader<R>,
        mut store: csv::Reader<R>,
    ) -> Result<Self, LoadError> {
        let headers = train.headers()?.clone();
        let store_col = headers.iter().position(|h| h == "Store");

        let mut records: BTreeMap<StoreId, Vec<RawRecord>> = BTreeMap::new();
        let mut faults: BTreeMap<StoreId, RowFault> = BTreeMap::new();
        for (i, raw) in train.records().enumerate() {
            let raw = raw?;
            let line = i + 2;
            let store_field = store_col.and_then(|c| raw.get(c)).unwrap_or("");
            let store_id = parse_store_id(store_field, TRAIN_FILE, line)?;
            if faults.contains_key(&store_id) {
                continue;
            }

            let parsed = raw
                .deserialize::<TransactionRow>(Some(&headers))
                .map_err(|e| e.to_string())
                .and_then(|row| parse_transaction(row, store_id));
            match parsed {
                Ok(record) => records.entry(store_id).or_default().push(record),
                Err(reason) => {
                    warn!(store_id, line, %reason, "malformed transaction row, store excluded");
                    records.remove(&store_id);
                    faults.insert(store_id, RowFault { line, reason });
                }
            }
        }

        let mut attributes = BTreeMap::new();
        for (i, row) in store.deserialize::<StoreRow>().enumerate() {
            let line = i + 2;
            let attrs = parse_store(row?, line)?;
            attributes.insert(attrs.store_id, attrs);
        }

        let orphans = attributes
            .keys()
            .filter(|id| !records.contains_key(id) && !faults.contains_key(id))
            .count();
        if orphans > 0 {
            debug!(orphans, "stores with attributes but no transactions");
        }

        Ok(Self {
            records,
            attributes,
            faults,
        })
    }

    /// Number of transaction rows across all stores.
    pub fn record_count(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }

    pub fn attributes(&self, store_id: StoreId) -> Option<&StoreAttributes> {
        self.attributes.get(&store_id)
    }
}

impl SalesSource for CsvSalesSource {
    fn name(&self) -> &str {
        "csv"
    }

    fn store_ids(&self) -> Vec<StoreId> {
        let ids: BTreeSet<StoreId> = self
            .records
            .keys()
            .chain(self.faults.keys())
            .copied()
            .collect();
        ids.into_iter().collect()
    }

    fn all_store_ids(&self) -> Vec<StoreId> {
        let mut ids: BTreeSet<StoreId> = self.store_ids().into_iter().collect();
        ids.extend(self.attributes.keys().copied());
        ids.into_iter().collect()
    }

    fn load_store(&self, store_id: StoreId) -> Result<StoreFrame, LoadError> {
        if let Some(fault) = self.faults.get(&store_id) {
            return Err(LoadError::Malformed {
                file: TRAIN_FILE.into(),
                line: fault.line,
                reason: fault.reason.clone(),
            });
        }
        let attributes = self.attributes.get(&store_id).cloned();
        let records = match self.records.get(&store_id) {
            Some(records) => records.clone(),
            None if attributes.is_some() => Vec::new(),
            None => return Err(LoadError::UnknownStore(store_id)),
        };
        Ok(StoreFrame {
            store_id,
            records,
            attributes,
        })
    }
}

fn parse_store_id(raw: &str, file: &str, line: usize) -> Result<StoreId, LoadError> {
    raw.parse::<StoreId>().map_err(|e| LoadError::Malformed {
        file: file.into(),
        line,
        reason: format!("store id '{raw}': {e}"),
    })
}

fn flag(value: Option<f64>, default: bool) -> bool {
    value.map_or(default, |v| v != 0.0)
}

fn count(value: Option<f64>) -> u32 {
    value
        .filter(|v| v.is_finite() && *v > 0.0)
        .map_or(0, |v| v.round() as u32)
}

fn parse_transaction(row: TransactionRow, store_id: StoreId) -> Result<RawRecord, String> {
    let date = NaiveDate::parse_from_str(&row.date, "%Y-%m-%d")
        .map_err(|e| format!("date '{}': {e}", row.date))?;

    let sales = row.sales.unwrap_or(0.0);
    if sales < 0.0 {
        return Err(format!("negative sales {sales}"));
    }

    Ok(RawRecord {
        store_id,
        date,
        sales,
        customers: count(row.customers),
        open: flag(row.open, true),
        promo: flag(row.promo, false),
        state_holiday: StateHoliday::parse(row.state_holiday.as_deref().unwrap_or("")),
        school_holiday: flag(row.school_holiday, false),
    })
}

fn parse_store(row: StoreRow, line: usize) -> Result<StoreAttributes, LoadError> {
    let store_id = parse_store_id(&row.store, STORE_FILE, line)?;
    let text = |v: Option<String>| v.filter(|s| !s.is_empty()).unwrap_or_else(|| "NA".into());

    Ok(StoreAttributes {
        store_id,
        store_type: text(row.store_type),
        assortment: text(row.assortment),
        competition_distance: count(row.competition_distance),
        competition_open_since_month: count(row.competition_open_since_month),
        competition_open_since_year: count(row.competition_open_since_year),
        promo2: row.promo2 == Some(1.0),
        promo2_since_week: count(row.promo2_since_week),
        promo2_since_year: count(row.promo2_since_year),
        promo_interval: text(row.promo_interval),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRAIN: &str = "\
Store,DayOfWeek,Date,Sales,Customers,Open,Promo,StateHoliday,SchoolHoliday
1,5,2015-07-31,5263,555,1,1,0,1
1,4,2015-07-30,5020,546,1,1,0,1
2,5,2015-07-31,6064,625,1,1,a,1
2,4,2015-07-30,,,,,,
";

    const STORE: &str = "\
Store,StoreType,Assortment,CompetitionDistance,CompetitionOpenSinceMonth,CompetitionOpenSinceYear,Promo2,Promo2SinceWeek,Promo2SinceYear,PromoInterval
1,c,a,1270,9,2008,0,,,
3,a,c,,,,3,,,
";

    fn source() -> CsvSalesSource {
        CsvSalesSource::from_readers(TRAIN.as_bytes(), STORE.as_bytes()).unwrap()
    }

    #[test]
    fn groups_transactions_by_store() {
        let src = source();
        assert_eq!(src.store_ids(), vec![1, 2]);
        assert_eq!(src.record_count(), 4);
        let frame = src.load_store(1).unwrap();
        assert_eq!(frame.records.len(), 2);
        assert_eq!(frame.attributes.unwrap().competition_distance, 1270);
    }

    #[test]
    fn empty_fields_take_import_defaults() {
        let frame = source().load_store(2).unwrap();
        let blank = &frame.records[1];
        assert_eq!(blank.sales, 0.0);
        assert_eq!(blank.customers, 0);
        assert!(blank.open);
        assert!(!blank.promo);
        assert!(!blank.school_holiday);
        assert_eq!(blank.state_holiday, StateHoliday::None);
        assert_eq!(frame.records[0].state_holiday, StateHoliday::A);
    }

    #[test]
    fn store_without_attributes_is_left_joined() {
        let frame = source().load_store(2).unwrap();
        assert!(frame.attributes.is_none());
    }

    #[test]
    fn attribute_defaults() {
        let src = source();
        let attrs = src.attributes(3).unwrap();
        assert_eq!(attrs.competition_distance, 0);
        assert!(!attrs.promo2, "promo2 outside 0/1 maps to false");
        assert_eq!(attrs.promo_interval, "NA");
    }

    #[test]
    fn bad_date_reports_line_for_that_store_only() {
        let train = "Store,Date,Sales\n1,2015-07-31,10\n7,31/07/2015,10\n2,2015-07-31,12\n7,2015-07-30,9\n";
        let src = CsvSalesSource::from_readers(train.as_bytes(), "Store\n".as_bytes()).unwrap();

        assert_eq!(src.store_ids(), vec![1, 2, 7]);
        assert_eq!(src.load_store(1).unwrap().records.len(), 1);
        assert_eq!(src.load_store(2).unwrap().records.len(), 1);
        match src.load_store(7).unwrap_err() {
            LoadError::Malformed { line, file, reason } => {
                assert_eq!(line, 3);
                assert_eq!(file, "train.csv");
                assert!(reason.contains("31/07/2015"));
            }
            other => panic!("expected Malformed, got {other:?}"),
        }
    }

    #[test]
    fn store_records_before_a_bad_row_are_dropped() {
        let train = "Store,Date,Sales\n4,2015-07-30,10\n4,2015-07-31,-4\n";
        let src = CsvSalesSource::from_readers(train.as_bytes(), "Store\n".as_bytes()).unwrap();
        assert_eq!(src.record_count(), 0);
        assert!(matches!(
            src.load_store(4),
            Err(LoadError::Malformed { line: 3, .. })
        ));
    }

    #[test]
    fn undecodable_field_is_isolated() {
        let train = "Store,Date,Sales\n1,2015-07-31,lots\n2,2015-07-31,5\n";
        let src = CsvSalesSource::from_readers(train.as_bytes(), "Store\n".as_bytes()).unwrap();
        assert!(src.load_store(1).is_err());
        assert!(src.load_store(2).is_ok());
    }

    #[test]
    fn unreadable_store_id_is_fatal() {
        let train = "Store,Date,Sales\n1,2015-07-31,10\nx,2015-07-31,10\n";
        let err = CsvSalesSource::from_readers(train.as_bytes(), "Store\n".as_bytes())
            .unwrap_err();
        assert!(matches!(err, LoadError::Malformed { line: 3, .. }));
    }

    #[test]
    fn attribute_only_stores_are_listed_separately() {
        let src = source();
        assert_eq!(src.all_store_ids(), vec![1, 2, 3]);
        let frame = src.load_store(3).unwrap();
        assert!(frame.records.is_empty());
        assert_eq!(frame.attributes.unwrap().store_type, "a");
        assert!(matches!(src.load_store(9), Err(LoadError::UnknownStore(9))));
    }

    #[test]
    fn open_missing_file_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.csv");
        let err = CsvSalesSource::open(&missing, &missing).unwrap_err();
        assert!(err.to_string().contains("nope.csv"));
    }
}
