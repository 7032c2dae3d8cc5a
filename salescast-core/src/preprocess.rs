//! Raw store records -> gap-free daily series.
//!
//! Steps, in order:
//! 1. keep only days the store was open
//! 2. index by date (a duplicated date keeps its last record)
//! 3. reindex to one row per calendar day between the first and last open day
//! 4. forward-fill sales and the three covariates across reindexed gaps
//! 5. drop rows still missing a finite sales value (only a leading run can be)
//!
//! Closed days therefore never contribute their own values; they inherit the
//! previous trading day's.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use thiserror::Error;
use tracing::debug;

use crate::domain::{DailyObservation, DailySeries, RawRecord, StoreId};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PreprocessError {
    #[error("store {store_id}: insufficient data ({reason})")]
    InsufficientData { store_id: StoreId, reason: String },
}

/// Build the daily series for one store.
///
/// Fails with `InsufficientData` when the store has no open days, no finite
/// sales, or only zero sales (nothing to model in log space).
pub fn build_daily_series(
    store_id: StoreId,
    records: &[RawRecord],
) -> Result<DailySeries, PreprocessError> {
    let insufficient = |reason: &str| PreprocessError::InsufficientData {
        store_id,
        reason: reason.to_string(),
    };

    let by_date: BTreeMap<NaiveDate, &RawRecord> = records
        .iter()
        .filter(|r| r.open && r.store_id == store_id)
        .map(|r| (r.date, r))
        .collect();

    let (first, last) = match (by_date.keys().next(), by_date.keys().next_back()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return Err(insufficient("no open trading days")),
    };

    let mut observations = Vec::with_capacity(by_date.len());
    let mut carried: Option<DailyObservation> = None;
    let mut filled = 0usize;
    let mut dropped = 0usize;

    for date in first.iter_days().take_while(|d| *d <= last) {
        let observed = by_date.get(&date).map(|r| DailyObservation {
            date,
            sales: r.sales,
            promo: r.promo,
            state_holiday: r.state_holiday.clone(),
            school_holiday: r.school_holiday,
        });

        let row = match (observed, &carried) {
            (Some(obs), _) if obs.sales.is_finite() => Some(obs),
            // Present but with a non-finite target: covariates are real, sales carried.
            (Some(obs), Some(prev)) => {
                filled += 1;
                Some(DailyObservation {
                    sales: prev.sales,
                    ..obs
                })
            }
            (None, Some(prev)) => {
                filled += 1;
                Some(DailyObservation {
                    date,
                    ..prev.clone()
                })
            }
            (_, None) => None,
        };

        match row {
            Some(obs) => {
                carried = Some(obs.clone());
                observations.push(obs);
            }
            None => dropped += 1,
        }
    }

    if observations.is_empty() {
        return Err(insufficient("no finite sales after forward fill"));
    }
    if observations.iter().all(|o| o.sales <= 0.0) {
        return Err(insufficient("all sales are zero"));
    }

    debug!(
        store_id,
        days = observations.len(),
        filled,
        dropped,
        "daily series built"
    );

    Ok(DailySeries::new(store_id, observations))
}
