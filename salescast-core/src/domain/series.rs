//! Gap-free daily series and its positional train/test split.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{StateHoliday, StoreId};

/// One calendar day of a store's daily series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyObservation {
    pub date: NaiveDate,
    pub sales: f64,
    pub promo: bool,
    pub state_holiday: StateHoliday,
    pub school_holiday: bool,
}

/// A store's sales on a contiguous daily calendar.
///
/// Invariant: dates are strictly increasing by exactly one day, so every
/// calendar day between `first_date()` and `last_date()` is present once.
/// Only the preprocessor builds these.
#[derive(Debug, Clone, PartialEq)]
pub struct DailySeries {
    store_id: StoreId,
    observations: Vec<DailyObservation>,
}

impl DailySeries {
    pub(crate) fn new(store_id: StoreId, observations: Vec<DailyObservation>) -> Self {
        debug_assert!(is_contiguous(&observations));
        Self {
            store_id,
            observations,
        }
    }

    pub fn store_id(&self) -> StoreId {
        self.store_id
    }

    pub fn observations(&self) -> &[DailyObservation] {
        &self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.observations.first().map(|o| o.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.observations.last().map(|o| o.date)
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.observations.iter().map(|o| o.date).collect()
    }

    pub fn sales(&self) -> Vec<f64> {
        self.observations.iter().map(|o| o.sales).collect()
    }

    /// Split by position: the first `floor(n * train_fraction)` days train,
    /// the rest test. Covariates travel with their rows, so alignment holds
    /// on both sides of the boundary.
    pub fn split(&self, train_fraction: f64) -> TrainTestSplit<'_> {
        let n = self.observations.len();
        let boundary = ((n as f64) * train_fraction).floor() as usize;
        let boundary = boundary.min(n);
        let (train, test) = self.observations.split_at(boundary);
        TrainTestSplit { train, test }
    }
}

/// Borrowed view of a series split at a single boundary index.
#[derive(Debug, Clone, Copy)]
pub struct TrainTestSplit<'a> {
    pub train: &'a [DailyObservation],
    pub test: &'a [DailyObservation],
}

impl TrainTestSplit<'_> {
    pub fn boundary(&self) -> usize {
        self.train.len()
    }

    pub fn last_train_date(&self) -> Option<NaiveDate> {
        self.train.last().map(|o| o.date)
    }
}

/// True when `observations` has strictly consecutive daily dates.
pub fn is_contiguous(observations: &[DailyObservation]) -> bool {
    observations
        .windows(2)
        .all(|w| w[0].date.succ_opt() == Some(w[1].date))
}
