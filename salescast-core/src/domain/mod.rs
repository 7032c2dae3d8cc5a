//! Domain types for the forecasting pipeline.

pub mod record;
pub mod series;

pub use record::{RawRecord, StateHoliday, StoreAttributes, StoreFrame};
pub use series::{is_contiguous, DailyObservation, DailySeries, TrainTestSplit};

/// Store identifier as used by the source data.
pub type StoreId = u32;
