//! Raw transaction-day records and static store attributes, as read from the source.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::StoreId;

/// State-holiday marker on a transaction day.
///
/// The source encodes this as `0` (no holiday) or `a`/`b`/`c` (public,
/// Easter, Christmas). Anything else is kept verbatim as `Unknown` so the
/// encoder can decide what to do with it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateHoliday {
    None,
    A,
    B,
    C,
    Unknown(String),
}

impl StateHoliday {
    /// Parse a raw source code. Empty and `0` both mean no holiday.
    pub fn parse(code: &str) -> Self {
        match code.trim() {
            "" | "0" => Self::None,
            "a" => Self::A,
            "b" => Self::B,
            "c" => Self::C,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn is_holiday(&self) -> bool {
        matches!(self, Self::A | Self::B | Self::C)
    }
}

impl Default for StateHoliday {
    fn default() -> Self {
        Self::None
    }
}

impl fmt::Display for StateHoliday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "0"),
            Self::A => write!(f, "a"),
            Self::B => write!(f, "b"),
            Self::C => write!(f, "c"),
            Self::Unknown(code) => write!(f, "{code}"),
        }
    }
}

/// One observation per (store, date). Never mutated by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub store_id: StoreId,
    pub date: NaiveDate,
    pub sales: f64,
    pub customers: u32,
    pub open: bool,
    pub promo: bool,
    pub state_holiday: StateHoliday,
    pub school_holiday: bool,
}

/// Static per-store metadata.
///
/// The forecasting core never reads these; they feed inventory estimation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreAttributes {
    pub store_id: StoreId,
    /// `a`..`d`, or `NA` when missing.
    pub store_type: String,
    /// `a` basic, `b` extra, `c` extended, or `NA`.
    pub assortment: String,
    /// Metres to the nearest competitor; 0 when unknown.
    pub competition_distance: u32,
    pub competition_open_since_month: u32,
    pub competition_open_since_year: u32,
    pub promo2: bool,
    pub promo2_since_week: u32,
    pub promo2_since_year: u32,
    pub promo_interval: String,
}

impl StoreAttributes {
    /// Attributes for a store that has no row in the attribute source.
    pub fn unknown(store_id: StoreId) -> Self {
        Self {
            store_id,
            store_type: "NA".into(),
            assortment: "NA".into(),
            competition_distance: 0,
            competition_open_since_month: 0,
            competition_open_since_year: 0,
            promo2: false,
            promo2_since_week: 0,
            promo2_since_year: 0,
            promo_interval: "NA".into(),
        }
    }

    /// True when a competitor is known to be closer than `metres`.
    pub fn has_competition_within(&self, metres: u32) -> bool {
        self.competition_distance > 0 && self.competition_distance < metres
    }
}

/// All raw records for one store, joined with its attributes (left join).
#[derive(Debug, Clone)]
pub struct StoreFrame {
    pub store_id: StoreId,
    pub records: Vec<RawRecord>,
    pub attributes: Option<StoreAttributes>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known_codes() {
        assert_eq!(StateHoliday::parse("0"), StateHoliday::None);
        assert_eq!(StateHoliday::parse(""), StateHoliday::None);
        assert_eq!(StateHoliday::parse(" a "), StateHoliday::A);
        assert_eq!(StateHoliday::parse("b"), StateHoliday::B);
        assert_eq!(StateHoliday::parse("c"), StateHoliday::C);
    }

    #[test]
    fn parse_keeps_unknown_codes() {
        assert_eq!(
            StateHoliday::parse("NA"),
            StateHoliday::Unknown("NA".into())
        );
        assert!(!StateHoliday::parse("x").is_holiday());
    }

    #[test]
    fn display_roundtrips_source_codes() {
        for code in ["0", "a", "b", "c", "zz"] {
            assert_eq!(StateHoliday::parse(code).to_string(), code);
        }
    }

    #[test]
    fn zero_distance_is_not_nearby_competition() {
        let mut attrs = StoreAttributes::unknown(1);
        assert!(!attrs.has_competition_within(500));
        attrs.competition_distance = 120;
        assert!(attrs.has_competition_within(500));
        attrs.competition_distance = 500;
        assert!(!attrs.has_competition_within(500));
    }
}
