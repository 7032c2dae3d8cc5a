//! Exogenous covariate encoding.
//!
//! Each daily observation becomes one row of `[promo, state_holiday,
//! school_holiday]`. The target never passes through here.

use tracing::debug;

use crate::domain::{DailyObservation, StateHoliday};

/// Column names of an encoded exogenous row, in order.
pub const EXOG_COLUMNS: [&str; 3] = ["promo", "state_holiday", "school_holiday"];

/// Numeric code for a state-holiday value.
///
/// Unrecognised codes map to 0 like "no holiday".
pub fn encode_state_holiday(holiday: &StateHoliday) -> f64 {
    match holiday {
        StateHoliday::None => 0.0,
        StateHoliday::A => 1.0,
        StateHoliday::B => 2.0,
        StateHoliday::C => 3.0,
        StateHoliday::Unknown(code) => {
            debug!(code = %code, "unrecognised state holiday encoded as 0");
            0.0
        }
    }
}

/// Row-major matrix of exogenous regressors, one row per day.
#[derive(Debug, Clone, PartialEq)]
pub struct ExogMatrix {
    width: usize,
    n_rows: usize,
    data: Vec<f64>,
}

impl ExogMatrix {
    /// Encode the covariates of a slice of observations.
    pub fn encode(observations: &[DailyObservation]) -> Self {
        let mut data = Vec::with_capacity(observations.len() * EXOG_COLUMNS.len());
        for obs in observations {
            data.push(if obs.promo { 1.0 } else { 0.0 });
            data.push(encode_state_holiday(&obs.state_holiday));
            data.push(if obs.school_holiday { 1.0 } else { 0.0 });
        }
        Self {
            width: EXOG_COLUMNS.len(),
            n_rows: observations.len(),
            data,
        }
    }

    /// Build from explicit rows. All rows must share one width.
    pub fn from_rows(rows: &[Vec<f64>]) -> Option<Self> {
        let width = rows.first().map_or(EXOG_COLUMNS.len(), Vec::len);
        if rows.iter().any(|r| r.len() != width) {
            return None;
        }
        Some(Self {
            width,
            n_rows: rows.len(),
            data: rows.iter().flatten().copied().collect(),
        })
    }

    pub fn zeros(rows: usize, width: usize) -> Self {
        Self {
            width,
            n_rows: rows,
            data: vec![0.0; rows * width],
        }
    }

    /// `rows` copies of `row`.
    pub fn repeat_row(row: &[f64], rows: usize) -> Self {
        let mut data = Vec::with_capacity(row.len() * rows);
        for _ in 0..rows {
            data.extend_from_slice(row);
        }
        Self {
            width: row.len(),
            n_rows: rows,
            data,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows == 0
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.width..(i + 1) * self.width]
    }

    pub fn last_row(&self) -> Option<&[f64]> {
        self.n_rows().checked_sub(1).map(|i| self.row(i))
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> + '_ {
        (0..self.n_rows).map(move |i| self.row(i))
    }

    /// Keep only the listed columns, in the given order.
    pub fn select_columns(&self, columns: &[usize]) -> Self {
        let mut data = Vec::with_capacity(self.n_rows * columns.len());
        for row in self.rows() {
            data.extend(columns.iter().map(|&j| row[j]));
        }
        Self {
            width: columns.len(),
            n_rows: self.n_rows,
            data,
        }
    }

    /// Rows of `self` followed by rows of `other`. Widths must match.
    pub fn concat(&self, other: &ExogMatrix) -> Option<Self> {
        if self.width != other.width {
            return None;
        }
        let mut data = self.data.clone();
        data.extend_from_slice(&other.data);
        Some(Self {
            width: self.width,
            n_rows: self.n_rows + other.n_rows,
            data,
        })
    }

    /// The last `count` rows (all rows if fewer).
    pub fn tail(&self, count: usize) -> Self {
        let start = self.n_rows.saturating_sub(count);
        Self {
            width: self.width,
            n_rows: self.n_rows - start,
            data: self.data[start * self.width..].to_vec(),
        }
    }

    /// Copy of column `j`.
    pub fn column(&self, j: usize) -> Vec<f64> {
        self.rows().map(|r| r[j]).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn obs(promo: bool, holiday: StateHoliday, school: bool) -> DailyObservation {
        DailyObservation {
            date: NaiveDate::from_ymd_opt(2015, 1, 1).unwrap(),
            sales: 1.0,
            promo,
            state_holiday: holiday,
            school_holiday: school,
        }
    }

    #[test]
    fn holiday_codes() {
        assert_eq!(encode_state_holiday(&StateHoliday::None), 0.0);
        assert_eq!(encode_state_holiday(&StateHoliday::A), 1.0);
        assert_eq!(encode_state_holiday(&StateHoliday::B), 2.0);
        assert_eq!(encode_state_holiday(&StateHoliday::C), 3.0);
        assert_eq!(encode_state_holiday(&StateHoliday::Unknown("x".into())), 0.0);
    }

    #[test]
    fn encodes_rows_in_column_order() {
        let m = ExogMatrix::encode(&[
            obs(true, StateHoliday::B, false),
            obs(false, StateHoliday::None, true),
        ]);
        assert_eq!(m.width(), 3);
        assert_eq!(m.n_rows(), 2);
        assert_eq!(m.row(0), &[1.0, 2.0, 0.0]);
        assert_eq!(m.row(1), &[0.0, 0.0, 1.0]);
        assert_eq!(m.last_row(), Some(&[0.0, 0.0, 1.0][..]));
        assert_eq!(m.column(0), vec![1.0, 0.0]);
    }

    #[test]
    fn repeat_and_zeros() {
        let r = ExogMatrix::repeat_row(&[1.0, 3.0, 0.0], 4);
        assert_eq!(r.n_rows(), 4);
        assert!(r.rows().all(|row| row == [1.0, 3.0, 0.0]));

        let z = ExogMatrix::zeros(2, 3);
        assert_eq!(z.n_rows(), 2);
        assert!(z.rows().flatten().all(|v| *v == 0.0));
    }

    #[test]
    fn ragged_rows_rejected() {
        assert!(ExogMatrix::from_rows(&[vec![1.0, 2.0], vec![1.0]]).is_none());
        let m = ExogMatrix::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(m.column(1), vec![2.0, 4.0]);
    }

    #[test]
    fn zero_width_keeps_row_count() {
        let m = ExogMatrix::zeros(4, 0);
        assert_eq!(m.n_rows(), 4);
        assert_eq!(m.rows().count(), 4);
        assert!(m.row(2).is_empty());
    }

    #[test]
    fn select_concat_tail() {
        let m = ExogMatrix::from_rows(&[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]).unwrap();
        let s = m.select_columns(&[2, 0]);
        assert_eq!(s.row(1), &[6.0, 4.0]);

        let both = m.concat(&ExogMatrix::repeat_row(&[7.0, 8.0, 9.0], 1)).unwrap();
        assert_eq!(both.n_rows(), 3);
        assert_eq!(both.tail(2).row(0), &[4.0, 5.0, 6.0]);
        assert_eq!(both.tail(10).n_rows(), 3);
        assert!(m.concat(&s).is_none());
    }

    #[test]
    fn empty_matrix() {
        let m = ExogMatrix::encode(&[]);
        assert!(m.is_empty());
        assert_eq!(m.n_rows(), 0);
        assert!(m.last_row().is_none());
    }
}
