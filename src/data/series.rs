//! Dated close-price table
//!
//! A [`Series`] holds one column per instrument and one row per date, with
//! `None` marking a missing cell. Rows live in a `BTreeMap` so iteration is
//! always in increasing date order and a date can never appear twice.

use crate::currency::{CurrencyCode, Instrument};
use chrono::NaiveDate;
use hashbrown::HashMap;
use std::collections::BTreeMap;

/// A single close price observation
#[derive(Debug, Clone, PartialEq)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub instrument: Instrument,
    pub close: f64,
}

impl PricePoint {
    pub fn new(date: NaiveDate, instrument: Instrument, close: f64) -> Self {
        Self {
            date,
            instrument,
            close,
        }
    }
}

/// Missing-cell counts around a gap-fill pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GapFillReport {
    pub missing_before: usize,
    pub missing_after: usize,
}

impl GapFillReport {
    pub fn filled(&self) -> usize {
        self.missing_before - self.missing_after
    }
}

/// Date-indexed table of close prices, one column per instrument
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    instruments: Vec<Instrument>,
    columns: HashMap<CurrencyCode, usize>,
    rows: BTreeMap<NaiveDate, Vec<Option<f64>>>,
}

impl Series {
    /// Create an empty series with no columns
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty series with the given columns
    pub fn with_instruments(instruments: impl IntoIterator<Item = Instrument>) -> Self {
        let mut series = Self::new();
        for instrument in instruments {
            series.add_instrument(instrument);
        }
        series
    }

    /// Build a single-column series from (date, close) pairs
    pub fn from_closes(
        instrument: Instrument,
        closes: impl IntoIterator<Item = (NaiveDate, f64)>,
    ) -> Self {
        let mut series = Self::with_instruments([instrument.clone()]);
        for (date, close) in closes {
            series.insert(date, &instrument, close);
        }
        series
    }

    /// Add a column, returning its index. Existing columns are left alone.
    pub fn add_instrument(&mut self, instrument: Instrument) -> usize {
        if let Some(&idx) = self.columns.get(&instrument.code) {
            return idx;
        }
        let idx = self.instruments.len();
        self.columns.insert(instrument.code.clone(), idx);
        self.instruments.push(instrument);
        for row in self.rows.values_mut() {
            row.push(None);
        }
        idx
    }

    /// Set one cell. A non-finite close is stored as missing.
    pub fn insert(&mut self, date: NaiveDate, instrument: &Instrument, close: f64) {
        let idx = self.add_instrument(instrument.clone());
        let width = self.instruments.len();
        let row = self.rows.entry(date).or_insert_with(|| vec![None; width]);
        row[idx] = close.is_finite().then_some(close);
    }

    /// Insert a full row aligned with [`Series::instruments`]
    pub fn insert_row(&mut self, date: NaiveDate, values: Vec<Option<f64>>) {
        debug_assert_eq!(values.len(), self.instruments.len());
        let mut values = values;
        values.resize(self.instruments.len(), None);
        self.rows.insert(date, values);
    }

    /// Columns in insertion order
    pub fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }

    /// Column index for a code
    pub fn column_index(&self, code: &CurrencyCode) -> Option<usize> {
        self.columns.get(code).copied()
    }

    pub fn contains(&self, code: &CurrencyCode) -> bool {
        self.columns.contains_key(code)
    }

    /// Value of one cell
    pub fn get(&self, date: NaiveDate, code: &CurrencyCode) -> Option<f64> {
        let idx = self.column_index(code)?;
        self.rows.get(&date).and_then(|row| row[idx])
    }

    /// One column in date order
    pub fn column(&self, code: &CurrencyCode) -> Option<Vec<Option<f64>>> {
        let idx = self.column_index(code)?;
        Some(self.rows.values().map(|row| row[idx]).collect())
    }

    /// Number of rows (dates)
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when there are no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of columns
    pub fn width(&self) -> usize {
        self.instruments.len()
    }

    pub fn contains_date(&self, date: NaiveDate) -> bool {
        self.rows.contains_key(&date)
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.rows.keys().copied()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.rows.keys().next().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.rows.keys().next_back().copied()
    }

    /// Rows in increasing date order
    pub fn rows(&self) -> impl Iterator<Item = (NaiveDate, &[Option<f64>])> + '_ {
        self.rows.iter().map(|(date, row)| (*date, row.as_slice()))
    }

    /// All known cells as price points
    pub fn points(&self) -> impl Iterator<Item = PricePoint> + '_ {
        self.rows.iter().flat_map(move |(date, row)| {
            row.iter().enumerate().filter_map(move |(idx, value)| {
                value.map(|close| PricePoint::new(*date, self.instruments[idx].clone(), close))
            })
        })
    }

    /// Count of `None` cells
    pub fn missing_cells(&self) -> usize {
        self.rows
            .values()
            .map(|row| row.iter().filter(|v| v.is_none()).count())
            .sum()
    }

    /// Columns that have no known value at all
    pub fn empty_instruments(&self) -> Vec<&Instrument> {
        self.instruments
            .iter()
            .enumerate()
            .filter(|(idx, _)| self.rows.values().all(|row| row[*idx].is_none()))
            .map(|(_, inst)| inst)
            .collect()
    }

    /// Outer join on date.
    ///
    /// Every date of either side is kept. Columns of `other` that are new to
    /// `self` are appended; where both sides hold a value for the same cell,
    /// the existing value wins.
    pub fn outer_join(&mut self, other: Series) {
        let mapping: Vec<usize> = other
            .instruments
            .into_iter()
            .map(|inst| self.add_instrument(inst))
            .collect();

        let width = self.instruments.len();
        for (date, values) in other.rows {
            let row = self.rows.entry(date).or_insert_with(|| vec![None; width]);
            for (src, value) in values.into_iter().enumerate() {
                let cell = &mut row[mapping[src]];
                if cell.is_none() {
                    *cell = value;
                }
            }
        }
    }

    /// Drop every row dated on or before `date`, returning how many went
    pub fn retain_after(&mut self, date: NaiveDate) -> usize {
        let before = self.rows.len();
        self.rows.retain(|d, _| *d > date);
        before - self.rows.len()
    }

    /// Forward-fill then backward-fill every column.
    ///
    /// Afterwards a column is either complete or, if it had no known value,
    /// still entirely missing. Applying it twice changes nothing.
    pub fn gap_fill(&mut self) -> GapFillReport {
        let missing_before = self.missing_cells();
        if missing_before == 0 {
            return GapFillReport::default();
        }

        for idx in 0..self.instruments.len() {
            let mut last_known = None;
            for row in self.rows.values_mut() {
                match row[idx] {
                    Some(value) => last_known = Some(value),
                    None => row[idx] = last_known,
                }
            }

            let mut next_known = None;
            for row in self.rows.values_mut().rev() {
                match row[idx] {
                    Some(value) => next_known = Some(value),
                    None => row[idx] = next_known,
                }
            }
        }

        GapFillReport {
            missing_before,
            missing_after: self.missing_cells(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn eur() -> Instrument {
        Instrument::fx("EUR").unwrap()
    }

    fn jpy() -> Instrument {
        Instrument::fx("JPY").unwrap()
    }

    #[test]
    fn test_insert_and_get() {
        let mut series = Series::new();
        series.insert(d(2), &eur(), 0.92);
        series.insert(d(1), &jpy(), 150.1);

        assert_eq!(series.len(), 2);
        assert_eq!(series.width(), 2);
        assert_eq!(series.first_date(), Some(d(1)));
        assert_eq!(series.last_date(), Some(d(2)));
        assert_eq!(series.get(d(2), &eur().code), Some(0.92));
        assert_eq!(series.get(d(1), &eur().code), None);
        assert_eq!(series.missing_cells(), 2);
    }

    #[test]
    fn test_nan_is_missing() {
        let mut series = Series::new();
        series.insert(d(1), &eur(), f64::NAN);
        assert_eq!(series.len(), 1);
        assert_eq!(series.missing_cells(), 1);
    }

    #[test]
    fn test_outer_join_keeps_all_dates() {
        let mut left = Series::from_closes(eur(), [(d(1), 0.91), (d(2), 0.92)]);
        let right = Series::from_closes(jpy(), [(d(2), 150.0), (d(4), 151.0)]);

        left.outer_join(right);

        let dates: Vec<NaiveDate> = left.dates().collect();
        assert_eq!(dates, vec![d(1), d(2), d(4)]);
        assert_eq!(left.get(d(4), &jpy().code), Some(151.0));
        assert_eq!(left.get(d(4), &eur().code), None);
        assert_eq!(left.get(d(1), &jpy().code), None);
    }

    #[test]
    fn test_outer_join_existing_value_wins() {
        let mut left = Series::from_closes(eur(), [(d(1), 0.91)]);
        let right = Series::from_closes(eur(), [(d(1), 0.99), (d(2), 0.93)]);
        left.outer_join(right);
        assert_eq!(left.width(), 1);
        assert_eq!(left.get(d(1), &eur().code), Some(0.91));
        assert_eq!(left.get(d(2), &eur().code), Some(0.93));
    }

    #[test]
    fn test_gap_fill_forward_then_backward() {
        let mut series = Series::with_instruments([eur(), jpy()]);
        series.insert_row(d(1), vec![None, Some(150.0)]);
        series.insert_row(d(2), vec![Some(0.92), None]);
        series.insert_row(d(3), vec![None, None]);
        series.insert_row(d(4), vec![Some(0.94), Some(152.0)]);

        let report = series.gap_fill();

        assert_eq!(report.missing_before, 4);
        assert_eq!(report.missing_after, 0);
        assert_eq!(report.filled(), 4);
        assert_eq!(
            series.column(&eur().code).unwrap(),
            vec![Some(0.92), Some(0.92), Some(0.92), Some(0.94)]
        );
        assert_eq!(
            series.column(&jpy().code).unwrap(),
            vec![Some(150.0), Some(150.0), Some(150.0), Some(152.0)]
        );
    }

    #[test]
    fn test_gap_fill_leaves_empty_column() {
        let chf = Instrument::fx("CHF").unwrap();
        let mut series = Series::with_instruments([eur(), chf.clone()]);
        series.insert_row(d(1), vec![Some(0.9), None]);
        series.insert_row(d(2), vec![None, None]);

        let report = series.gap_fill();
        assert_eq!(report.missing_after, 2);
        assert_eq!(series.empty_instruments(), vec![&chf]);
        assert_eq!(series.get(d(2), &eur().code), Some(0.9));
    }

    #[test]
    fn test_gap_fill_idempotent() {
        let mut series = Series::with_instruments([eur()]);
        series.insert_row(d(1), vec![None]);
        series.insert_row(d(2), vec![Some(1.0)]);
        series.insert_row(d(3), vec![None]);

        series.gap_fill();
        let once = series.clone();
        let report = series.gap_fill();
        assert_eq!(series, once);
        assert_eq!(report, GapFillReport::default());
    }

    #[test]
    fn test_retain_after() {
        let mut series = Series::from_closes(eur(), [(d(1), 1.0), (d(2), 1.1), (d(3), 1.2)]);
        let dropped = series.retain_after(d(2));
        assert_eq!(dropped, 2);
        assert_eq!(series.dates().collect::<Vec<_>>(), vec![d(3)]);
    }

    #[test]
    fn test_points() {
        let mut series = Series::with_instruments([eur(), jpy()]);
        series.insert_row(d(1), vec![Some(0.9), None]);
        let points: Vec<PricePoint> = series.points().collect();
        assert_eq!(points, vec![PricePoint::new(d(1), eur(), 0.9)]);
    }
}
