//! Row-oriented collaborators and explicit record serialization
//!
//! The pipeline only talks to the outside world through three narrow
//! traits: a [`Sheet`] (ranges of rows), a [`Table`] (insert-ignore rows)
//! and a [`Fetcher`] (already-parsed price rows per instrument). Records
//! are flattened with one explicit [`ToRow`] impl per type so the output
//! column order is fixed at compile time.

pub mod csv_sheet;
pub mod ranked;
pub mod retry;

pub use csv_sheet::{CsvFetcher, CsvSheet};
pub use ranked::{rank, Direction, Rankable, RankedWriter, SortKey, SortPass};
pub use retry::{RetryPolicy, RetryingBatchWriter, WriteOutcome};

use crate::error::{Result, StockRankError};
use crate::pipeline::{IncreaseRates, MovingAverageRecord};
use crate::pipeline::signal::DailySignal;
use crate::types::{format_date, DailyBar, IntradayQuote, TIMESTAMP_FORMAT};
use std::fmt;

/// One output field
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(f64),
    Integer(i64),
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Text(s) => f.write_str(s),
            Cell::Number(n) => write!(f, "{}", n),
            Cell::Integer(i) => write!(f, "{}", i),
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Cell::Integer(value)
    }
}

/// A flat output row
pub type Row = Vec<Cell>;

/// Render a row as strings, as a sheet stores it
pub fn row_to_strings(row: &[Cell]) -> Vec<String> {
    row.iter().map(|c| c.to_string()).collect()
}

/// Explicit per-record flattening into an output row
pub trait ToRow {
    fn to_row(&self) -> Row;
}

impl ToRow for DailyBar {
    /// `[code, date, open, high, low, close, volume, adjusted_close]`
    fn to_row(&self) -> Row {
        vec![
            Cell::from(self.instrument.as_str()),
            Cell::from(format_date(self.date)),
            Cell::from(self.open),
            Cell::from(self.high),
            Cell::from(self.low),
            Cell::from(self.close),
            Cell::from(self.volume),
            Cell::from(self.adjusted_close),
        ]
    }
}

impl ToRow for IntradayQuote {
    /// `[code, "YYYY/MM/DD HH:MM", price]`
    fn to_row(&self) -> Row {
        vec![
            Cell::from(self.instrument.as_str()),
            Cell::from(self.timestamp.format(TIMESTAMP_FORMAT).to_string()),
            Cell::from(self.price),
        ]
    }
}

impl ToRow for MovingAverageRecord {
    /// `[code, date, average per window in ascending window order]`
    fn to_row(&self) -> Row {
        let mut row = vec![
            Cell::from(self.instrument.as_str()),
            Cell::from(format_date(self.date)),
        ];
        row.extend(self.values.values().map(|v| Cell::from(*v)));
        row
    }
}

impl ToRow for IncreaseRates {
    /// `[code, rate per lag]`, `0.0` where undefined
    fn to_row(&self) -> Row {
        let mut row = vec![Cell::from(self.instrument.as_str())];
        row.extend(self.with_sentinels().into_iter().map(Cell::from));
        row
    }
}

impl ToRow for DailySignal {
    /// `[code, date, pattern, 4 trend averages, prior, latest, crossing rate, rates...]`
    fn to_row(&self) -> Row {
        let mut row = vec![
            Cell::from(self.snapshot.instrument.as_str()),
            Cell::from(format_date(self.snapshot.date)),
            Cell::from(self.snapshot.classification.as_str()),
        ];
        row.extend(self.snapshot.moving_averages.iter().map(|v| Cell::from(*v)));
        row.push(Cell::from(self.crossing.prior_close));
        row.push(Cell::from(self.crossing.latest_close));
        row.push(Cell::from(self.crossing.rate_or_sentinel()));
        row.extend(self.rates.with_sentinels().into_iter().map(Cell::from));
        row
    }
}

/// Whether a collaborator status code means success
pub fn is_success_status(status: u16) -> bool {
    (200..300).contains(&status)
}

/// Spreadsheet-like store: named ranges of rows
pub trait Sheet {
    /// Read every row of a range
    fn read_rows(&mut self, range: &str) -> Result<Vec<Vec<String>>>;

    /// Append rows to a range, returning the collaborator's status code
    fn append_rows(&mut self, range: &str, rows: &[Row]) -> Result<u16>;

    /// Remove every row of a range
    fn clear(&mut self, range: &str) -> Result<u16>;
}

/// Relational store with insert-ignore semantics
pub trait Table {
    /// Insert rows, silently skipping existing keys. Returns rows submitted.
    fn insert_ignore(&mut self, table: &str, columns: &[String], rows: &[Row]) -> Result<usize>;
}

/// Raw intraday reading as delivered by a fetcher
#[derive(Debug, Clone, PartialEq)]
pub struct RawIntradayQuote {
    /// Text containing the UTC `HH:MM` of the quote
    pub time_text: String,
    pub price_text: String,
}

/// Price source for one instrument at a time
pub trait Fetcher {
    /// Daily rows: `[date, open, high, low, close, volume, adjusted_close]`
    fn fetch_daily(&self, instrument: &str) -> Result<Vec<Vec<String>>>;

    /// The current intraday reading
    fn fetch_intraday(&self, instrument: &str) -> Result<RawIntradayQuote>;
}

/// One idempotent append operation the retrying writer can repeat
pub trait BatchSink {
    fn submit(&mut self, rows: &[Row]) -> Result<()>;
}

/// A sheet range viewed as a batch sink
pub struct SheetRange<'a, S: Sheet + ?Sized> {
    sheet: &'a mut S,
    range: &'a str,
}

impl<'a, S: Sheet + ?Sized> SheetRange<'a, S> {
    pub fn new(sheet: &'a mut S, range: &'a str) -> Self {
        Self { sheet, range }
    }
}

impl<S: Sheet + ?Sized> BatchSink for SheetRange<'_, S> {
    fn submit(&mut self, rows: &[Row]) -> Result<()> {
        let status = self.sheet.append_rows(self.range, rows)?;
        if !is_success_status(status) {
            return Err(StockRankError::SinkStatus { status });
        }
        Ok(())
    }
}

/// A table viewed as a batch sink
pub struct TableTarget<'a, T: Table + ?Sized> {
    table: &'a mut T,
    name: &'a str,
    columns: Vec<String>,
}

impl<'a, T: Table + ?Sized> TableTarget<'a, T> {
    pub fn new(table: &'a mut T, name: &'a str, columns: Vec<String>) -> Self {
        Self {
            table,
            name,
            columns,
        }
    }
}

impl<T: Table + ?Sized> BatchSink for TableTarget<'_, T> {
    fn submit(&mut self, rows: &[Row]) -> Result<()> {
        let inserted = self.table.insert_ignore(self.name, &self.columns, rows)?;
        if inserted != rows.len() {
            return Err(StockRankError::SinkError(format!(
                "{} accepted {} of {} rows",
                self.name,
                inserted,
                rows.len()
            )));
        }
        Ok(())
    }
}
