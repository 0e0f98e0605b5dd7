//! Core types and constants

use crate::error::{Result, StockRankError};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Instrument identifier (exchange code such as "8306")
pub type Instrument = String;

/// Price type (using f64 for precision)
pub type Price = f64;

/// Quantity/volume type
pub type Volume = f64;

/// Calendar-day format used by every collaborator
pub const DATE_FORMAT: &str = "%Y/%m/%d";

/// Intraday timestamp format (date plus hour:minute)
pub const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M";

/// Number of fields in a raw daily row, without the instrument code:
/// date, open, high, low, close, volume, adjusted close
pub const DAILY_FIELD_COUNT: usize = 7;

/// One trading day of prices for an instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    pub instrument: Instrument,
    pub date: NaiveDate,
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
    pub volume: Volume,
    pub adjusted_close: Price,
}

impl DailyBar {
    /// Create a new bar
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        instrument: impl Into<Instrument>,
        date: NaiveDate,
        open: Price,
        high: Price,
        low: Price,
        close: Price,
        volume: Volume,
        adjusted_close: Price,
    ) -> Self {
        Self {
            instrument: instrument.into(),
            date,
            open,
            high,
            low,
            close,
            volume,
            adjusted_close,
        }
    }

    /// Parse a bar from the string fields a fetcher or sheet hands over.
    ///
    /// `fields` is `[date, open, high, low, close, volume, adjusted_close]`.
    /// A row with any other length usually means the page was redirected or
    /// its layout changed, so it is rejected rather than guessed at.
    pub fn from_fields(instrument: &str, fields: &[String], today: NaiveDate) -> Result<Self> {
        if fields.len() != DAILY_FIELD_COUNT {
            return Err(StockRankError::ParseError(format!(
                "{} row has {} fields, expected {}: {:?}",
                instrument,
                fields.len(),
                DAILY_FIELD_COUNT,
                fields
            )));
        }

        Ok(Self {
            instrument: instrument.to_string(),
            date: parse_trade_date(&fields[0], today)?,
            open: parse_price(&fields[1])?,
            high: parse_price(&fields[2])?,
            low: parse_price(&fields[3])?,
            close: parse_price(&fields[4])?,
            volume: parse_price(&fields[5])?,
            adjusted_close: parse_price(&fields[6])?,
        })
    }

    /// Composite uniqueness key
    pub fn key(&self) -> (&str, NaiveDate) {
        (self.instrument.as_str(), self.date)
    }

    /// Price selected by `field`
    pub fn price(&self, field: PriceField) -> Price {
        match field {
            PriceField::Close => self.close,
            PriceField::AdjustedClose => self.adjusted_close,
        }
    }
}

/// Which close a series is built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceField {
    Close,
    #[default]
    AdjustedClose,
}

/// A single intraday price reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntradayQuote {
    pub instrument: Instrument,
    pub timestamp: NaiveDateTime,
    pub price: Price,
}

impl IntradayQuote {
    pub fn new(instrument: impl Into<Instrument>, timestamp: NaiveDateTime, price: Price) -> Self {
        Self {
            instrument: instrument.into(),
            timestamp,
            price,
        }
    }

    /// Parse a stored `[code, "YYYY/MM/DD HH:MM", price]` row
    pub fn from_fields(fields: &[String]) -> Result<Self> {
        if fields.len() < 3 {
            return Err(StockRankError::ParseError(format!(
                "intraday row needs code, timestamp and price: {:?}",
                fields
            )));
        }
        let timestamp = NaiveDateTime::parse_from_str(fields[1].trim(), TIMESTAMP_FORMAT)
            .map_err(|e| {
                StockRankError::ParseError(format!("bad timestamp '{}': {}", fields[1], e))
            })?;

        Ok(Self {
            instrument: fields[0].trim().to_string(),
            timestamp,
            price: parse_price(&fields[2])?,
        })
    }
}

/// Parse a numeric field, tolerating thousands separators
pub fn parse_price(raw: &str) -> Result<Price> {
    let cleaned: String = raw
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();

    let value: f64 = cleaned
        .parse()
        .map_err(|_| StockRankError::ParseError(format!("not a number: '{}'", raw)))?;

    if !value.is_finite() {
        return Err(StockRankError::ParseError(format!(
            "not a finite number: '{}'",
            raw
        )));
    }
    Ok(value)
}

/// Parse a `YYYY/MM/DD` date, or complete a bare `M/D` with its year.
///
/// Price tables only print month and day. A month later than the current
/// one must belong to last year (December rows scraped in January).
pub fn parse_trade_date(raw: &str, today: NaiveDate) -> Result<NaiveDate> {
    let raw = raw.trim();
    let parts: Vec<&str> = raw.split('/').collect();

    match parts.len() {
        3 => NaiveDate::parse_from_str(raw, DATE_FORMAT)
            .map_err(|e| StockRankError::ParseError(format!("bad date '{}': {}", raw, e))),
        2 => {
            let month: u32 = parts[0]
                .parse()
                .map_err(|_| StockRankError::ParseError(format!("bad month in '{}'", raw)))?;
            let day: u32 = parts[1]
                .parse()
                .map_err(|_| StockRankError::ParseError(format!("bad day in '{}'", raw)))?;

            let year = if month > today.month() {
                today.year() - 1
            } else {
                today.year()
            };

            NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
                StockRankError::ParseError(format!("no such date {}/{} in {}", month, day, year))
            })
        }
        _ => Err(StockRankError::ParseError(format!(
            "unrecognised date '{}'",
            raw
        ))),
    }
}

/// Format a calendar day the way collaborators store it
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}
