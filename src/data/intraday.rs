//! Intraday quotes: dating a bare "HH:MM" reading and per-instrument history

use crate::error::{Result, StockRankError};
use crate::types::{Instrument, IntradayQuote, Price};
use chrono::{DateTime, Datelike, Duration, NaiveDateTime, NaiveTime, Offset, TimeZone, Timelike, Weekday};
use hashbrown::HashMap;

const MINUTES_PER_DAY: i32 = 24 * 60;

/// A quote time as printed by the quote page: UTC hour and minute, no date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuoteReading {
    pub hour: u32,
    pub minute: u32,
}

impl QuoteReading {
    /// Extract the first `H:MM` group from text such as `"Price(06:00)"`.
    ///
    /// A placeholder like `"--:--"` (no trade yet) is an error.
    pub fn parse(text: &str) -> Result<Self> {
        let bad = |what: &str| StockRankError::ParseError(format!("{} in '{}'", what, text));

        for (idx, _) in text.match_indices(':') {
            let (before, after) = (&text[..idx], &text[idx + 1..]);
            let hour = &before[before.trim_end_matches(|c: char| c.is_ascii_digit()).len()..];
            let minute_end = after
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(after.len());
            let minute = &after[..minute_end];

            if hour.is_empty() || minute.is_empty() {
                continue;
            }

            let hour: u32 = hour.parse().map_err(|_| bad("bad hour"))?;
            let minute: u32 = minute.parse().map_err(|_| bad("bad minute"))?;
            if hour >= 24 || minute >= 60 {
                return Err(bad("time out of range"));
            }
            return Ok(Self { hour, minute });
        }

        Err(bad("no HH:MM reading"))
    }
}

/// Date a reading relative to `now`, both ending up in `now`'s timezone.
///
/// A reading later in the day than the current hour was taken on the
/// previous session: the day before on Tuesday to Friday, the Friday before
/// on Monday. Weekend readings always belong to Friday.
pub fn resolve_timestamp<Tz: TimeZone>(
    now: &DateTime<Tz>,
    reading: QuoteReading,
) -> Result<NaiveDateTime> {
    let offset_minutes = now.offset().fix().local_minus_utc() / 60;
    let utc_minutes = (reading.hour * 60 + reading.minute) as i32;
    let local_minutes = (utc_minutes + offset_minutes).rem_euclid(MINUTES_PER_DAY) as u32;
    let hour = local_minutes / 60;
    let minute = local_minutes % 60;

    let today = now.date_naive();
    let later_than_now = now.hour() < hour;

    let days_back = match today.weekday() {
        Weekday::Mon if later_than_now => 3,
        Weekday::Tue | Weekday::Wed | Weekday::Thu | Weekday::Fri if later_than_now => 1,
        Weekday::Sat => 1,
        Weekday::Sun => 2,
        _ => 0,
    };

    let date = today - Duration::days(days_back);
    let time = NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(|| {
        StockRankError::ParseError(format!("invalid time {:02}:{:02}", hour, minute))
    })?;
    Ok(date.and_time(time))
}

/// Intraday quotes per instrument, ordered by timestamp
#[derive(Debug, Clone, Default)]
pub struct QuoteHistory {
    quotes: HashMap<Instrument, Vec<IntradayQuote>>,
}

impl QuoteHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Group and sort quotes. Equal timestamps keep their input order.
    pub fn from_quotes<I: IntoIterator<Item = IntradayQuote>>(quotes: I) -> Self {
        let mut history = Self::new();
        for quote in quotes {
            history.push(quote);
        }
        for series in history.quotes.values_mut() {
            series.sort_by_key(|q| q.timestamp);
        }
        history
    }

    fn push(&mut self, quote: IntradayQuote) {
        self.quotes
            .entry(quote.instrument.clone())
            .or_default()
            .push(quote);
    }

    /// Up to `limit` latest prices, newest first
    pub fn latest_prices(&self, instrument: &str, limit: usize) -> Result<Vec<Price>> {
        let series = self
            .quotes
            .get(instrument)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| StockRankError::NoData {
                instrument: instrument.to_string(),
            })?;

        Ok(series.iter().rev().take(limit).map(|q| q.price).collect())
    }

    pub fn len(&self) -> usize {
        self.quotes.values().map(|s| s.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
