//! Per-instrument daily price history with (instrument, date) de-duplication

use crate::error::{Result, StockRankError};
use crate::types::{DailyBar, Instrument, Price, PriceField};
use chrono::NaiveDate;
use hashbrown::HashMap;
use std::collections::BTreeMap;

/// Outcome of one ingest call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    /// Bars that were new and are now in the store, in input order
    pub accepted: Vec<DailyBar>,
    /// Bars whose (instrument, date) key was already present
    pub rejected_duplicates: usize,
}

impl IngestReport {
    /// Number of bars merged into the store
    pub fn merged(&self) -> usize {
        self.accepted.len()
    }
}

/// Daily bars keyed by instrument, each series ordered by date.
///
/// Populate first, then read: nothing here is synchronised, and derived
/// computations only ever take shared references.
#[derive(Debug, Clone, Default)]
pub struct SeriesStore {
    series: HashMap<Instrument, BTreeMap<NaiveDate, DailyBar>>,
    price_field: PriceField,
}

impl SeriesStore {
    /// Create an empty store reading adjusted closes
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store that reads `field` in [`SeriesStore::ordered_closes`]
    pub fn with_price_field(field: PriceField) -> Self {
        Self {
            series: HashMap::new(),
            price_field: field,
        }
    }

    pub fn price_field(&self) -> PriceField {
        self.price_field
    }

    /// Merge bars, rejecting any whose key is already stored.
    ///
    /// Existing bars are never overwritten; a repeated key inside the same
    /// batch is rejected too, so the store never holds two bars for a day.
    pub fn ingest<I>(&mut self, bars: I) -> IngestReport
    where
        I: IntoIterator<Item = DailyBar>,
    {
        let mut report = IngestReport::default();

        for bar in bars {
            let series = self.series.entry(bar.instrument.clone()).or_default();
            if series.contains_key(&bar.date) {
                log::debug!("duplicate bar {} {}", bar.instrument, bar.date);
                report.rejected_duplicates += 1;
                continue;
            }
            series.insert(bar.date, bar.clone());
            report.accepted.push(bar);
        }

        report
    }

    /// Prices for `instrument` dated on or before `as_of`, newest first.
    ///
    /// `limit` caps the number of entries; 0 means no cap.
    pub fn ordered_closes(
        &self,
        instrument: &str,
        as_of: NaiveDate,
        limit: usize,
    ) -> Result<Vec<(NaiveDate, Price)>> {
        let series = self.series.get(instrument).ok_or_else(|| StockRankError::NoData {
            instrument: instrument.to_string(),
        })?;

        let cap = if limit == 0 { usize::MAX } else { limit };
        let closes: Vec<(NaiveDate, Price)> = series
            .range(..=as_of)
            .rev()
            .take(cap)
            .map(|(date, bar)| (*date, bar.price(self.price_field)))
            .collect();

        if closes.is_empty() {
            return Err(StockRankError::NoData {
                instrument: instrument.to_string(),
            });
        }
        Ok(closes)
    }

    /// Check whether a bar exists for the key
    pub fn contains(&self, instrument: &str, date: NaiveDate) -> bool {
        self.series
            .get(instrument)
            .map(|s| s.contains_key(&date))
            .unwrap_or(false)
    }

    /// Most recent date stored for an instrument
    pub fn latest_date(&self, instrument: &str) -> Option<NaiveDate> {
        self.series
            .get(instrument)
            .and_then(|s| s.keys().next_back().copied())
    }

    /// Instruments with at least one bar, sorted by code
    pub fn instruments(&self) -> Vec<Instrument> {
        let mut codes: Vec<Instrument> = self
            .series
            .iter()
            .filter(|(_, s)| !s.is_empty())
            .map(|(code, _)| code.clone())
            .collect();
        codes.sort();
        codes
    }

    /// Total number of bars across all instruments
    pub fn len(&self) -> usize {
        self.series.values().map(|s| s.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn bar(code: &str, date: NaiveDate, close: f64) -> DailyBar {
        DailyBar::new(code, date, close, close, close, close, 1000.0, close)
    }

    #[test]
    fn test_overlapping_ingest_rejects_duplicates() {
        let mut store = SeriesStore::new();

        let first = store.ingest(vec![
            bar("8306", ymd(2024, 1, 4), 100.0),
            bar("8306", ymd(2024, 1, 5), 101.0),
        ]);
        assert_eq!(first.merged(), 2);
        assert_eq!(first.rejected_duplicates, 0);

        let second = store.ingest(vec![
            bar("8306", ymd(2024, 1, 5), 999.0),
            bar("8306", ymd(2024, 1, 9), 102.0),
            bar("9984", ymd(2024, 1, 5), 50.0),
        ]);
        assert_eq!(second.merged(), 2);
        assert_eq!(second.rejected_duplicates, 1);
        assert_eq!(store.len(), 4);

        // The original bar was kept, not overwritten
        let closes = store.ordered_closes("8306", ymd(2024, 1, 5), 1).unwrap();
        assert_eq!(closes, vec![(ymd(2024, 1, 5), 101.0)]);
    }

    #[test]
    fn test_duplicate_within_one_batch() {
        let mut store = SeriesStore::new();
        let report = store.ingest(vec![
            bar("8306", ymd(2024, 1, 4), 100.0),
            bar("8306", ymd(2024, 1, 4), 100.5),
        ]);
        assert_eq!(report.merged(), 1);
        assert_eq!(report.rejected_duplicates, 1);
    }

    #[test]
    fn test_ordered_closes_descending_regardless_of_ingest_order() {
        let mut store = SeriesStore::with_price_field(PriceField::Close);
        store.ingest(vec![
            bar("8306", ymd(2024, 1, 9), 3.0),
            bar("8306", ymd(2024, 1, 4), 1.0),
            bar("8306", ymd(2024, 1, 5), 2.0),
            bar("8306", ymd(2024, 1, 10), 4.0),
        ]);

        let all = store.ordered_closes("8306", ymd(2024, 1, 31), 0).unwrap();
        let prices: Vec<f64> = all.iter().map(|(_, p)| *p).collect();
        assert_eq!(prices, vec![4.0, 3.0, 2.0, 1.0]);

        let as_of = store.ordered_closes("8306", ymd(2024, 1, 9), 2).unwrap();
        assert_eq!(as_of, vec![(ymd(2024, 1, 9), 3.0), (ymd(2024, 1, 5), 2.0)]);
    }

    #[test]
    fn test_no_data() {
        let mut store = SeriesStore::new();
        store.ingest(vec![bar("8306", ymd(2024, 1, 9), 3.0)]);

        assert!(matches!(
            store.ordered_closes("9984", ymd(2024, 1, 9), 0),
            Err(StockRankError::NoData { .. })
        ));
        // Instrument exists but nothing on or before as_of
        assert!(matches!(
            store.ordered_closes("8306", ymd(2024, 1, 8), 0),
            Err(StockRankError::NoData { .. })
        ));
    }

    #[test]
    fn test_adjusted_close_is_default() {
        let mut store = SeriesStore::new();
        let mut split = bar("8306", ymd(2024, 1, 9), 300.0);
        split.adjusted_close = 100.0;
        store.ingest(vec![split]);

        let closes = store.ordered_closes("8306", ymd(2024, 1, 9), 0).unwrap();
        assert_eq!(closes[0].1, 100.0);
        assert_eq!(store.latest_date("8306"), Some(ymd(2024, 1, 9)));
        assert!(store.contains("8306", ymd(2024, 1, 9)));
        assert_eq!(store.instruments(), vec!["8306".to_string()]);
    }
}
