//! Trailing moving averages over a dated close series
//!
//! Series are read newest first (index 0 is the latest session), matching
//! [`SeriesStore::ordered_closes`](crate::data::SeriesStore::ordered_closes).
//! Near the oldest end the window shrinks to whatever history remains
//! instead of leaving the value undefined, so every date gets an average.

use crate::error::{Result, StockRankError};
use crate::types::{Instrument, Price};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Windows reported for every instrument
pub const DEFAULT_WINDOWS: [usize; 7] = [3, 5, 7, 10, 20, 60, 100];

/// window -> date -> average
pub type MovingAverageTable = BTreeMap<usize, BTreeMap<NaiveDate, f64>>;

/// Averages for one instrument on one date, keyed by window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovingAverageRecord {
    pub instrument: Instrument,
    pub date: NaiveDate,
    pub values: BTreeMap<usize, f64>,
}

impl MovingAverageRecord {
    pub fn value(&self, window: usize) -> Option<f64> {
        self.values.get(&window).copied()
    }
}

/// Mean of `closes[start .. start + min(window, len - start)]`.
///
/// Divides by the number of points actually used.
pub fn degraded_mean(closes: &[Price], start: usize, window: usize) -> Option<f64> {
    if start >= closes.len() || window == 0 {
        return None;
    }
    let end = start + window.min(closes.len() - start);
    let slice = &closes[start..end];
    let sum: f64 = slice.iter().sum();
    Some(sum / slice.len() as f64)
}

/// Multi-window moving-average calculator
#[derive(Debug, Clone)]
pub struct MovingAverageEngine {
    windows: Vec<usize>,
}

impl MovingAverageEngine {
    /// Create an engine for the given windows (sorted and de-duplicated)
    pub fn new(windows: &[usize]) -> Result<Self> {
        if windows.is_empty() {
            return Err(StockRankError::ConfigError(
                "at least one moving-average window is required".to_string(),
            ));
        }
        if windows.contains(&0) {
            return Err(StockRankError::ConfigError(
                "moving-average windows must be greater than 0".to_string(),
            ));
        }

        let mut windows = windows.to_vec();
        windows.sort_unstable();
        windows.dedup();
        Ok(Self { windows })
    }

    pub fn windows(&self) -> &[usize] {
        &self.windows
    }

    /// Averages for every window at every date of `series`
    pub fn compute_all(&self, series: &[(NaiveDate, Price)]) -> MovingAverageTable {
        compute_all(series, &self.windows)
    }

    /// Averages for every window at one position (0 = latest)
    pub fn compute_at(&self, series: &[(NaiveDate, Price)], index: usize) -> BTreeMap<usize, f64> {
        let closes: Vec<Price> = series.iter().map(|(_, p)| *p).collect();
        self.windows
            .iter()
            .filter_map(|&w| degraded_mean(&closes, index, w).map(|v| (w, v)))
            .collect()
    }

    /// One record per date, newest first
    pub fn records(
        &self,
        instrument: &str,
        series: &[(NaiveDate, Price)],
    ) -> Vec<MovingAverageRecord> {
        let closes: Vec<Price> = series.iter().map(|(_, p)| *p).collect();

        series
            .iter()
            .enumerate()
            .map(|(i, (date, _))| MovingAverageRecord {
                instrument: instrument.to_string(),
                date: *date,
                values: self
                    .windows
                    .iter()
                    .filter_map(|&w| degraded_mean(&closes, i, w).map(|v| (w, v)))
                    .collect(),
            })
            .collect()
    }
}

impl Default for MovingAverageEngine {
    fn default() -> Self {
        Self {
            windows: DEFAULT_WINDOWS.to_vec(),
        }
    }
}

/// Averages for each window at each date of a newest-first series
pub fn compute_all(series: &[(NaiveDate, Price)], windows: &[usize]) -> MovingAverageTable {
    let closes: Vec<Price> = series.iter().map(|(_, p)| *p).collect();
    let mut table = MovingAverageTable::new();

    for &window in windows {
        let by_date = table.entry(window).or_default();
        for (i, (date, _)) in series.iter().enumerate() {
            if let Some(avg) = degraded_mean(&closes, i, window) {
                by_date.insert(*date, avg);
            }
        }
    }

    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::Duration;

    /// Newest-first series ending on 2024-03-29 with one point per day
    fn series(closes: &[f64]) -> Vec<(NaiveDate, Price)> {
        let latest = NaiveDate::from_ymd_opt(2024, 3, 29).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| (latest - Duration::days(i as i64), c))
            .collect()
    }

    #[test]
    fn test_full_windows() {
        let s = series(&[5.0, 4.0, 3.0, 2.0, 1.0]);
        let table = compute_all(&s, &[3]);
        let w3 = &table[&3];

        assert_relative_eq!(w3[&s[0].0], 4.0); // (5+4+3)/3
        assert_relative_eq!(w3[&s[1].0], 3.0); // (4+3+2)/3
        assert_relative_eq!(w3[&s[2].0], 2.0); // (3+2+1)/3
    }

    #[test]
    fn test_window_shrinks_at_oldest_end() {
        let s = series(&[5.0, 4.0, 3.0, 2.0, 1.0]);
        let table = compute_all(&s, &[3]);
        let w3 = &table[&3];

        assert_relative_eq!(w3[&s[3].0], 1.5); // (2+1)/2
        assert_relative_eq!(w3[&s[4].0], 1.0); // only one point left
        assert_eq!(w3.len(), 5);
    }

    #[test]
    fn test_short_series_uses_all_points() {
        let s = series(&[10.0, 20.0, 30.0]);
        let table = compute_all(&s, &[100]);
        assert_relative_eq!(table[&100][&s[0].0], 20.0);
        assert_relative_eq!(table[&100][&s[2].0], 30.0);
    }

    #[test]
    fn test_engine_normalises_windows() {
        let engine = MovingAverageEngine::new(&[20, 5, 5, 3]).unwrap();
        assert_eq!(engine.windows(), &[3, 5, 20]);
        assert!(MovingAverageEngine::new(&[]).is_err());
        assert!(MovingAverageEngine::new(&[5, 0]).is_err());
    }

    #[test]
    fn test_compute_at_and_records() {
        let engine = MovingAverageEngine::new(&[2, 4]).unwrap();
        let s = series(&[4.0, 2.0, 6.0, 8.0]);

        let latest = engine.compute_at(&s, 0);
        assert_relative_eq!(latest[&2], 3.0);
        assert_relative_eq!(latest[&4], 5.0);

        let records = engine.records("8306", &s);
        assert_eq!(records.len(), 4);
        assert_eq!(records[0].date, s[0].0);
        assert_relative_eq!(records[3].value(4).unwrap(), 8.0);
        assert_eq!(records[0].value(3), None);
    }

    #[test]
    fn test_empty_series() {
        let table = compute_all(&[], &[5]);
        assert!(table[&5].is_empty());
        assert_eq!(degraded_mean(&[], 0, 5), None);
    }
}
