//! Trend classification from the ordering of moving averages
//!
//! A "perfect order" (PPP) is short > mid > long > longest: every average
//! sits above the slower one. The classifier labels each instrument with the
//! most specific ordering its averages satisfy.

use crate::error::{Result, StockRankError};
use crate::pipeline::moving_average::MovingAverageRecord;
use crate::types::Instrument;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Windows used for classification: short, mid, long, longest
pub const DEFAULT_TREND_WINDOWS: [usize; 4] = [5, 20, 60, 100];

/// `values[0] > values[1] > ...`, stopping at the first violation
pub fn is_strictly_decreasing(values: &[f64]) -> bool {
    is_ordered_by(values, |a, b| a > b)
}

/// `values[0] >= values[1] >= ...`, stopping at the first violation
pub fn is_non_increasing(values: &[f64]) -> bool {
    is_ordered_by(values, |a, b| a >= b)
}

fn is_ordered_by(values: &[f64], holds: impl Fn(f64, f64) -> bool) -> bool {
    values.windows(2).all(|pair| holds(pair[0], pair[1]))
}

/// Trend pattern labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrendPattern {
    #[serde(rename = "ppp")]
    Ppp,
    #[serde(rename = "semiPPP")]
    SemiPpp,
    #[serde(rename = "oppositeSemiPPP")]
    OppositeSemiPpp,
    #[serde(rename = "oppositePPP")]
    OppositePpp,
    #[serde(rename = "non")]
    Non,
}

impl TrendPattern {
    /// Report rank, higher sorts first
    pub fn rank(self) -> i64 {
        match self {
            TrendPattern::Ppp => 4,
            TrendPattern::SemiPpp => 3,
            TrendPattern::OppositeSemiPpp => 2,
            TrendPattern::OppositePpp => 1,
            TrendPattern::Non => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TrendPattern::Ppp => "ppp",
            TrendPattern::SemiPpp => "semiPPP",
            TrendPattern::OppositeSemiPpp => "oppositeSemiPPP",
            TrendPattern::OppositePpp => "oppositePPP",
            TrendPattern::Non => "non",
        }
    }
}

impl fmt::Display for TrendPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Averages and label for one instrument on one date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendSnapshot {
    pub instrument: Instrument,
    pub date: NaiveDate,
    /// Averages in the classifier's window order
    pub moving_averages: [f64; 4],
    pub classification: TrendPattern,
}

/// Labels four moving averages, most specific pattern first
#[derive(Debug, Clone)]
pub struct TrendClassifier {
    windows: [usize; 4],
}

impl TrendClassifier {
    /// Create a classifier reading `windows` as short, mid, long, longest
    pub fn new(windows: [usize; 4]) -> Result<Self> {
        if !windows.windows(2).all(|pair| pair[0] < pair[1]) {
            return Err(StockRankError::ConfigError(format!(
                "trend windows must be strictly increasing: {:?}",
                windows
            )));
        }
        Ok(Self { windows })
    }

    pub fn windows(&self) -> [usize; 4] {
        self.windows
    }

    /// Classify `[short, mid, long, longest]` averages.
    ///
    /// First match wins; each check is stricter than the ones after it.
    pub fn classify(averages: [f64; 4]) -> TrendPattern {
        let [short, mid, long, longest] = averages;

        if is_strictly_decreasing(&[short, mid, long, longest]) {
            TrendPattern::Ppp
        } else if is_strictly_decreasing(&[short, mid, long]) {
            TrendPattern::SemiPpp
        } else if is_strictly_decreasing(&[longest, long, mid, short]) {
            TrendPattern::OppositePpp
        } else if is_strictly_decreasing(&[long, mid, short]) && longest > short {
            TrendPattern::OppositeSemiPpp
        } else {
            TrendPattern::Non
        }
    }

    /// Snapshot from a moving-average record holding all four windows
    pub fn snapshot(&self, record: &MovingAverageRecord) -> Result<TrendSnapshot> {
        let mut averages = [0.0; 4];
        for (slot, &window) in averages.iter_mut().zip(self.windows.iter()) {
            *slot = record.value(window).ok_or_else(|| {
                StockRankError::ConfigError(format!(
                    "moving average for window {} was not computed",
                    window
                ))
            })?;
        }

        Ok(TrendSnapshot {
            instrument: record.instrument.clone(),
            date: record.date,
            moving_averages: averages,
            classification: Self::classify(averages),
        })
    }
}

impl Default for TrendClassifier {
    fn default() -> Self {
        Self {
            windows: DEFAULT_TREND_WINDOWS,
        }
    }
}
