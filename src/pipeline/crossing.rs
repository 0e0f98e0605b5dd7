//! Detects the close crossing its short moving average between two sessions

use crate::error::{Result, StockRankError};
use crate::pipeline::classifiers::is_non_increasing;
use crate::pipeline::moving_average::degraded_mean;
use crate::types::{Instrument, Price};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Value written to reports when no crossing happened
pub const NO_CROSSING_SENTINEL: f64 = 0.0;

/// Default short window the close is compared against
pub const DEFAULT_CROSSING_WINDOW: usize = 5;

/// Crossing result for one instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossingSignal {
    pub instrument: Instrument,
    pub prior_close: Price,
    pub latest_close: Price,
    pub moving_average: f64,
    /// `latest / prior` when crossed, `None` otherwise
    pub increasing_rate: Option<f64>,
}

impl CrossingSignal {
    pub fn is_crossed(&self) -> bool {
        self.increasing_rate.is_some()
    }

    /// Rate as reports print it: the sentinel stands in for "no crossing"
    pub fn rate_or_sentinel(&self) -> f64 {
        self.increasing_rate.unwrap_or(NO_CROSSING_SENTINEL)
    }
}

/// Compares the two latest closes against a short moving average
#[derive(Debug, Clone)]
pub struct CrossingDetector {
    window: usize,
}

impl CrossingDetector {
    pub fn new(window: usize) -> Result<Self> {
        if window == 0 {
            return Err(StockRankError::ConfigError(
                "crossing window must be greater than 0".to_string(),
            ));
        }
        Ok(Self { window })
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Crossed when the average lies between the two closes, ends included.
    ///
    /// A zero prior close has no defined rate and never counts as crossed.
    pub fn detect(
        instrument: &str,
        latest: Price,
        prior: Price,
        moving_average: f64,
    ) -> CrossingSignal {
        let crossed = is_non_increasing(&[latest, moving_average, prior])
            || is_non_increasing(&[prior, moving_average, latest]);

        let increasing_rate = if crossed && prior != 0.0 {
            Some(latest / prior)
        } else {
            None
        };

        CrossingSignal {
            instrument: instrument.to_string(),
            prior_close: prior,
            latest_close: latest,
            moving_average,
            increasing_rate,
        }
    }

    /// Detect on a newest-first series, using the average at the latest date
    pub fn detect_series(
        &self,
        instrument: &str,
        series: &[(NaiveDate, Price)],
    ) -> Result<CrossingSignal> {
        if series.len() < 2 {
            return Err(StockRankError::InsufficientHistory {
                instrument: instrument.to_string(),
                required: 2,
                available: series.len(),
            });
        }

        let closes: Vec<Price> = series.iter().map(|(_, p)| *p).collect();
        let moving_average =
            degraded_mean(&closes, 0, self.window).ok_or_else(|| StockRankError::NoData {
                instrument: instrument.to_string(),
            })?;

        Ok(Self::detect(instrument, closes[0], closes[1], moving_average))
    }
}

impl Default for CrossingDetector {
    fn default() -> Self {
        Self {
            window: DEFAULT_CROSSING_WINDOW,
        }
    }
}
