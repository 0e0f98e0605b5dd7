//! Everything the daily report needs for one instrument

use crate::error::{Result, StockRankError};
use crate::pipeline::classifiers::{TrendClassifier, TrendSnapshot};
use crate::pipeline::crossing::{CrossingDetector, CrossingSignal};
use crate::pipeline::increase_rate::IncreaseRates;
use crate::pipeline::moving_average::{MovingAverageEngine, MovingAverageRecord};
use crate::types::Price;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Daily report entry for one instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySignal {
    pub snapshot: TrendSnapshot,
    pub crossing: CrossingSignal,
    pub rates: IncreaseRates,
}

impl DailySignal {
    pub fn instrument(&self) -> &str {
        &self.snapshot.instrument
    }
}

/// Output of [`SignalPipeline::evaluate`]
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub signal: DailySignal,
    /// One record per date in the series, newest first
    pub moving_averages: Vec<MovingAverageRecord>,
}

/// Runs the indicator chain over one instrument's series.
///
/// Holds no per-instrument state, so one pipeline can be shared across
/// threads and evaluated in any order with the same results.
#[derive(Debug, Clone)]
pub struct SignalPipeline {
    averages: MovingAverageEngine,
    classifier: TrendClassifier,
    crossing: CrossingDetector,
    lookback: usize,
}

impl SignalPipeline {
    /// Build a pipeline; the trend and crossing windows must be computed
    /// by the moving-average engine.
    pub fn new(
        averages: MovingAverageEngine,
        classifier: TrendClassifier,
        crossing: CrossingDetector,
        lookback: usize,
    ) -> Result<Self> {
        let windows = averages.windows();
        for window in classifier.windows() {
            if !windows.contains(&window) {
                return Err(StockRankError::ConfigError(format!(
                    "trend window {} is not in the moving-average windows {:?}",
                    window, windows
                )));
            }
        }
        if lookback < 2 {
            return Err(StockRankError::ConfigError(format!(
                "increase-rate lookback must be at least 2, got {}",
                lookback
            )));
        }

        Ok(Self {
            averages,
            classifier,
            crossing,
            lookback,
        })
    }

    pub fn averages(&self) -> &MovingAverageEngine {
        &self.averages
    }

    pub fn lookback(&self) -> usize {
        self.lookback
    }

    /// Evaluate a newest-first series
    pub fn evaluate(&self, instrument: &str, series: &[(NaiveDate, Price)]) -> Result<Evaluation> {
        let records = self.averages.records(instrument, series);
        let latest = records.first().ok_or_else(|| StockRankError::NoData {
            instrument: instrument.to_string(),
        })?;

        let snapshot = self.classifier.snapshot(latest)?;
        let crossing = self.crossing.detect_series(instrument, series)?;

        let prices: Vec<Price> = series.iter().map(|(_, p)| *p).collect();
        let rates = IncreaseRates::compute(instrument, &prices, self.lookback)?;

        Ok(Evaluation {
            signal: DailySignal {
                snapshot,
                crossing,
                rates,
            },
            moving_averages: records,
        })
    }
}

impl Default for SignalPipeline {
    fn default() -> Self {
        Self {
            averages: MovingAverageEngine::default(),
            classifier: TrendClassifier::default(),
            crossing: CrossingDetector::default(),
            lookback: crate::pipeline::increase_rate::DEFAULT_LOOKBACK,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::TrendPattern;
    use chrono::Duration;

    fn rising_series(len: usize) -> Vec<(NaiveDate, Price)> {
        let latest = NaiveDate::from_ymd_opt(2024, 6, 28).unwrap();
        (0..len)
            .map(|i| (latest - Duration::days(i as i64), 200.0 - i as f64))
            .collect()
    }

    #[test]
    fn test_rising_prices_are_ppp() {
        let evaluation = SignalPipeline::default()
            .evaluate("8306", &rising_series(120))
            .unwrap();

        assert_eq!(evaluation.signal.snapshot.classification, TrendPattern::Ppp);
        assert_eq!(evaluation.moving_averages.len(), 120);
        assert_eq!(evaluation.signal.rates.rates.len(), 6);
        // steady rise never crosses the 5-day average from below in one step
        assert!(!evaluation.signal.crossing.is_crossed());
    }

    #[test]
    fn test_short_series_is_an_instrument_error() {
        let err = SignalPipeline::default()
            .evaluate("8306", &rising_series(1))
            .unwrap_err();
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_trend_windows_must_be_computed() {
        let result = SignalPipeline::new(
            MovingAverageEngine::new(&[5, 20]).unwrap(),
            TrendClassifier::default(),
            CrossingDetector::default(),
            7,
        );
        assert!(result.is_err());
    }
}
