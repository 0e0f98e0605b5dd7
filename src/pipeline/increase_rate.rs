//! Ratios of the latest price to each of the previous few prices

use crate::error::{Result, StockRankError};
use crate::pipeline::crossing::NO_CROSSING_SENTINEL;
use crate::types::{Instrument, Price};
use serde::{Deserialize, Serialize};

/// Default number of latest prices looked at
pub const DEFAULT_LOOKBACK: usize = 7;

/// `rates[i] = latest / price[i + 1]` for one instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncreaseRates {
    pub instrument: Instrument,
    pub rates: Vec<Option<f64>>,
}

impl IncreaseRates {
    /// Compute `lookback - 1` ratios from newest-first prices.
    ///
    /// Lags with no price behind them (short history) are `None`.
    pub fn compute(instrument: &str, prices: &[Price], lookback: usize) -> Result<Self> {
        let latest = *prices.first().ok_or_else(|| StockRankError::NoData {
            instrument: instrument.to_string(),
        })?;

        let rates = (1..lookback.max(1))
            .map(|lag| {
                prices
                    .get(lag)
                    .filter(|p| **p != 0.0)
                    .map(|p| latest / p)
            })
            .collect();

        Ok(Self {
            instrument: instrument.to_string(),
            rates,
        })
    }

    /// Ratio against the previous price, the primary sort key
    pub fn latest(&self) -> Option<f64> {
        self.rates.first().copied().flatten()
    }

    /// Rates as reports print them, `0.0` where undefined
    pub fn with_sentinels(&self) -> Vec<f64> {
        self.rates
            .iter()
            .map(|r| r.unwrap_or(NO_CROSSING_SENTINEL))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_full_history() {
        let prices = [110.0, 100.0, 55.0, 220.0];
        let rates = IncreaseRates::compute("8316", &prices, 4).unwrap();

        assert_eq!(rates.rates.len(), 3);
        assert_relative_eq!(rates.rates[0].unwrap(), 1.1);
        assert_relative_eq!(rates.rates[1].unwrap(), 2.0);
        assert_relative_eq!(rates.rates[2].unwrap(), 0.5);
        assert_relative_eq!(rates.latest().unwrap(), 1.1);
    }

    #[test]
    fn test_short_history_pads() {
        let rates = IncreaseRates::compute("8316", &[100.0, 50.0], 7).unwrap();
        assert_eq!(rates.rates.len(), 6);
        assert_eq!(rates.with_sentinels(), vec![2.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_single_price_has_no_latest_rate() {
        let rates = IncreaseRates::compute("8316", &[100.0], 7).unwrap();
        assert_eq!(rates.latest(), None);
    }

    #[test]
    fn test_empty_prices() {
        assert!(IncreaseRates::compute("8316", &[], 7).is_err());
    }
}
