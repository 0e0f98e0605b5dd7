//! Run configuration, loaded once from TOML and passed by reference

use crate::calendar::{CalendarResolver, HolidaySet};
use crate::error::{Result, StockRankError};
use crate::pipeline::classifiers::DEFAULT_TREND_WINDOWS;
use crate::pipeline::crossing::DEFAULT_CROSSING_WINDOW;
use crate::pipeline::increase_rate::DEFAULT_LOOKBACK;
use crate::pipeline::moving_average::DEFAULT_WINDOWS;
use crate::pipeline::{CrossingDetector, MovingAverageEngine, SignalPipeline, TrendClassifier};
use crate::sink::{RankedWriter, RetryPolicy, RetryingBatchWriter, SortPass};
use crate::types::PriceField;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Environment variable that overrides `run_mode` at load time
pub const RUN_MODE_ENV: &str = "STOCKRANK_ENV";

/// Whether the calendar gates are enforced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Calendar gates always pass
    Test,
    Prod,
}

impl RunMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RunMode::Test => "test",
            RunMode::Prod => "prod",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunMode {
    type Err = StockRankError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "test" => Ok(RunMode::Test),
            "prod" => Ok(RunMode::Prod),
            other => Err(StockRankError::ConfigError(format!(
                "run mode must be 'test' or 'prod', got '{}'",
                other
            ))),
        }
    }
}

/// Names of the sheet ranges and table the runs use
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetNames {
    pub codes: String,
    pub daily: String,
    pub holidays: String,
    pub daily_rate: String,
    pub intraday: String,
    pub intraday_rate: String,
    pub moving_average: String,
}

impl Default for SheetNames {
    fn default() -> Self {
        Self {
            codes: "code".to_string(),
            daily: "daily".to_string(),
            holidays: "holiday".to_string(),
            daily_rate: "daily_rate".to_string(),
            intraday: "intraday".to_string(),
            intraday_rate: "intraday_rate".to_string(),
            moving_average: "movingavg".to_string(),
        }
    }
}

fn default_timezone() -> String {
    "Asia/Tokyo".to_string()
}

fn default_windows() -> Vec<usize> {
    DEFAULT_WINDOWS.to_vec()
}

fn default_trend_windows() -> [usize; 4] {
    DEFAULT_TREND_WINDOWS
}

fn default_crossing_window() -> usize {
    DEFAULT_CROSSING_WINDOW
}

fn default_lookback() -> usize {
    DEFAULT_LOOKBACK
}

fn default_batch_size() -> usize {
    10
}

fn default_fetch_interval_ms() -> u64 {
    1000
}

/// Immutable run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub run_mode: RunMode,
    /// IANA name of the exchange timezone
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Moving-average windows, sorted and deduplicated by `validate`
    #[serde(default = "default_windows")]
    pub windows: Vec<usize>,
    /// Short to long windows the trend classifier compares
    #[serde(default = "default_trend_windows")]
    pub trend_windows: [usize; 4],
    #[serde(default = "default_crossing_window")]
    pub crossing_window: usize,
    /// Latest prices looked at for increase rates
    #[serde(default = "default_lookback")]
    pub increase_rate_lookback: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Pause between two fetches
    #[serde(default = "default_fetch_interval_ms")]
    pub fetch_interval_ms: u64,
    #[serde(default)]
    pub price_field: PriceField,
    /// Evaluate instruments on the rayon pool
    #[serde(default)]
    pub parallel: bool,
    #[serde(default)]
    pub sheets: SheetNames,
}

impl Config {
    /// Configuration with every default and an explicit run mode
    pub fn new(run_mode: RunMode) -> Self {
        Self {
            run_mode,
            timezone: default_timezone(),
            windows: default_windows(),
            trend_windows: default_trend_windows(),
            crossing_window: default_crossing_window(),
            increase_rate_lookback: default_lookback(),
            batch_size: default_batch_size(),
            retry: RetryPolicy::default(),
            fetch_interval_ms: default_fetch_interval_ms(),
            price_field: PriceField::default(),
            parallel: false,
            sheets: SheetNames::default(),
        }
    }

    /// Load from a TOML file, applying the `STOCKRANK_ENV` override
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let run_mode = std::env::var(RUN_MODE_ENV).ok();
        Self::parse(&text, run_mode.as_deref())
    }

    /// Parse TOML text without consulting the environment
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Self::parse(text, None)
    }

    /// Parse TOML text; `run_mode` takes precedence over the file's value
    pub fn parse(text: &str, run_mode: Option<&str>) -> Result<Self> {
        let mut table: toml::Table = text.parse()?;

        let mode = match run_mode {
            Some(mode) => mode.to_string(),
            None => match table.get("run_mode") {
                Some(toml::Value::String(mode)) => mode.clone(),
                Some(other) => {
                    return Err(StockRankError::ConfigError(format!(
                        "run_mode must be a string, got {}",
                        other
                    )))
                }
                None => {
                    return Err(StockRankError::ConfigError(format!(
                        "run_mode is required ('test' or 'prod'), set it in the file or {}",
                        RUN_MODE_ENV
                    )))
                }
            },
        };
        let mode: RunMode = mode.parse()?;
        table.insert(
            "run_mode".to_string(),
            toml::Value::String(mode.as_str().to_string()),
        );

        let mut config: Config = toml::Value::Table(table).try_into()?;
        config.validate()?;
        log::debug!("loaded config: run_mode={}, timezone={}", config.run_mode, config.timezone);
        Ok(config)
    }

    /// Check every numeric setting and normalise the window list
    pub fn validate(&mut self) -> Result<()> {
        self.windows.sort_unstable();
        self.windows.dedup();

        if self.windows.is_empty() || self.windows.contains(&0) {
            return Err(StockRankError::ConfigError(format!(
                "windows must be non-empty and positive, got {:?}",
                self.windows
            )));
        }
        for window in self.trend_windows {
            if !self.windows.contains(&window) {
                return Err(StockRankError::ConfigError(format!(
                    "trend window {} is not in windows {:?}",
                    window, self.windows
                )));
            }
        }
        if self.crossing_window == 0 {
            return Err(StockRankError::ConfigError(
                "crossing_window must be greater than 0".to_string(),
            ));
        }
        if self.increase_rate_lookback < 2 {
            return Err(StockRankError::ConfigError(format!(
                "increase_rate_lookback must be at least 2, got {}",
                self.increase_rate_lookback
            )));
        }
        if self.batch_size == 0 {
            return Err(StockRankError::ConfigError(
                "batch_size must be greater than 0".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(StockRankError::ConfigError(
                "retry.max_attempts must be greater than 0".to_string(),
            ));
        }
        self.business_timezone()?;
        Ok(())
    }

    pub fn is_test(&self) -> bool {
        self.run_mode == RunMode::Test
    }

    /// Parsed exchange timezone
    pub fn business_timezone(&self) -> Result<Tz> {
        self.timezone.parse::<Tz>().map_err(|e| {
            StockRankError::ConfigError(format!("unknown timezone '{}': {}", self.timezone, e))
        })
    }

    pub fn fetch_interval(&self) -> Duration {
        Duration::from_millis(self.fetch_interval_ms)
    }

    /// Calendar resolver for this run mode; test mode bypasses the gates
    pub fn calendar(&self, holidays: HolidaySet) -> Result<CalendarResolver> {
        let tz = self.business_timezone()?;
        Ok(match self.run_mode {
            RunMode::Test => CalendarResolver::bypassed(holidays, tz),
            RunMode::Prod => CalendarResolver::new(holidays, tz),
        })
    }

    pub fn signal_pipeline(&self) -> Result<SignalPipeline> {
        SignalPipeline::new(
            MovingAverageEngine::new(&self.windows)?,
            TrendClassifier::new(self.trend_windows)?,
            CrossingDetector::new(self.crossing_window)?,
            self.increase_rate_lookback,
        )
    }

    pub fn retry_policy(&self) -> Result<RetryPolicy> {
        RetryPolicy::new(self.retry.max_attempts, self.retry.backoff)
    }

    /// Batched writer ordering records with `passes`
    pub fn ranked_writer(&self, passes: Vec<SortPass>) -> Result<RankedWriter> {
        Ok(RankedWriter::new(
            RetryingBatchWriter::new(self.retry_policy()?),
            self.batch_size,
            passes,
        ))
    }
}
