//! Error types for rusty-stockrank

use chrono::NaiveDate;
use thiserror::Error;

/// Main error type for rusty-stockrank
#[derive(Error, Debug)]
pub enum StockRankError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("No business day found within {days} days before {from}")]
    NoBusinessDayFound { from: NaiveDate, days: u32 },

    #[error("No data for instrument {instrument}")]
    NoData { instrument: String },

    #[error("Insufficient history for {instrument}: required {required}, available {available}")]
    InsufficientHistory {
        instrument: String,
        required: usize,
        available: usize,
    },

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Fetch error for {instrument}: {reason}")]
    FetchError { instrument: String, reason: String },

    #[error("Sink error: {0}")]
    SinkError(String),

    #[error("Sink returned non-success status {status}")]
    SinkStatus { status: u16 },

    #[error("{operation} failed after {attempts} attempts")]
    RetryExhausted { operation: String, attempts: u32 },

    #[error("Incomplete write: target {target}, written {written}")]
    IncompleteWrite { target: usize, written: usize },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

impl StockRankError {
    /// Whether this error must stop the whole run.
    ///
    /// Per-instrument problems (missing data, unparsable prices, failed
    /// fetches) are recovered by skipping the instrument; everything that
    /// makes the run's output untrustworthy is fatal.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            StockRankError::NoData { .. }
                | StockRankError::InsufficientHistory { .. }
                | StockRankError::ParseError(_)
                | StockRankError::FetchError { .. }
                | StockRankError::SinkError(_)
                | StockRankError::SinkStatus { .. }
        )
    }
}

/// Result type alias for rusty-stockrank operations
pub type Result<T> = std::result::Result<T, StockRankError>;
