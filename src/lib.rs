//! # rusty-stockrank
//!
//! Business-day-aware price history and indicator engine for ranking
//! equities.
//!
//! Daily bars and intraday quotes are ingested without duplicates, moving
//! averages are computed over several windows, and each instrument gets a
//! trend pattern, a crossing signal and increase rates. Ranked rows go out
//! through a retrying batch writer that reports target versus written
//! counts.
//!
//! ## Example
//!
//! ```rust,no_run
//! use rusty_stockrank::prelude::*;
//! use chrono::Utc;
//!
//! fn main() -> Result<()> {
//!     let config = Config::load(std::path::Path::new("stockrank.toml"))?;
//!     let mut sheet = CsvSheet::open("data")?;
//!     let mut table = CsvSheet::open("data/table")?;
//!
//!     let ranker = StockRanker::new(&config)?;
//!     let report = ranker.run_daily_signals(&mut sheet, &mut table, Utc::now())?;
//!     println!("wrote {} of {} rows", report.written, report.target);
//!     Ok(())
//! }
//! ```

pub mod calendar;
pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod sink;
pub mod types;

pub mod prelude {
    //! Commonly used types and traits
    pub use crate::calendar::{BusinessCalendar, CalendarResolver, HolidaySet};
    pub use crate::config::{Config, RunMode};
    pub use crate::data::{QuoteHistory, SeriesStore};
    pub use crate::engine::{RunReport, StockRanker};
    pub use crate::error::{Result, StockRankError};
    pub use crate::pipeline::{
        CrossingDetector, CrossingSignal, IncreaseRates, MovingAverageEngine, SignalPipeline,
        TrendClassifier, TrendPattern, TrendSnapshot,
    };
    pub use crate::sink::{
        CsvFetcher, CsvSheet, Fetcher, RankedWriter, RetryPolicy, RetryingBatchWriter, Sheet,
        Table, ToRow,
    };
    pub use crate::types::*;
}
