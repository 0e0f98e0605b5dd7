//! Market data handling
//!
//! - `store`: daily bars per instrument, de-duplicated by (instrument, date)
//! - `intraday`: dating intraday readings and keeping their history

pub mod intraday;
pub mod store;

pub use intraday::{resolve_timestamp, QuoteHistory, QuoteReading};
pub use store::{IngestReport, SeriesStore};
