//! Orchestration of the daily ingest, daily signal and intraday runs
//!
//! Every run follows the same shape: load the holiday feed, check the
//! calendar gate, process instruments one at a time (skipping the ones
//! whose data is bad), then hand ranked rows to the retrying writer. A
//! write that falls short of its target aborts the run.

use crate::calendar::{CalendarResolver, HolidaySet};
use crate::config::Config;
use crate::data::{resolve_timestamp, QuoteHistory, QuoteReading, SeriesStore};
use crate::error::{Result, StockRankError};
use crate::pipeline::{DailySignal, IncreaseRates, MovingAverageRecord, SignalPipeline};
use crate::sink::retry::WriteOutcome;
use crate::sink::{
    is_success_status, Fetcher, RankedWriter, RetryPolicy, RetryingBatchWriter, Row, Sheet,
    SheetRange, Table, TableTarget, ToRow,
};
use crate::types::{parse_price, DailyBar, Instrument, IntradayQuote};
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use rayon::prelude::*;
use serde::Serialize;
use std::thread;

/// Outcome of one run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    /// Whether the calendar gate let the run through
    pub gate_open: bool,
    /// Rows handed to the writer
    pub target: usize,
    /// Rows confirmed written
    pub written: usize,
    /// Instruments left out, with the reason
    pub skipped: Vec<(Instrument, String)>,
}

impl RunReport {
    fn open() -> Self {
        Self {
            gate_open: true,
            ..Self::default()
        }
    }

    fn absorb(&mut self, outcome: WriteOutcome) {
        self.target += outcome.target;
        self.written += outcome.written;
    }

    fn skip(&mut self, instrument: &str, error: &StockRankError) {
        log::debug!("skipping {}: {}", instrument, error);
        self.skipped.push((instrument.to_string(), error.to_string()));
    }

    /// Emit one warning listing the instruments skipped since index `from`
    fn log_skipped(&self, run: &str, from: usize) {
        let Some(skipped) = self.skipped.get(from..).filter(|s| !s.is_empty()) else {
            return;
        };
        let listed: Vec<String> = skipped
            .iter()
            .map(|(code, reason)| format!("{} ({})", code, reason))
            .collect();
        log::warn!(
            "{}: skipped {} instruments: {}",
            run,
            skipped.len(),
            listed.join(", ")
        );
    }

    pub fn is_complete(&self) -> bool {
        self.target == self.written
    }
}

/// Re-raise fatal errors; anything else skips the instrument
fn recover<T>(report: &mut RunReport, instrument: &str, result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            report.skip(instrument, &e);
            Ok(None)
        }
    }
}

/// Runs the three jobs against the configured collaborators
pub struct StockRanker<'a> {
    config: &'a Config,
    pipeline: SignalPipeline,
    policy: RetryPolicy,
    timezone: Tz,
}

impl<'a> StockRanker<'a> {
    pub fn new(config: &'a Config) -> Result<Self> {
        Ok(Self {
            config,
            pipeline: config.signal_pipeline()?,
            policy: config.retry_policy()?,
            timezone: config.business_timezone()?,
        })
    }

    pub fn config(&self) -> &Config {
        self.config
    }

    /// Read a whole range, retrying transient failures
    fn read_range<S: Sheet + ?Sized>(&self, sheet: &mut S, range: &str) -> Result<Vec<Vec<String>>> {
        self.policy
            .run(&format!("read {}", range), |_| sheet.read_rows(range))
    }

    fn clear_range<S: Sheet + ?Sized>(&self, sheet: &mut S, range: &str) -> Result<()> {
        self.policy.run(&format!("clear {}", range), |_| {
            let status = sheet.clear(range)?;
            if !is_success_status(status) {
                return Err(StockRankError::SinkStatus { status });
            }
            Ok(())
        })
    }

    /// Holiday feed as a calendar for this run mode.
    ///
    /// An unreadable feed stops the run in any mode. An empty feed in prod
    /// would make every weekday a business day, so it stops the run too.
    pub fn load_calendar<S: Sheet + ?Sized>(&self, sheet: &mut S) -> Result<CalendarResolver> {
        let rows = self.read_range(sheet, &self.config.sheets.holidays)?;
        let holidays = HolidaySet::parse(rows.iter().filter_map(|r| r.first())).map_err(|e| {
            StockRankError::ConfigError(format!(
                "holiday feed '{}' is unreadable: {}",
                self.config.sheets.holidays, e
            ))
        })?;

        if holidays.is_empty() && !self.config.is_test() {
            return Err(StockRankError::ConfigError(format!(
                "holiday feed '{}' is empty",
                self.config.sheets.holidays
            )));
        }
        log::debug!("loaded {} holidays", holidays.len());
        self.config.calendar(holidays)
    }

    /// Instrument codes in sheet order
    pub fn load_codes<S: Sheet + ?Sized>(&self, sheet: &mut S) -> Result<Vec<Instrument>> {
        let rows = self.read_range(sheet, &self.config.sheets.codes)?;
        Ok(rows
            .iter()
            .filter_map(|r| r.first())
            .map(|code| code.trim().to_string())
            .filter(|code| !code.is_empty())
            .collect())
    }

    /// Stored daily rows as a store; malformed rows are logged and left out
    pub fn load_daily<S: Sheet + ?Sized>(&self, sheet: &mut S, today: NaiveDate) -> Result<SeriesStore> {
        let rows = self.read_range(sheet, &self.config.sheets.daily)?;
        let mut bars = Vec::with_capacity(rows.len());
        for row in &rows {
            let parsed = match row.split_first() {
                Some((code, fields)) => DailyBar::from_fields(code.trim(), fields, today),
                None => continue,
            };
            match parsed {
                Ok(bar) => bars.push(bar),
                Err(e) => log::warn!("ignoring stored daily row {:?}: {}", row, e),
            }
        }

        let mut store = SeriesStore::with_price_field(self.config.price_field);
        let report = store.ingest(bars);
        if report.rejected_duplicates > 0 {
            log::warn!(
                "daily sheet holds {} duplicate rows",
                report.rejected_duplicates
            );
        }
        Ok(store)
    }

    fn pause(&self, index: usize) {
        let interval = self.config.fetch_interval();
        if index > 0 && !interval.is_zero() {
            thread::sleep(interval);
        }
    }

    /// Fetch new daily bars and append the ones not stored yet
    pub fn run_daily_ingest<S, F>(&self, sheet: &mut S, fetcher: &F, now: DateTime<Utc>) -> Result<RunReport>
    where
        S: Sheet + ?Sized,
        F: Fetcher + ?Sized,
    {
        let calendar = self.load_calendar(sheet)?;
        let today = calendar.local_date(&now);
        if !calendar.is_business_day(today) {
            log::info!("{} is not a business day, skipping daily ingest", today);
            return Ok(RunReport::default());
        }

        let codes = self.load_codes(sheet)?;
        let mut store = self.load_daily(sheet, today)?;
        let mut report = RunReport::open();
        let mut fetched = Vec::new();

        for (index, code) in codes.iter().enumerate() {
            self.pause(index);
            let bars = fetcher.fetch_daily(code).and_then(|rows| {
                rows.iter()
                    .map(|fields| DailyBar::from_fields(code, fields, today))
                    .collect::<Result<Vec<_>>>()
            });
            if let Some(bars) = recover(&mut report, code, bars)? {
                fetched.extend(bars);
            }
        }

        let ingest = store.ingest(fetched);
        log::info!(
            "daily ingest: {} new bars, {} already stored",
            ingest.merged(),
            ingest.rejected_duplicates
        );

        let rows: Vec<Row> = ingest.accepted.iter().map(ToRow::to_row).collect();
        let writer = self.config.ranked_writer(Vec::new())?;
        let outcome = writer.write_rows(&mut SheetRange::new(sheet, &self.config.sheets.daily), &rows);
        report.absorb(outcome);
        report.log_skipped("daily ingest", 0);
        log::info!("daily ingest target: {}, written: {}", report.target, report.written);

        outcome.ensure_complete()?;
        Ok(report)
    }

    fn evaluate(
        &self,
        store: &SeriesStore,
        code: &str,
        today: NaiveDate,
    ) -> Result<(DailySignal, Vec<MovingAverageRecord>)> {
        let series = store.ordered_closes(code, today, 0)?;
        let evaluation = self.pipeline.evaluate(code, &series)?;
        Ok((evaluation.signal, evaluation.moving_averages))
    }

    /// Per-instrument results in `codes` order, sequential or on rayon
    fn evaluate_all(
        &self,
        store: &SeriesStore,
        codes: &[Instrument],
        today: NaiveDate,
    ) -> Vec<Result<(DailySignal, Vec<MovingAverageRecord>)>> {
        if self.config.parallel {
            codes
                .par_iter()
                .map(|code| self.evaluate(store, code, today))
                .collect()
        } else {
            codes
                .iter()
                .map(|code| self.evaluate(store, code, today))
                .collect()
        }
    }

    fn moving_average_columns(&self) -> Vec<String> {
        let mut columns = vec!["code".to_string(), "date".to_string()];
        columns.extend(
            self.pipeline
                .averages()
                .windows()
                .iter()
                .map(|w| format!("moving{}", w)),
        );
        columns
    }

    /// Rebuild the ranked daily report and store the moving averages
    pub fn run_daily_signals<S, T>(&self, sheet: &mut S, table: &mut T, now: DateTime<Utc>) -> Result<RunReport>
    where
        S: Sheet + ?Sized,
        T: Table + ?Sized,
    {
        let calendar = self.load_calendar(sheet)?;
        let today = calendar.local_date(&now);
        if !calendar.is_previous_day_business_day(today) {
            log::info!("day before {} was not a business day, skipping daily signals", today);
            return Ok(RunReport::default());
        }

        let codes = self.load_codes(sheet)?;
        let store = self.load_daily(sheet, today)?;
        let mut report = RunReport::open();
        let mut signals = Vec::with_capacity(codes.len());
        let mut averages: Vec<Vec<Row>> = Vec::with_capacity(codes.len());

        for (code, result) in codes.iter().zip(self.evaluate_all(&store, &codes, today)) {
            if let Some((signal, records)) = recover(&mut report, code, result)? {
                averages.push(records.iter().map(ToRow::to_row).collect());
                signals.push(signal);
            }
        }
        report.log_skipped("daily signals", 0);

        // One insert per instrument, however long its history
        let table_writer = RetryingBatchWriter::new(self.policy);
        let columns = self.moving_average_columns();
        let table_name = self.config.sheets.moving_average.as_str();
        let mut sink = TableTarget::new(table, table_name, columns);
        for rows in &averages {
            let outcome = table_writer.write(&mut sink, rows);
            report.absorb(outcome);
            outcome.ensure_complete()?;
        }

        let writer = self.config.ranked_writer(RankedWriter::daily_passes())?;

        let range = self.config.sheets.daily_rate.as_str();
        self.clear_range(sheet, range)?;
        let outcome = writer.write(&mut SheetRange::new(sheet, range), signals);
        report.absorb(outcome);
        log::info!("daily signals target: {}, written: {}", report.target, report.written);

        outcome.ensure_complete()?;
        Ok(report)
    }

    fn fetch_quote<F: Fetcher + ?Sized>(&self, fetcher: &F, code: &str, now: &DateTime<Tz>) -> Result<IntradayQuote> {
        let raw = fetcher.fetch_intraday(code)?;
        let reading = QuoteReading::parse(&raw.time_text)?;
        let timestamp = resolve_timestamp(now, reading)?;
        Ok(IntradayQuote::new(code, timestamp, parse_price(&raw.price_text)?))
    }

    /// Record the current quotes and rebuild the intraday rate ranking
    pub fn run_intraday<S, F>(&self, sheet: &mut S, fetcher: &F, now: DateTime<Utc>) -> Result<RunReport>
    where
        S: Sheet + ?Sized,
        F: Fetcher + ?Sized,
    {
        let calendar = self.load_calendar(sheet)?;
        let local_now = now.with_timezone(&self.timezone);
        let today = local_now.date_naive();
        if !calendar.is_business_day(today) {
            log::info!("{} is not a business day, skipping intraday", today);
            return Ok(RunReport::default());
        }

        let codes = self.load_codes(sheet)?;
        let mut report = RunReport::open();
        let mut quotes = Vec::with_capacity(codes.len());

        for (index, code) in codes.iter().enumerate() {
            self.pause(index);
            if let Some(quote) = recover(&mut report, code, self.fetch_quote(fetcher, code, &local_now))? {
                quotes.push(quote);
            }
        }
        report.log_skipped("intraday fetch", 0);
        let fetch_skips = report.skipped.len();

        let writer = self.config.ranked_writer(RankedWriter::intraday_passes())?;
        let rows: Vec<Row> = quotes.iter().map(ToRow::to_row).collect();
        let outcome = writer.write_rows(&mut SheetRange::new(sheet, &self.config.sheets.intraday), &rows);
        report.absorb(outcome);
        outcome.ensure_complete()?;

        let stored = self.read_range(sheet, &self.config.sheets.intraday)?;
        let history = QuoteHistory::from_quotes(stored.iter().filter_map(|row| {
            IntradayQuote::from_fields(row)
                .map_err(|e| log::warn!("ignoring stored intraday row {:?}: {}", row, e))
                .ok()
        }));

        let lookback = self.pipeline.lookback();
        let mut rates = Vec::with_capacity(codes.len());
        for code in &codes {
            let computed = history
                .latest_prices(code, lookback)
                .and_then(|prices| IncreaseRates::compute(code, &prices, lookback));
            if let Some(computed) = recover(&mut report, code, computed)? {
                rates.push(computed);
            }
        }
        report.log_skipped("intraday rates", fetch_skips);

        let range = self.config.sheets.intraday_rate.as_str();
        self.clear_range(sheet, range)?;
        let outcome = writer.write(&mut SheetRange::new(sheet, range), rates);
        report.absorb(outcome);
        log::info!("intraday target: {}, written: {}", report.target, report.written);

        outcome.ensure_complete()?;
        Ok(report)
    }
}
