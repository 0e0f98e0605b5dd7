//! End-to-end runs over file-backed sheets and an in-memory fetcher

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use rusty_stockrank::prelude::*;
use rusty_stockrank::sink::{Cell, RawIntradayQuote};
use std::cell::Cell as Counter;
use std::collections::HashMap;

#[derive(Default)]
struct MemoryFetcher {
    daily: HashMap<String, Vec<Vec<String>>>,
    intraday: HashMap<String, RawIntradayQuote>,
    calls: Counter<usize>,
}

impl MemoryFetcher {
    fn missing(instrument: &str) -> StockRankError {
        StockRankError::FetchError {
            instrument: instrument.to_string(),
            reason: "page not found".to_string(),
        }
    }
}

impl Fetcher for MemoryFetcher {
    fn fetch_daily(&self, instrument: &str) -> Result<Vec<Vec<String>>> {
        self.calls.set(self.calls.get() + 1);
        self.daily
            .get(instrument)
            .cloned()
            .ok_or_else(|| Self::missing(instrument))
    }

    fn fetch_intraday(&self, instrument: &str) -> Result<RawIntradayQuote> {
        self.calls.set(self.calls.get() + 1);
        self.intraday
            .get(instrument)
            .cloned()
            .ok_or_else(|| Self::missing(instrument))
    }
}

fn tokyo(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    chrono_tz::Asia::Tokyo
        .with_ymd_and_hms(y, m, d, h, 0, 0)
        .unwrap()
        .with_timezone(&Utc)
}

/// Daily rows ending on `last`, oldest first, one per calendar day
fn daily_rows(last: NaiveDate, closes: &[f64]) -> Vec<Vec<String>> {
    let len = closes.len() as i64;
    closes
        .iter()
        .enumerate()
        .map(|(i, close)| {
            let date = last - Duration::days(len - 1 - i as i64);
            let price = close.to_string();
            vec![
                date.format("%Y/%m/%d").to_string(),
                price.clone(),
                price.clone(),
                price.clone(),
                price.clone(),
                "12,300".to_string(),
                price,
            ]
        })
        .collect()
}

/// Flat at 100 for nine sessions, then `latest`
fn jump_to(latest: f64) -> Vec<f64> {
    let mut closes = vec![100.0; 9];
    closes.push(latest);
    closes
}

fn test_config() -> Config {
    let mut config = Config::new(RunMode::Test);
    config.retry = RetryPolicy::immediate(3);
    config.fetch_interval_ms = 0;
    config
}

fn setup() -> (tempfile::TempDir, CsvSheet, MemoryFetcher) {
    let dir = tempfile::tempdir().unwrap();
    let mut sheet = CsvSheet::open(dir.path()).unwrap();
    let codes: Vec<Vec<Cell>> = ["1001", "1002", "1003", "1004"]
        .iter()
        .map(|c| vec![Cell::from(*c)])
        .collect();
    sheet.append_rows("code", &codes).unwrap();

    let last = NaiveDate::from_ymd_opt(2024, 1, 11).unwrap();
    let rising: Vec<f64> = (0..120).map(|i| 100.0 + i as f64).collect();

    let mut fetcher = MemoryFetcher::default();
    fetcher.daily.insert("1001".to_string(), daily_rows(last, &rising));
    fetcher.daily.insert("1002".to_string(), daily_rows(last, &jump_to(105.0)));
    fetcher.daily.insert("1004".to_string(), daily_rows(last, &jump_to(102.0)));
    fetcher.intraday.insert(
        "1001".to_string(),
        RawIntradayQuote {
            time_text: "Price(06:00)".to_string(),
            price_text: "110".to_string(),
        },
    );
    fetcher.intraday.insert(
        "1002".to_string(),
        RawIntradayQuote {
            time_text: "Price(06:00)".to_string(),
            price_text: "190".to_string(),
        },
    );

    (dir, sheet, fetcher)
}

#[test]
fn test_daily_ingest_skips_bad_instruments_and_dedups() {
    let (_dir, mut sheet, fetcher) = setup();
    let config = test_config();
    let ranker = StockRanker::new(&config).unwrap();
    let now = tokyo(2024, 1, 12, 18);

    let report = ranker.run_daily_ingest(&mut sheet, &fetcher, now).unwrap();
    assert!(report.gate_open);
    assert_eq!(report.target, 140);
    assert_eq!(report.written, 140);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].0, "1003");
    assert_eq!(sheet.read_rows("daily").unwrap().len(), 140);

    // Same pages again: nothing new to write
    let again = ranker.run_daily_ingest(&mut sheet, &fetcher, now).unwrap();
    assert_eq!((again.target, again.written), (0, 0));
    assert_eq!(sheet.read_rows("daily").unwrap().len(), 140);
}

#[test]
fn test_daily_signals_rank_by_trend_then_crossing_rate() {
    let (dir, mut sheet, fetcher) = setup();
    let config = test_config();
    let ranker = StockRanker::new(&config).unwrap();
    let now = tokyo(2024, 1, 12, 18);
    ranker.run_daily_ingest(&mut sheet, &fetcher, now).unwrap();

    let mut table = CsvSheet::open(dir.path().join("table")).unwrap();
    let report = ranker.run_daily_signals(&mut sheet, &mut table, now).unwrap();
    assert!(report.is_complete());
    // 1003 has no stored history
    assert_eq!(report.skipped.len(), 1);

    let rows = sheet.read_rows("daily_rate").unwrap();
    let codes: Vec<&str> = rows.iter().map(|r| r[0].as_str()).collect();
    assert_eq!(codes, vec!["1001", "1002", "1004"]);

    assert_eq!(rows[0][1], "2024/01/11");
    assert_eq!(rows[0][2], "ppp");
    assert_eq!(rows[0][9], "0");
    assert_eq!(rows[1][2], "non");
    assert_eq!(rows[1][9], "1.05");
    assert_eq!(rows[2][9], "1.02");

    // One moving-average row per stored bar, one column per window
    let averages = table.read_rows("movingavg").unwrap();
    assert_eq!(averages.len(), 140);
    assert_eq!(averages[0].len(), 2 + 7);

    // The report is rebuilt, not appended to
    ranker.run_daily_signals(&mut sheet, &mut table, now).unwrap();
    assert_eq!(sheet.read_rows("daily_rate").unwrap().len(), 3);
    assert_eq!(table.read_rows("movingavg").unwrap().len(), 140);
}

#[test]
fn test_sequential_and_parallel_runs_agree() {
    let (dir, mut sheet, fetcher) = setup();
    let now = tokyo(2024, 1, 12, 18);
    let sequential = test_config();
    let mut parallel = test_config();
    parallel.parallel = true;

    StockRanker::new(&sequential)
        .unwrap()
        .run_daily_ingest(&mut sheet, &fetcher, now)
        .unwrap();

    let mut table = CsvSheet::open(dir.path().join("table")).unwrap();
    StockRanker::new(&sequential)
        .unwrap()
        .run_daily_signals(&mut sheet, &mut table, now)
        .unwrap();
    let first = sheet.read_rows("daily_rate").unwrap();

    StockRanker::new(&parallel)
        .unwrap()
        .run_daily_signals(&mut sheet, &mut table, now)
        .unwrap();
    assert_eq!(sheet.read_rows("daily_rate").unwrap(), first);
}

#[test]
fn test_intraday_quotes_and_rates() {
    let (_dir, mut sheet, fetcher) = setup();
    sheet
        .append_rows(
            "intraday",
            &[
                vec![Cell::from("1001"), Cell::from("2024/01/12 10:00"), Cell::from(100.0)],
                vec![Cell::from("1002"), Cell::from("2024/01/12 10:00"), Cell::from(200.0)],
            ],
        )
        .unwrap();

    let config = test_config();
    let ranker = StockRanker::new(&config).unwrap();
    let report = ranker
        .run_intraday(&mut sheet, &fetcher, tokyo(2024, 1, 12, 18))
        .unwrap();
    assert!(report.is_complete());

    let quotes = sheet.read_rows("intraday").unwrap();
    assert_eq!(quotes.len(), 4);
    assert_eq!(quotes[2], vec!["1001", "2024/01/12 15:00", "110"]);

    let rates = sheet.read_rows("intraday_rate").unwrap();
    assert_eq!(rates.len(), 2);
    assert_eq!(rates[0], vec!["1001", "1.1", "0", "0", "0", "0", "0"]);
    assert_eq!(rates[1][0], "1002");
    assert_eq!(rates[1][1], "0.95");
}

#[test]
fn test_prod_gate_closed_on_holiday_fetches_nothing() {
    let (_dir, mut sheet, fetcher) = setup();
    sheet
        .append_rows("holiday", &[vec![Cell::from("2024/01/08")]])
        .unwrap();

    let config = {
        let mut config = test_config();
        config.run_mode = RunMode::Prod;
        config
    };
    let ranker = StockRanker::new(&config).unwrap();

    let report = ranker
        .run_daily_ingest(&mut sheet, &fetcher, tokyo(2024, 1, 8, 18))
        .unwrap();
    assert!(!report.gate_open);
    assert_eq!(fetcher.calls.get(), 0);

    let report = ranker
        .run_daily_ingest(&mut sheet, &fetcher, tokyo(2024, 1, 9, 18))
        .unwrap();
    assert!(report.gate_open);
    assert_eq!(fetcher.calls.get(), 4);
}

#[test]
fn test_prod_without_holidays_is_fatal() {
    let (_dir, mut sheet, fetcher) = setup();
    let mut config = test_config();
    config.run_mode = RunMode::Prod;

    let err = StockRanker::new(&config)
        .unwrap()
        .run_intraday(&mut sheet, &fetcher, tokyo(2024, 1, 12, 18))
        .unwrap_err();
    assert!(matches!(err, StockRankError::ConfigError(_)));
    assert!(err.is_fatal());
}
