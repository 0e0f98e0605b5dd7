//! CSV-file collaborators: one headerless file per sheet range

use crate::error::{Result, StockRankError};
use crate::sink::{row_to_strings, Fetcher, RawIntradayQuote, Row, Sheet, Table};
use hashbrown::HashSet;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

const STATUS_OK: u16 = 200;

fn read_csv(path: &Path) -> Result<Vec<Vec<String>>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(|field| field.to_string()).collect());
    }
    Ok(rows)
}

/// Sheet whose ranges are `<dir>/<range>.csv`
#[derive(Debug, Clone)]
pub struct CsvSheet {
    dir: PathBuf,
}

impl CsvSheet {
    /// Open (and create if needed) a sheet directory
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path(&self, range: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", range))
    }

    fn append(&self, range: &str, rows: &[Vec<String>]) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path(range))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_writer(file);
        for row in rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl Sheet for CsvSheet {
    fn read_rows(&mut self, range: &str) -> Result<Vec<Vec<String>>> {
        read_csv(&self.path(range))
    }

    fn append_rows(&mut self, range: &str, rows: &[Row]) -> Result<u16> {
        let rows: Vec<Vec<String>> = rows.iter().map(|r| row_to_strings(r)).collect();
        self.append(range, &rows)?;
        Ok(STATUS_OK)
    }

    fn clear(&mut self, range: &str) -> Result<u16> {
        let path = self.path(range);
        if path.exists() {
            fs::write(&path, "")?;
        }
        Ok(STATUS_OK)
    }
}

impl Table for CsvSheet {
    /// Rows whose first two columns (code, date) already exist are skipped
    fn insert_ignore(&mut self, table: &str, columns: &[String], rows: &[Row]) -> Result<usize> {
        log::info!(
            "trying to insert {} rows into '{}' ({})",
            rows.len(),
            table,
            columns.join(", ")
        );

        let mut existing: HashSet<(String, String)> = read_csv(&self.path(table))?
            .into_iter()
            .filter(|r| r.len() >= 2)
            .map(|r| (r[0].clone(), r[1].clone()))
            .collect();

        let fresh: Vec<Vec<String>> = rows
            .iter()
            .map(|r| row_to_strings(r))
            .filter(|r| r.len() < 2 || existing.insert((r[0].clone(), r[1].clone())))
            .collect();

        self.append(table, &fresh)?;
        Ok(rows.len())
    }
}

/// Fetcher reading pre-parsed pages from disk.
///
/// Daily rows live in `<dir>/daily/<code>.csv`, the intraday reading in
/// the first row of `<dir>/intraday/<code>.csv` as `time_text,price_text`.
#[derive(Debug, Clone)]
pub struct CsvFetcher {
    dir: PathBuf,
}

impl CsvFetcher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn load(&self, kind: &str, instrument: &str) -> Result<Vec<Vec<String>>> {
        let path = self.dir.join(kind).join(format!("{}.csv", instrument));
        if !path.exists() {
            return Err(StockRankError::FetchError {
                instrument: instrument.to_string(),
                reason: format!("{} not found", path.display()),
            });
        }
        read_csv(&path)
    }
}

impl Fetcher for CsvFetcher {
    fn fetch_daily(&self, instrument: &str) -> Result<Vec<Vec<String>>> {
        let rows = self.load("daily", instrument)?;
        if rows.is_empty() {
            return Err(StockRankError::FetchError {
                instrument: instrument.to_string(),
                reason: "no data".to_string(),
            });
        }
        Ok(rows)
    }

    fn fetch_intraday(&self, instrument: &str) -> Result<RawIntradayQuote> {
        let rows = self.load("intraday", instrument)?;
        match rows.first() {
            Some(row) if row.len() >= 2 => Ok(RawIntradayQuote {
                time_text: row[0].clone(),
                price_text: row[1].clone(),
            }),
            _ => Err(StockRankError::FetchError {
                instrument: instrument.to_string(),
                reason: "no intraday reading".to_string(),
            }),
        }
    }
}
