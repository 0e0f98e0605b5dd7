//! rusty-stockrank CLI - runs the ingest, signal and intraday jobs
//!
//! Collaborators are CSV files under the data directory: one file per sheet
//! range, the moving-average table under `table/`, and pre-parsed fetch
//! results under `fetch/daily/<code>.csv` and `fetch/intraday/<code>.csv`.
//!
//! ## Example Usage
//!
//! ```bash
//! # Append new daily bars
//! rusty-stockrank --config stockrank.toml --data-dir data ingest
//!
//! # Rebuild the ranked daily report
//! rusty-stockrank --config stockrank.toml --data-dir data signals
//!
//! # Check the calendar for a day
//! rusty-stockrank --config stockrank.toml --data-dir data calendar --date 2024/01/09
//! ```

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use colored::Colorize;
use rusty_stockrank::calendar::{parse_calendar_date, BusinessCalendar};
use rusty_stockrank::config::Config;
use rusty_stockrank::engine::{RunReport, StockRanker};
use rusty_stockrank::sink::{CsvFetcher, CsvSheet};
use rusty_stockrank::types::format_date;
use std::path::PathBuf;
use std::process;

/// rusty-stockrank: business-day-aware equity ranking
#[derive(Parser)]
#[command(name = "rusty-stockrank")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Price history, moving averages and ranked equity reports", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true, default_value = "stockrank.toml")]
    config: PathBuf,

    /// Directory holding the CSV sheets
    #[arg(short, long, global = true, default_value = "data")]
    data_dir: PathBuf,

    /// Print run reports as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch daily bars and append the new ones
    Ingest,

    /// Compute moving averages and write the ranked daily report
    Signals,

    /// Record intraday quotes and write the increase-rate ranking
    Intraday,

    /// Show business-day information for a date
    Calendar {
        /// Date to check (YYYY/MM/DD or M/D, default today)
        #[arg(long)]
        date: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    if let Err(e) = run(cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    if cli.verbose {
        println!(
            "{} v{} ({} mode)",
            "rusty-stockrank".cyan().bold(),
            env!("CARGO_PKG_VERSION"),
            config.run_mode
        );
        println!("Data dir: {}", cli.data_dir.display().to_string().dimmed());
    }

    let ranker = StockRanker::new(&config)?;
    let mut sheet = CsvSheet::open(&cli.data_dir)?;
    let now = Utc::now();

    let (name, report) = match cli.command {
        Commands::Ingest => {
            let fetcher = CsvFetcher::new(cli.data_dir.join("fetch"));
            ("Daily ingest", ranker.run_daily_ingest(&mut sheet, &fetcher, now)?)
        }
        Commands::Signals => {
            let mut table = CsvSheet::open(cli.data_dir.join("table"))?;
            ("Daily signals", ranker.run_daily_signals(&mut sheet, &mut table, now)?)
        }
        Commands::Intraday => {
            let fetcher = CsvFetcher::new(cli.data_dir.join("fetch"));
            ("Intraday", ranker.run_intraday(&mut sheet, &fetcher, now)?)
        }
        Commands::Calendar { date } => {
            let calendar = ranker.load_calendar(&mut sheet)?;
            let today = calendar.local_date(&now);
            let date = match date {
                Some(raw) => parse_calendar_date(&raw, today)?,
                None => today,
            };
            let holidays = calendar.holidays();

            println!("{}", "Calendar".green().bold());
            println!("{}", "========".green());
            println!("  {} {}", "Date:".bold(), format_date(date));
            println!("  {} {}", "Timezone:".bold(), calendar.timezone());
            println!(
                "  {} {}",
                "Business day:".bold(),
                yes_no(holidays.is_business_day(date))
            );
            println!(
                "  {} {}",
                "Previous day traded:".bold(),
                yes_no(holidays.is_previous_day_business_day(date))
            );
            match holidays.previous_business_day(date) {
                Ok(previous) => {
                    println!("  {} {}", "Previous business day:".bold(), format_date(previous))
                }
                Err(e) => println!("  {} {}", "Previous business day:".bold(), e.to_string().red()),
            }
            if calendar.is_bypassed() {
                println!("  {}", "run gates bypassed in test mode".yellow());
            }
            return Ok(());
        }
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(name, &report);
    }
    Ok(())
}

fn yes_no(value: bool) -> colored::ColoredString {
    if value {
        "yes".green()
    } else {
        "no".red()
    }
}

fn print_summary(run: &str, report: &RunReport) {
    println!();
    println!("{}", format!("{} Summary", run).green().bold());
    if !report.gate_open {
        println!("  {} calendar gate closed, nothing to do", "-".yellow().bold());
        return;
    }
    println!("  {} {}", "Target rows:".bold(), report.target);
    println!("  {} {}", "Written rows:".bold(), report.written);
    if report.skipped.is_empty() {
        println!("  {} all instruments processed", "✓".green().bold());
    } else {
        println!(
            "  {} {} instruments skipped",
            "!".yellow().bold(),
            report.skipped.len()
        );
        for (code, reason) in &report.skipped {
            println!("    {} {}", code, reason.dimmed());
        }
    }
}
