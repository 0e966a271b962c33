use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use std::path::{Path, PathBuf};

use data_money::{
    compare_at_path, find_missing, import_csv, init_logging, make_demo, parse_reference_date,
    setup_database, verify_count, write_missing_csv, AppConfig, ComparisonRequest,
    GranularityMode, Lookback, Period, SqliteStore, WeekPolicy,
};

#[derive(Debug, Parser)]
#[command(name = "data-money", version, about = "Compare per-artist stream counts between two periods")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true, env = "DATAMONEY_CONFIG")]
    config: Option<PathBuf>,

    /// Stream database (overrides config and DATAMONEY_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the comparison table as JSON
    Compare {
        /// daily, weekly, monthly or yearly
        #[arg(long, default_value = "daily")]
        mode: GranularityMode,

        /// Current reference date (defaults to the latest date in the store)
        #[arg(long)]
        date: Option<String>,

        /// 7d, 1m, 3m, 6m, 1y, all, previous, <N>days, <N>units or a date
        #[arg(long)]
        lookback: Option<Lookback>,

        /// calendar (Sun-Sat) or trailing (last 7 days)
        #[arg(long)]
        week_policy: Option<WeekPolicy>,
    },

    /// Load long-format CSV exports (artist,region,date,count)
    Import {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Print the available date range, months and years as JSON
    Dates,

    /// Report artist/region/day combinations with no rows
    CheckMissing {
        #[arg(long)]
        from: String,

        #[arg(long)]
        to: String,

        #[arg(long, default_value = "missing_streams.csv")]
        out: PathBuf,
    },

    /// Write a trimmed copy of the store holding only recent months
    MakeDemo {
        #[arg(long)]
        out: PathBuf,

        /// Months of history to keep (defaults to config)
        #[arg(long)]
        months: Option<u32>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.db_path = db;
    }
    init_logging(&config.log_filter);

    match cli.command {
        Command::Compare {
            mode,
            date,
            lookback,
            week_policy,
        } => run_compare(&config, mode, date, lookback, week_policy),
        Command::Import { files } => run_import(&config, &files),
        Command::Dates => run_dates(&config),
        Command::CheckMissing { from, to, out } => run_check_missing(&config, &from, &to, &out),
        Command::MakeDemo { out, months } => {
            run_make_demo(&config, &out, months.unwrap_or(config.demo_months))
        }
    }
}

fn run_compare(
    config: &AppConfig,
    mode: GranularityMode,
    date: Option<String>,
    lookback: Option<Lookback>,
    week_policy: Option<WeekPolicy>,
) -> Result<()> {
    let current = date.as_deref().map(parse_reference_date).transpose()?;

    let mut request = ComparisonRequest::new(mode, current)
        .with_week_policy(week_policy.unwrap_or(config.week_policy));
    if let Some(lookback) = lookback {
        request = request.with_lookback(lookback);
    }

    let comparison = compare_at_path(&config.db_path, &request)
        .with_context(|| format!("Comparison failed for {}", config.db_path.display()))?;

    println!("{}", serde_json::to_string_pretty(&comparison)?);
    Ok(())
}

fn run_import(config: &AppConfig, files: &[PathBuf]) -> Result<()> {
    println!("🗄️  Importing stream exports into {}", config.db_path.display());

    let conn = Connection::open(&config.db_path)
        .with_context(|| format!("Failed to open {}", config.db_path.display()))?;
    setup_database(&conn)?;

    for file in files {
        println!("\n📂 {}", file.display());
        let summary = import_csv(&conn, file)?;
        println!("✓ Inserted: {} rows", summary.inserted);
        println!("✓ Skipped existing: {} rows", summary.ignored);
    }

    let count = verify_count(&conn)?;
    println!("\n✅ Store now holds {} stream rows", count);
    Ok(())
}

fn run_dates(config: &AppConfig) -> Result<()> {
    let store = SqliteStore::open_read_only(&config.db_path)?;
    let bounds = store.date_bounds()?;
    println!("{}", serde_json::to_string_pretty(&bounds)?);
    Ok(())
}

fn run_check_missing(config: &AppConfig, from: &str, to: &str, out: &Path) -> Result<()> {
    let range = Period::new(parse_reference_date(from)?, parse_reference_date(to)?);

    let store = SqliteStore::open_read_only(&config.db_path)?;
    let missing = find_missing(store.connection(), &range)?;
    write_missing_csv(out, &missing)?;

    println!("Check complete. Total missing records: {}", missing.len());
    println!("Written to: {}", out.display());
    Ok(())
}

fn run_make_demo(config: &AppConfig, out: &Path, months: u32) -> Result<()> {
    let summary = make_demo(&config.db_path, out, months)?;

    println!("✂️  Demo database created: {}", out.display());
    println!("✓ Cutoff: {}", summary.cutoff);
    println!("✓ Artists: {}, regions: {}, metrics: {}", summary.artists, summary.regions, summary.metrics);
    println!("✓ Streams kept: {} (dropped {})", summary.streams_kept, summary.streams_dropped);
    Ok(())
}
