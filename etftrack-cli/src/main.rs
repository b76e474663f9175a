//! etftrack CLI — history initialization, daily update, and store inspection.
//!
//! Commands:
//! - `init` — fetch every configured instrument from its start date
//! - `update` — fetch the current day for every configured instrument
//! - `check` — print the integrity report of one stored series
//! - `report` — compare stored series (table, CSV or JSON)
//! - `import` — feed a `Date,Close,Volume` file through the save path
//! - `status` — record counts, date ranges and snapshot counts

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use etftrack_core::data::{
    fetch_all, BatchSummary, FetchMemo, FetchRequest, Ingestor, InstrumentOutcome, LogProgress,
    TwseProvider,
};
use etftrack_core::quality;
use etftrack_core::report::ReportGenerator;
use etftrack_core::store::CsvStore;
use etftrack_core::TrackerConfig;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const DEFAULT_CONFIG: &str = "etftrack.toml";

#[derive(Parser)]
#[command(name = "etftrack", about = "etftrack: daily ETF time-series store")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch full history for configured instruments.
    Init {
        /// Restrict to these codes (default: all configured).
        codes: Vec<String>,
    },
    /// Fetch the latest trading day for every configured instrument.
    Update {
        /// Day to fetch from (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        date: Option<String>,
    },
    /// Print the integrity report of a stored series.
    Check {
        code: String,
    },
    /// Compare stored series.
    Report {
        /// Codes to include (default: all configured).
        codes: Vec<String>,

        #[arg(long, value_enum, default_value_t = ReportFormat::Table)]
        format: ReportFormat,
    },
    /// Import a Date,Close,Volume CSV file through the save path.
    Import {
        code: String,
        file: PathBuf,
    },
    /// Show stored record counts, date ranges and snapshot counts.
    Status,
}

#[derive(Clone, Copy, ValueEnum)]
enum ReportFormat {
    Table,
    Csv,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    init_tracing(&config.log_level);
    tracing::debug!(
        data_dir = %config.data_dir.display(),
        instruments = config.instruments.len(),
        "configuration loaded"
    );

    let store = CsvStore::new(&config.data_dir, config.max_backups)?;

    match cli.command {
        Commands::Init { codes } => run_init(&config, &store, &codes),
        Commands::Update { date } => run_update(&config, &store, date.as_deref()),
        Commands::Check { code } => run_check(&store, &code),
        Commands::Report { codes, format } => run_report(&config, &store, codes, format),
        Commands::Import { code, file } => run_import(&store, &code, &file),
        Commands::Status => run_status(&config, &store),
    }
}

/// Load the config file. A missing default file means built-in defaults.
fn load_config(path: &Path) -> Result<TrackerConfig> {
    if !path.exists() && path == Path::new(DEFAULT_CONFIG) {
        return Ok(TrackerConfig::default());
    }
    TrackerConfig::from_file(path)
        .with_context(|| format!("failed to load config {}", path.display()))
}

/// Build the process-wide subscriber once. `RUST_LOG` wins over the config.
fn init_tracing(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();
}

fn build_ingestor(config: &TrackerConfig) -> Result<Ingestor> {
    let policy = config.fetch_policy();
    let politeness = policy.politeness_delay;
    let provider = TwseProvider::new(policy)?;
    Ok(Ingestor::new(Arc::new(provider), politeness)
        .with_memo(FetchMemo::new(config.fetch.memo_capacity)))
}

fn run_batch(config: &TrackerConfig, store: &CsvStore, requests: &[FetchRequest]) -> Result<()> {
    if requests.is_empty() {
        println!("No instruments configured.");
        return Ok(());
    }
    let ingestor = build_ingestor(config)?;
    let summary = fetch_all(
        &ingestor,
        store,
        requests,
        config.max_concurrency,
        &LogProgress,
    )?;
    print_batch(&summary);

    if !summary.all_succeeded() {
        for (code, err) in summary.errors() {
            eprintln!("Error for {code}: {err}");
        }
        std::process::exit(1);
    }
    Ok(())
}

fn run_init(config: &TrackerConfig, store: &CsvStore, codes: &[String]) -> Result<()> {
    let mut requests = config.history_requests();
    if !codes.is_empty() {
        for code in codes {
            if config.find(code).is_none() {
                bail!("instrument '{code}' is not configured");
            }
        }
        requests.retain(|r| codes.contains(&r.code));
    }
    run_batch(config, store, &requests)?;

    let reporter = ReportGenerator::new(store);
    for req in &requests {
        let report = reporter.instrument_report(&req.code);
        println!(
            "{}: {} records, {}, {} gaps, {} outliers, {} zero-volume days",
            report.code,
            report.records,
            report.period(),
            report.gap_count,
            report.outlier_count,
            report.zero_volume_count
        );
    }
    Ok(())
}

fn run_update(config: &TrackerConfig, store: &CsvStore, date: Option<&str>) -> Result<()> {
    let day = match date {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("invalid --date '{s}'"))?,
        None => chrono::Local::now().date_naive(),
    };
    run_batch(config, store, &config.update_requests(day))
}

fn run_check(store: &CsvStore, code: &str) -> Result<()> {
    let series = store.load(code);
    if series.is_empty() {
        println!("{code}: no stored data");
        return Ok(());
    }

    let report = quality::check(&series);
    println!("{code}: {} records", series.len());
    println!("  date gaps:   {}", report.date_gaps.len());
    for gap in &report.date_gaps {
        println!("    {} -> {} ({} days)", gap.from, gap.to, gap.days);
    }
    if let Some(b) = report.close_bounds {
        println!("  close fence: [{:.4}, {:.4}]", b.lower, b.upper);
    }
    println!("  outliers:    {}", report.outliers.len());
    for rec in &report.outliers {
        println!("    {} close={:?}", rec.date, rec.close);
    }
    println!("  zero volume: {}", report.zero_volume.len());
    for (field, count) in &report.missing {
        println!("  missing {field}: {count}");
    }
    Ok(())
}

fn run_report(
    config: &TrackerConfig,
    store: &CsvStore,
    codes: Vec<String>,
    format: ReportFormat,
) -> Result<()> {
    let codes = if codes.is_empty() {
        config.codes().into_iter().map(String::from).collect()
    } else {
        codes
    };
    let report = ReportGenerator::new(store).comparison_report(codes.as_slice());

    match format {
        ReportFormat::Table => print!("{}", report.to_markdown()),
        ReportFormat::Csv => print!("{}", report.to_csv()?),
        ReportFormat::Json => println!("{}", report.to_json()?),
    }
    Ok(())
}

fn run_import(store: &CsvStore, code: &str, file: &Path) -> Result<()> {
    let report = store
        .import_csv(code, file)
        .with_context(|| format!("import of {} into {code} failed", file.display()))?;
    println!(
        "{code}: {} records stored ({} new, {} rejected){}",
        report.records,
        report.added,
        report.rejected,
        if report.repaired { ", repaired" } else { "" }
    );
    Ok(())
}

fn run_status(config: &TrackerConfig, store: &CsvStore) -> Result<()> {
    println!("Data directory: {}", store.data_dir().display());
    if config.instruments.is_empty() {
        println!("No instruments configured.");
        return Ok(());
    }

    println!(
        "{:<8} {:<20} {:>8} {:<25} {:>9}",
        "code", "name", "records", "range", "snapshots"
    );
    for inst in &config.instruments {
        let status = store.status(&inst.code);
        let range = match (status.first_date, status.last_date) {
            (Some(first), Some(last)) => format!("{first} ~ {last}"),
            _ => "-".to_string(),
        };
        println!(
            "{:<8} {:<20} {:>8} {:<25} {:>9}",
            status.code,
            inst.name.as_deref().unwrap_or("-"),
            status.records,
            range,
            status.snapshots
        );
    }
    Ok(())
}

fn print_batch(summary: &BatchSummary) {
    println!(
        "Batch finished: {} instruments, {} saved, {} without new data, {} failed",
        summary.total, summary.saved, summary.no_update, summary.failed
    );
    for (code, outcome) in &summary.outcomes {
        match outcome {
            InstrumentOutcome::Saved { records, repaired } => {
                let note = if *repaired { " (repaired)" } else { "" };
                println!("  {code}: {records} records{note}");
            }
            InstrumentOutcome::NoUpdate => println!("  {code}: no update"),
            InstrumentOutcome::Failed(e) => println!("  {code}: failed: {e}"),
        }
    }
}
