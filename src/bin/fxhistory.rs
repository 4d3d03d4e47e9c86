//! fxhistory CLI - build and maintain the historical FX rate table
//!
//! ## Example Usage
//!
//! ```bash
//! # Three-year bootstrap from currency.json
//! fxhistory init
//!
//! # Daily top-up (cron)
//! fxhistory append
//!
//! # Inspect or dump the table
//! fxhistory status
//! fxhistory export -o rates.csv
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use rusty_fxhistory::clock::{Clock, Sleeper, SystemClock, ThreadSleeper};
use rusty_fxhistory::config::Settings;
use rusty_fxhistory::context::RunContext;
use rusty_fxhistory::data::sources::{RateProvider, YahooProvider};
use rusty_fxhistory::jobs::{self, RunReport};
use rusty_fxhistory::logging;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::process;

/// fxhistory: historical FX closes into SQLite
#[derive(Parser)]
#[command(name = "fxhistory")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Historical FX rate extraction with incremental append", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database path
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Currency metadata JSON
    #[arg(long, global = true)]
    metadata: Option<PathBuf>,

    /// Directory for per-run log files
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the full lookback window and replace the table
    Init,

    /// Append the days missing since the last stored date
    Append,

    /// Show what the table currently holds
    Status,

    /// Export the table as CSV
    Export {
        /// Output file (stdout if omitted)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },
}

impl Commands {
    fn job(&self) -> &'static str {
        match self {
            Commands::Init => "initial",
            Commands::Append => "append",
            Commands::Status => "status",
            Commands::Export { .. } => "export",
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let settings = match load_settings(&cli) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            process::exit(1);
        }
    };

    // Status and export write their output to stdout; their logs go to stderr
    let logger = match cli.command {
        Commands::Init | Commands::Append => {
            logging::init(settings.log_dir.as_deref(), cli.command.job(), cli.verbose).map(|_| ())
        }
        Commands::Status | Commands::Export { .. } => logging::init_stderr(cli.verbose),
    };
    if let Err(e) = logger {
        eprintln!("{} {}", "Error:".red().bold(), e);
        process::exit(1);
    }

    let result = match cli.command {
        Commands::Init => run_job(&settings, "initial", jobs::initial_load),
        Commands::Append => run_job(&settings, "append", jobs::append),
        Commands::Status => show_status(&settings),
        Commands::Export { output } => export(&settings, output),
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        process::exit(1);
    }
}

fn load_settings(cli: &Cli) -> anyhow::Result<Settings> {
    let mut settings = Settings::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(database) = &cli.database {
        settings.database = database.clone();
    }
    if let Some(metadata) = &cli.metadata {
        settings.metadata = metadata.clone();
    }
    if let Some(log_dir) = &cli.log_dir {
        settings.log_dir = Some(log_dir.clone());
    }
    settings.validate()?;
    Ok(settings)
}

type JobFn = fn(
    &Settings,
    &mut RunContext,
    &dyn RateProvider,
    &dyn Clock,
    &dyn Sleeper,
) -> rusty_fxhistory::Result<RunReport>;

fn run_job(settings: &Settings, job: &str, run: JobFn) -> anyhow::Result<()> {
    let provider = YahooProvider::new(&settings.provider).context("building HTTP client")?;
    let mut ctx = RunContext::new(job);

    let report = run(settings, &mut ctx, &provider, &SystemClock, &ThreadSleeper)
        .with_context(|| format!("{} job failed", job))?;

    println!();
    println!("{}", "Run Summary".green().bold());
    println!("{}", "===========".green());
    println!("  Run:       {}", report.run_id.to_string().dimmed());
    println!("  Outcome:   {}", report.outcome.to_string().cyan());
    println!("  Rows:      {}", report.outcome.rows_written());
    if report.is_complete() {
        println!("  Batches:   {}", "all complete".green());
    } else {
        println!(
            "  Batches:   {}",
            format!("{} incomplete", report.warnings.len()).yellow().bold()
        );
        for warning in &report.warnings {
            println!("    {}", warning.to_string().yellow());
        }
    }
    Ok(())
}

fn show_status(settings: &Settings) -> anyhow::Result<()> {
    let status = jobs::status(settings)?;

    println!("{}", "Store Status".bold());
    println!("{}", "============".dimmed());
    println!("  Database:  {}", status.database.display());
    println!("  Table:     {}", status.table);
    if !status.exists {
        println!("  {}", "Table does not exist; run `fxhistory init`".yellow());
        return Ok(());
    }
    println!("  Rows:      {}", status.rows);
    let range = match (status.first_date, status.last_date) {
        (Some(first), Some(last)) => format!("{} to {}", first, last),
        _ => "empty".to_string(),
    };
    println!("  Dates:     {}", range);
    let codes: Vec<String> = status.instruments.iter().map(|i| i.code.to_string()).collect();
    println!("  Currencies ({}): {}", codes.len(), codes.join(", "));
    Ok(())
}

fn export(settings: &Settings, output: Option<PathBuf>) -> anyhow::Result<()> {
    let rows = match &output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("creating {}", path.display()))?;
            jobs::export_csv(settings, file)?
        }
        None => jobs::export_csv(settings, io::stdout().lock())?,
    };
    if let Some(path) = output {
        eprintln!(
            "{} {} rows to {}",
            "Exported".green().bold(),
            rows,
            path.display()
        );
    }
    Ok(())
}
