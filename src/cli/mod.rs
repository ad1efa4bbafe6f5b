//! Command-line parsing for the CENACE demand downloader.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the fetching/normalization code.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use crate::domain::{MAX_DAYS, RequestStyle, System};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "cenace", version, about = "Hourly electricity demand from CENACE, cached and quality-checked")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Download (or load from cache) a demand series, print diagnostics, preview and chart.
    Fetch(FetchArgs),
    /// Print the request target of every batch without fetching anything.
    Urls(WindowArgs),
    /// Print the quality report of one cache file.
    Inspect(InspectArgs),
}

/// Which system and which window to request, and how to reach the service.
#[derive(Debug, Args, Clone)]
pub struct WindowArgs {
    /// Electrical system (SIN, BCA, BCS).
    #[arg(short = 's', long, value_enum, ignore_case = true, default_value_t = System::Sin)]
    pub system: System,

    /// Number of days to request, ending at `--end`.
    #[arg(
        short = 'd',
        long,
        default_value_t = 7,
        value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_DAYS))
    )]
    pub days: u32,

    /// Exclusive end date (YYYY-MM-DD). Defaults to 8 days before today.
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub end: Option<NaiveDate>,

    /// Maximum days per request (defaults to min(7, days)).
    #[arg(long)]
    pub batch_days: Option<u32>,

    /// Request encoding used by the service.
    #[arg(long, value_enum, default_value_t = RequestStyle::Path)]
    pub style: RequestStyle,

    /// Service base URL (env: CENACE_BASE_URL).
    #[arg(long)]
    pub base_url: Option<String>,

    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = 60)]
    pub timeout_secs: u64,
}

/// Options for `cenace fetch`.
#[derive(Debug, Args, Clone)]
pub struct FetchArgs {
    #[command(flatten)]
    pub window: WindowArgs,

    /// Cache directory (env: CENACE_CACHE_DIR, default `data_cache`).
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Refetch cache entries older than this many hours.
    #[arg(long, conflicts_with = "no_cache")]
    pub cache_max_age_hours: Option<u64>,

    /// Neither read nor write the cache.
    #[arg(long)]
    pub no_cache: bool,

    /// Refetch batches whose cached result is empty and do not cache empty results.
    #[arg(long)]
    pub refetch_empty: bool,

    /// Rows shown in the preview table.
    #[arg(long, default_value_t = 20)]
    pub preview: usize,

    /// Disable the terminal plot.
    #[arg(long)]
    pub no_plot: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 20)]
    pub height: usize,

    /// Export the assembled series to CSV.
    #[arg(long = "export-csv")]
    pub export_csv: Option<PathBuf>,

    /// Export the quality report and per-batch outcomes to JSON.
    #[arg(long = "export-report")]
    pub export_report: Option<PathBuf>,

    /// Write a markdown diagnostics bundle under `debug/`.
    #[arg(long)]
    pub debug_bundle: bool,
}

/// Options for inspecting a cache file.
#[derive(Debug, Args)]
pub struct InspectArgs {
    /// Parquet file written by the cache.
    #[arg(long, value_name = "PARQUET")]
    pub file: PathBuf,
}
