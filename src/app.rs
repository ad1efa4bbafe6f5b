//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - installs logging and loads `.env`
//! - parses CLI arguments into a `PipelineConfig`
//! - runs the fetch pipeline
//! - prints diagnostics, preview, chart and quality report
//! - writes optional exports

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{Local, NaiveDate};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::{Command, FetchArgs, InspectArgs, WindowArgs};
use crate::data::RangeBatcher;
use crate::data::cenace::DEFAULT_BASE_URL;
use crate::domain::{
    CachePolicy, DEFAULT_CACHE_DIR, DEFAULT_MAX_BATCH_DAYS, Endpoint, PipelineConfig, default_window,
};
use crate::error::AppError;
use crate::report::{self, format_quality_report};

pub mod pipeline;

pub const ENV_BASE_URL: &str = "CENACE_BASE_URL";
pub const ENV_CACHE_DIR: &str = "CENACE_CACHE_DIR";

/// Where `--debug-bundle` writes.
const DEBUG_DIR: &str = "debug";

/// Entry point for the `cenace` binary.
pub fn run() -> Result<(), AppError> {
    init_tracing();
    dotenvy::dotenv().ok();

    // We want `cenace` and `cenace -s BCA` to behave like `cenace fetch ...`.
    let argv = rewrite_args(std::env::args().collect());
    let cli = crate::cli::Cli::parse_from(argv);

    match cli.command {
        Command::Fetch(args) => handle_fetch(args),
        Command::Urls(args) => handle_urls(args),
        Command::Inspect(args) => handle_inspect(args),
    }
}

/// Logs go to stderr so stdout carries only the report.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cenace_demand=info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

fn handle_fetch(args: FetchArgs) -> Result<(), AppError> {
    let config = pipeline_config_from_args(&args, Local::now().date_naive(), env_var);
    config.validate()?;

    let run = pipeline::run_pipeline(&config)?;
    let points = &run.assembly.points;

    println!("{}", report::format_run_summary(&config, &run.assembly));
    println!("{}", report::format_batch_table(&run.assembly.batches));

    if points.is_empty() {
        println!("{}\n", report::format_no_data(&config));
    } else {
        println!("{}", report::format_preview(points, args.preview));
        if !args.no_plot {
            println!("{}", crate::plot::render_demand_plot(points, args.width, args.height));
        }
    }

    println!("Quality report:\n{}", format_quality_report(&run.report)?);

    // Optional exports.
    if let Some(path) = &args.export_csv {
        crate::io::export::write_series_csv(path, points)?;
        info!(path = %path.display(), "wrote series CSV");
    }
    if let Some(path) = &args.export_report {
        crate::io::export::write_report_json(path, &config, &run.report, &run.assembly.batches)?;
        info!(path = %path.display(), "wrote report JSON");
    }
    if args.debug_bundle {
        let path = crate::debug::write_debug_bundle(Path::new(DEBUG_DIR), &config, &run.assembly, &run.report)?;
        println!("Debug bundle: {}", path.display());
    }

    Ok(())
}

fn handle_urls(args: WindowArgs) -> Result<(), AppError> {
    let config = config_from_window(&args, Local::now().date_naive(), env_var);
    config.validate()?;

    let batches: Vec<_> =
        RangeBatcher::new(config.system, config.start, config.end, config.max_batch_days).collect();
    println!("{}", report::format_range_caption(config.start, config.end));
    print!("{}", report::format_request_targets(&config.endpoint, &batches));
    Ok(())
}

fn handle_inspect(args: InspectArgs) -> Result<(), AppError> {
    let points = crate::io::cache::read_series_file(&args.file)?;
    let (Some(first), Some(last)) = (points.first(), points.last()) else {
        return Err(AppError::new(3, format!("'{}' contains no rows.", args.file.display())));
    };

    println!("File: {}", args.file.display());
    println!("Rows: {} | first={} | last={}", points.len(), first.timestamp, last.timestamp);
    println!("Quality report:\n{}", format_quality_report(&report::analyze(&points))?);
    Ok(())
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Build the pipeline configuration for `fetch`.
///
/// `env` is consulted for settings not given on the command line.
pub fn pipeline_config_from_args(
    args: &FetchArgs,
    today: NaiveDate,
    env: impl Fn(&str) -> Option<String>,
) -> PipelineConfig {
    let mut config = config_from_window(&args.window, today, &env);

    if let Some(dir) = &args.cache_dir {
        config.cache_dir = dir.clone();
    }
    config.cache_policy = if args.no_cache {
        CachePolicy::Disabled
    } else if let Some(hours) = args.cache_max_age_hours {
        CachePolicy::MaxAge(Duration::from_secs(hours.saturating_mul(3600)))
    } else {
        CachePolicy::Permanent
    };
    config.refetch_empty = args.refetch_empty;

    config
}

/// Configuration shared by every subcommand that addresses a window.
pub fn config_from_window(
    window: &WindowArgs,
    today: NaiveDate,
    env: impl Fn(&str) -> Option<String>,
) -> PipelineConfig {
    let (start, end) = default_window(today, window.days, window.end);
    let base_url = window
        .base_url
        .clone()
        .or_else(|| env(ENV_BASE_URL))
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    let cache_dir = env(ENV_CACHE_DIR).map_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR), PathBuf::from);

    PipelineConfig {
        system: window.system,
        start,
        end,
        max_batch_days: window
            .batch_days
            .unwrap_or_else(|| DEFAULT_MAX_BATCH_DAYS.min(window.days)),
        cache_dir,
        cache_policy: CachePolicy::Permanent,
        refetch_empty: false,
        endpoint: Endpoint {
            base_url,
            style: window.style,
            timeout: Duration::from_secs(window.timeout_secs),
        },
    }
}

/// Rewrite argv so `cenace` defaults to `cenace fetch`.
///
/// Rules:
/// - `cenace`                      -> `cenace fetch`
/// - `cenace -s BCA ...`           -> `cenace fetch -s BCA ...`
/// - `cenace --help/--version/-h`  -> unchanged (show top-level help/version)
fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    let Some(arg1) = argv.get(1).cloned() else {
        argv.push("fetch".to_string());
        return argv;
    };

    let is_top_level_help_or_version = matches!(
        arg1.as_str(),
        "-h" | "--help" | "-V" | "--version" | "help"
    );
    if is_top_level_help_or_version {
        return argv;
    }

    let is_subcommand = matches!(arg1.as_str(), "fetch" | "urls" | "inspect");
    if is_subcommand {
        return argv;
    }

    // If the first token is a flag, treat it as "fetch flags".
    if arg1.starts_with('-') {
        argv.insert(1, "fetch".to_string());
        return argv;
    }

    // Otherwise, leave as-is.
    argv
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use crate::domain::{RequestStyle, System};

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    fn fetch_args(args: &[&str]) -> FetchArgs {
        let cli = Cli::try_parse_from(rewrite_args(argv(args))).unwrap();
        match cli.command {
            Command::Fetch(a) => a,
            other => panic!("expected fetch, got {other:?}"),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 20).unwrap()
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn bare_invocation_means_fetch() {
        assert_eq!(rewrite_args(argv(&["cenace"])), argv(&["cenace", "fetch"]));
        assert_eq!(
            rewrite_args(argv(&["cenace", "-s", "BCA"])),
            argv(&["cenace", "fetch", "-s", "BCA"])
        );
        assert_eq!(rewrite_args(argv(&["cenace", "--help"])), argv(&["cenace", "--help"]));
        assert_eq!(rewrite_args(argv(&["cenace", "urls"])), argv(&["cenace", "urls"]));
    }

    #[test]
    fn defaults_follow_publication_lag() {
        let config = pipeline_config_from_args(&fetch_args(&["cenace"]), today(), no_env);
        assert_eq!(config.system, System::Sin);
        assert_eq!(config.end.date(), NaiveDate::from_ymd_opt(2025, 3, 12).unwrap());
        assert_eq!(config.start.date(), NaiveDate::from_ymd_opt(2025, 3, 5).unwrap());
        assert_eq!(config.max_batch_days, 7);
        assert_eq!(config.cache_dir, PathBuf::from(DEFAULT_CACHE_DIR));
        assert_eq!(config.cache_policy, CachePolicy::Permanent);
        assert_eq!(config.endpoint.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.endpoint.style, RequestStyle::Path);
        assert_eq!(config.endpoint.timeout, Duration::from_secs(60));
        config.validate().unwrap();
    }

    #[test]
    fn short_windows_use_one_batch() {
        let config = pipeline_config_from_args(&fetch_args(&["cenace", "-d", "3"]), today(), no_env);
        assert_eq!(config.max_batch_days, 3);
        let config = pipeline_config_from_args(&fetch_args(&["cenace", "-d", "14"]), today(), no_env);
        assert_eq!(config.max_batch_days, 7);
    }

    #[test]
    fn environment_fills_unset_flags() {
        let env = |key: &str| match key {
            ENV_BASE_URL => Some("https://mirror.invalid/SIM".to_string()),
            ENV_CACHE_DIR => Some("/tmp/cenace".to_string()),
            _ => None,
        };
        let config = pipeline_config_from_args(&fetch_args(&["cenace"]), today(), env);
        assert_eq!(config.endpoint.base_url, "https://mirror.invalid/SIM");
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/cenace"));

        let config = pipeline_config_from_args(
            &fetch_args(&["cenace", "--base-url", "https://flag.invalid", "--cache-dir", "here"]),
            today(),
            env,
        );
        assert_eq!(config.endpoint.base_url, "https://flag.invalid");
        assert_eq!(config.cache_dir, PathBuf::from("here"));
    }

    #[test]
    fn cache_policy_flags() {
        let config = pipeline_config_from_args(&fetch_args(&["cenace", "--no-cache"]), today(), no_env);
        assert_eq!(config.cache_policy, CachePolicy::Disabled);
        let config =
            pipeline_config_from_args(&fetch_args(&["cenace", "--cache-max-age-hours", "6"]), today(), no_env);
        assert_eq!(config.cache_policy, CachePolicy::MaxAge(Duration::from_secs(6 * 3600)));
        assert!(!config.refetch_empty);
        let config = pipeline_config_from_args(&fetch_args(&["cenace", "--refetch-empty"]), today(), no_env);
        assert!(config.refetch_empty);
        assert_eq!(config.cache_policy, CachePolicy::Permanent);
    }

    #[test]
    fn zero_batch_days_fails_validation() {
        let config = pipeline_config_from_args(&fetch_args(&["cenace", "--batch-days", "0"]), today(), no_env);
        assert_eq!(config.validate().unwrap_err().exit_code(), 2);
    }
}
