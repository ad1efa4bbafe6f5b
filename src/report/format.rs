//! Formatted terminal output.
//!
//! Formatting lives in one place so the pipeline code stays free of
//! presentation details and output changes stay local (and snapshot-testable).

use chrono::NaiveDateTime;

use crate::data::assembler::Assembly;
use crate::data::cenace::Request;
use crate::data::fetcher::BatchReport;
use crate::domain::{Batch, DemandPoint, Endpoint, PipelineConfig};
use crate::error::AppError;
use crate::report::QualityReport;

const TS_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Header: system, requested range, batching and totals.
pub fn format_run_summary(config: &PipelineConfig, assembly: &Assembly) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "=== cenace - Hourly demand ({}) ===\n",
        config.system.display_name()
    ));
    out.push_str(&format!("{}\n", format_range_caption(config.start, config.end)));
    out.push_str(&format!(
        "Batches: {} (max {} days each) | failed: {}\n",
        assembly.batches.len(),
        config.max_batch_days,
        assembly.failed_batches()
    ));
    out.push_str(&format!("Points: n={}\n", assembly.points.len()));

    out
}

pub fn format_range_caption(start: NaiveDateTime, end: NaiveDateTime) -> String {
    let hours = (end - start).num_hours();
    format!(
        "Range: {} → {} ({} days, {} h)",
        start.format(TS_FORMAT),
        end.format(TS_FORMAT),
        hours / 24,
        hours
    )
}

/// One row per batch: where its data came from and what went wrong, if anything.
pub fn format_batch_table(batches: &[BatchReport]) -> String {
    let mut out = String::new();
    push_row(
        &mut out,
        format!(
            "{:<16} {:<16} {:<8} {:>6} {:>7} {}",
            "start", "end", "source", "points", "skipped", "note"
        ),
    );
    push_row(
        &mut out,
        format!("{:-<16} {:-<16} {:-<8} {:->6} {:->7} {:-<4}", "", "", "", "", "", ""),
    );

    for b in batches {
        let skipped = b.parse.as_ref().map_or(0, |s| s.skipped.len());
        push_row(
            &mut out,
            format!(
                "{:<16} {:<16} {:<8} {:>6} {:>7} {}",
                b.batch.range_start.format(TS_FORMAT),
                b.batch.range_end.format(TS_FORMAT),
                b.source.label(),
                b.points.len(),
                skipped,
                truncate(&batch_note(b), 80)
            ),
        );
    }

    out
}

fn batch_note(b: &BatchReport) -> String {
    if let Some(err) = &b.error {
        return err.to_string();
    }
    if let Some(err) = &b.cache_write_error {
        return format!("not cached: {err}");
    }
    match &b.parse {
        Some(summary) => format!("parsed with {}", summary.strategy),
        None => String::new(),
    }
}

/// The first `limit` points as a two-column table.
pub fn format_preview(points: &[DemandPoint], limit: usize) -> String {
    let mut out = String::new();
    push_row(&mut out, format!("{:<16} {:>12}", "timestamp", "demand_mw"));
    push_row(&mut out, format!("{:-<16} {:->12}", "", ""));

    for p in points.iter().take(limit) {
        push_row(
            &mut out,
            format!("{:<16} {:>12}", p.timestamp.format(TS_FORMAT), fmt_mw(p.demand_mw)),
        );
    }
    if points.len() > limit {
        out.push_str(&format!("... ({} more rows)\n", points.len() - limit));
    }

    out
}

fn fmt_mw(v: f64) -> String {
    if v.is_nan() { "NaN".to_string() } else { format!("{v:.2}") }
}

/// Pretty JSON, with `null` for counts of an empty series.
pub fn format_quality_report(report: &QualityReport) -> Result<String, AppError> {
    serde_json::to_string_pretty(report)
        .map_err(|e| AppError::new(2, format!("Failed to serialize quality report: {e}")))
}

/// Shown instead of the preview/chart when nothing was obtained.
pub fn format_no_data(config: &PipelineConfig) -> String {
    format!(
        "No data obtained for {} in {} → {}. Try a different range or system, \
         or rerun with --debug-bundle to see what each batch returned.",
        config.system,
        config.start.format(TS_FORMAT),
        config.end.format(TS_FORMAT)
    )
}

/// Method and target for each batch, for checking what would be requested.
pub fn format_request_targets(endpoint: &Endpoint, batches: &[Batch]) -> String {
    let mut out = String::new();
    for batch in batches {
        let request = Request::for_batch(endpoint, batch);
        match &request {
            Request::Get { url } => out.push_str(&format!("GET  {url}\n")),
            Request::Post { url, body } => out.push_str(&format!("POST {url} {body}\n")),
        }
    }
    out
}

fn push_row(out: &mut String, row: String) {
    out.push_str(row.trim_end());
    out.push('\n');
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('.');
    out
}
