//! Export the assembled series and its quality report.
//!
//! Both exports are meant to be easy to consume in spreadsheets or downstream scripts.

use std::fs::File;
use std::path::Path;

use serde::Serialize;

use crate::data::fetcher::BatchReport;
use crate::domain::{DemandPoint, PipelineConfig};
use crate::error::AppError;
use crate::report::QualityReport;

#[derive(Serialize)]
struct SeriesRow {
    timestamp: String,
    demand_mw: Option<f64>,
}

/// Write the series as `timestamp,demand_mw` CSV. NaN is written as an empty cell.
pub fn write_series_csv(path: &Path, points: &[DemandPoint]) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| AppError::new(2, format!("Failed to create export CSV '{}': {e}", path.display())))?;

    for p in points {
        writer
            .serialize(SeriesRow {
                timestamp: p.timestamp.format("%Y-%m-%dT%H:%M:%S").to_string(),
                demand_mw: (!p.demand_mw.is_nan()).then_some(p.demand_mw),
            })
            .map_err(|e| AppError::new(2, format!("Failed to write export CSV row: {e}")))?;
    }

    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to write export CSV '{}': {e}", path.display())))
}

#[derive(Debug, Serialize)]
struct ReportFile<'a> {
    tool: &'static str,
    system: &'static str,
    range_start: String,
    range_end: String,
    max_batch_days: u32,
    quality: &'a QualityReport,
    batches: Vec<BatchEntry>,
}

#[derive(Debug, Serialize)]
struct BatchEntry {
    range_start: String,
    range_end: String,
    source: &'static str,
    points: usize,
    skipped_records: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Write the quality report plus per-batch outcomes as pretty JSON.
pub fn write_report_json(
    path: &Path,
    config: &PipelineConfig,
    quality: &QualityReport,
    batches: &[BatchReport],
) -> Result<(), AppError> {
    let fmt = |ts: chrono::NaiveDateTime| ts.format("%Y-%m-%dT%H:%M:%S").to_string();
    let report = ReportFile {
        tool: concat!("cenace-demand ", env!("CARGO_PKG_VERSION")),
        system: config.system.code(),
        range_start: fmt(config.start),
        range_end: fmt(config.end),
        max_batch_days: config.max_batch_days,
        quality,
        batches: batches
            .iter()
            .map(|b| BatchEntry {
                range_start: fmt(b.batch.range_start),
                range_end: fmt(b.batch.range_end),
                source: b.source.label(),
                points: b.points.len(),
                skipped_records: b.parse.as_ref().map_or(0, |s| s.skipped.len()),
                error: b.error.as_ref().map(ToString::to_string),
            })
            .collect(),
    };

    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create report JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, &report)
        .map_err(|e| AppError::new(2, format!("Failed to write report JSON: {e}")))
}
