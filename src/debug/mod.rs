//! Debug bundle writer for inspecting what each batch returned.
//!
//! The bundle is a markdown file with the run parameters, one row per batch,
//! every skipped record with its reason, and the quality report.

use std::fmt::Write as _;
use std::fs::{create_dir_all, write};
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::data::assembler::Assembly;
use crate::domain::PipelineConfig;
use crate::error::AppError;
use crate::report::{QualityReport, format_quality_report};

/// Skipped records listed per batch before the rest are summarized.
const MAX_SKIPS_LISTED: usize = 50;

pub fn write_debug_bundle(
    dir: &Path,
    config: &PipelineConfig,
    assembly: &Assembly,
    quality: &QualityReport,
) -> Result<PathBuf, AppError> {
    create_dir_all(dir).map_err(|e| AppError::new(2, format!("Failed to create debug dir: {e}")))?;

    let ts = Local::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!(
        "cenace_debug_{}_{}_{}.md",
        config.system.code(),
        config.start.format("%Y%m%d"),
        ts
    ));

    let body = render_bundle(config, assembly, quality)?;
    write(&path, body).map_err(|e| AppError::new(2, format!("Failed to write debug file: {e}")))?;

    Ok(path)
}

fn render_bundle(config: &PipelineConfig, assembly: &Assembly, quality: &QualityReport) -> Result<String, AppError> {
    let mut out = String::new();
    let w = |e: std::fmt::Error| AppError::new(2, format!("Failed to render debug bundle: {e}"));

    writeln!(out, "# cenace debug bundle").map_err(w)?;
    writeln!(out, "- generated: {}", Local::now().to_rfc3339()).map_err(w)?;
    writeln!(out, "- system: {} ({})", config.system, config.system.display_name()).map_err(w)?;
    writeln!(out, "- range: {} .. {}", config.start, config.end).map_err(w)?;
    writeln!(out, "- max_batch_days: {}", config.max_batch_days).map_err(w)?;
    writeln!(out, "- endpoint: {} ({:?})", config.endpoint.base_url, config.endpoint.style).map_err(w)?;
    writeln!(
        out,
        "- cache: {} ({:?}, refetch_empty={})",
        config.cache_dir.display(),
        config.cache_policy,
        config.refetch_empty
    )
    .map_err(w)?;

    writeln!(out, "\n## Batches").map_err(w)?;
    writeln!(out, "| start | end | source | points | records | strategy | error |").map_err(w)?;
    writeln!(out, "| - | - | - | - | - | - | - |").map_err(w)?;
    for b in &assembly.batches {
        let (records, strategy) = match &b.parse {
            Some(s) => (format!("{}/{}", s.records_used, s.records_seen), s.strategy),
            None => ("-".to_string(), "-"),
        };
        let error = b
            .error
            .as_ref()
            .map(ToString::to_string)
            .or_else(|| b.cache_write_error.clone())
            .unwrap_or_default();
        writeln!(
            out,
            "| {} | {} | {} | {} | {} | {} | {} |",
            b.batch.range_start,
            b.batch.range_end,
            b.source.label(),
            b.points.len(),
            records,
            strategy,
            error.replace('|', "\\|")
        )
        .map_err(w)?;
    }

    for b in &assembly.batches {
        let Some(target) = &b.target else { continue };
        writeln!(out, "\n### {}", b.batch).map_err(w)?;
        writeln!(out, "- request: {target}").map_err(w)?;

        let Some(summary) = &b.parse else { continue };
        if summary.skipped.is_empty() {
            continue;
        }
        writeln!(out, "- skipped records: {}", summary.skipped.len()).map_err(w)?;
        for skip in summary.skipped.iter().take(MAX_SKIPS_LISTED) {
            writeln!(out, "  - #{}: {}", skip.index, skip.reason).map_err(w)?;
        }
        if summary.skipped.len() > MAX_SKIPS_LISTED {
            writeln!(out, "  - ... {} more", summary.skipped.len() - MAX_SKIPS_LISTED).map_err(w)?;
        }
    }

    writeln!(out, "\n## Quality").map_err(w)?;
    writeln!(out, "```json\n{}\n```", format_quality_report(quality)?).map_err(w)?;

    Ok(out)
}
