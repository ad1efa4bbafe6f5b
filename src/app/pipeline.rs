//! The fetch pipeline shared by every front-end.
//!
//! batches -> cache or CENACE -> normalize -> merge -> quality report
//!
//! Front-ends only decide what to print or export.

use tracing::info;

use crate::data::assembler::{Assembly, SeriesAssembler};
use crate::data::cenace::{CenaceClient, Transport};
use crate::data::fetcher::Fetcher;
use crate::domain::PipelineConfig;
use crate::error::AppError;
use crate::io::cache::DiskCache;
use crate::report::{QualityReport, analyze};

/// All computed outputs of a single `cenace fetch` run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub assembly: Assembly,
    pub report: QualityReport,
}

/// Execute the pipeline against the live service.
pub fn run_pipeline(config: &PipelineConfig) -> Result<RunOutput, AppError> {
    let client = CenaceClient::new(config.endpoint.timeout)?;
    run_pipeline_with(config, client)
}

/// Execute the pipeline over any transport.
///
/// Per-batch failures never end up here: they are carried in
/// `RunOutput::assembly.batches`. Only an invalid configuration is an error.
pub fn run_pipeline_with<T: Transport>(config: &PipelineConfig, transport: T) -> Result<RunOutput, AppError> {
    config.validate()?;

    let cache = DiskCache::new(config.cache_dir.clone(), config.cache_policy);
    let fetcher = Fetcher::new(transport, cache, config.endpoint.clone()).refetch_empty(config.refetch_empty);
    let assembly = SeriesAssembler::new(&fetcher).assemble(config.system, config.start, config.end, config.max_batch_days);
    let report = analyze(&assembly.points);

    info!(
        rows = report.rows,
        failed_batches = assembly.failed_batches(),
        "pipeline finished"
    );

    Ok(RunOutput { assembly, report })
}
