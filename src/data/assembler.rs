//! Stitch per-batch results into one continuous series.

use chrono::NaiveDateTime;
use tracing::info;

use crate::data::batcher::RangeBatcher;
use crate::data::cenace::Transport;
use crate::data::fetcher::{BatchReport, Fetcher};
use crate::domain::{DemandPoint, System};

/// The merged series plus what happened to each batch.
#[derive(Debug, Clone, Default)]
pub struct Assembly {
    pub points: Vec<DemandPoint>,
    pub batches: Vec<BatchReport>,
}

impl Assembly {
    pub fn failed_batches(&self) -> usize {
        self.batches.iter().filter(|b| b.error.is_some()).count()
    }
}

/// Drives a `RangeBatcher` through a `Fetcher`, one batch at a time.
pub struct SeriesAssembler<'a, T> {
    fetcher: &'a Fetcher<T>,
}

impl<'a, T: Transport> SeriesAssembler<'a, T> {
    pub fn new(fetcher: &'a Fetcher<T>) -> Self {
        Self { fetcher }
    }

    /// Fetch `[start, end)` and return a series with unique, increasing
    /// timestamps. Failed batches contribute nothing but are still reported.
    pub fn assemble(&self, system: System, start: NaiveDateTime, end: NaiveDateTime, max_batch_days: u32) -> Assembly {
        let batches: Vec<BatchReport> = RangeBatcher::new(system, start, end, max_batch_days)
            .map(|batch| self.fetcher.fetch(&batch))
            .collect();

        let points = merge_batches(batches.iter().map(|b| b.points.as_slice()));
        info!(
            system = %system,
            batches = batches.len(),
            points = points.len(),
            "assembled series"
        );

        Assembly { points, batches }
    }
}

/// Concatenate, sort by timestamp, and keep the first point seen for each
/// timestamp. Empty parts are ignored.
pub fn merge_batches<'p>(parts: impl IntoIterator<Item = &'p [DemandPoint]>) -> Vec<DemandPoint> {
    let mut all: Vec<DemandPoint> = parts
        .into_iter()
        .filter(|p| !p.is_empty())
        .flat_map(|p| p.iter().copied())
        .collect();
    // Stable, so earlier batches win ties.
    all.sort_by_key(|p| p.timestamp);
    all.dedup_by_key(|p| p.timestamp);
    all
}
