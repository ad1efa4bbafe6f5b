//! Reporting utilities: series quality checks and formatted terminal output.

use std::collections::HashSet;

use chrono::Duration;
use serde::Serialize;

use crate::domain::DemandPoint;

pub mod format;

pub use format::*;

/// Consecutive samples further apart than this count as a gap.
pub const GAP_THRESHOLD_MINUTES: i64 = 65;

/// Data-quality summary of an assembled series.
///
/// Every count except `rows` is `None` for an empty series, which keeps "no
/// data" distinct from "no problems" once serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QualityReport {
    pub rows: u64,
    pub nan_values: Option<u64>,
    pub negatives: Option<u64>,
    pub duplicates: Option<u64>,
    pub time_gaps: Option<u64>,
}

impl QualityReport {
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }
}

/// Count missing values, negative demand, repeated timestamps and gaps.
///
/// Purely diagnostic: nothing is dropped or corrected. Gaps are measured
/// between neighbours in series order, so an unsorted series reports a
/// negative delta as no gap.
pub fn analyze(points: &[DemandPoint]) -> QualityReport {
    if points.is_empty() {
        return QualityReport {
            rows: 0,
            nan_values: None,
            negatives: None,
            duplicates: None,
            time_gaps: None,
        };
    }

    let count = |n: usize| n as u64;

    let nan_values = points.iter().filter(|p| p.demand_mw.is_nan()).count();
    let negatives = points.iter().filter(|p| p.demand_mw < 0.0).count();

    let mut seen = HashSet::with_capacity(points.len());
    let duplicates = points.iter().filter(|p| !seen.insert(p.timestamp)).count();

    let threshold = Duration::minutes(GAP_THRESHOLD_MINUTES);
    let time_gaps = points
        .windows(2)
        .filter(|w| w[1].timestamp - w[0].timestamp > threshold)
        .count();

    QualityReport {
        rows: count(points.len()),
        nan_values: Some(count(nan_values)),
        negatives: Some(count(negatives)),
        duplicates: Some(count(duplicates)),
        time_gaps: Some(count(time_gaps)),
    }
}
