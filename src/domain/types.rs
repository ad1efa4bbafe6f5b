//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory while batches are fetched and stitched together
//! - persisted to the on-disk cache
//! - exported to CSV/JSON for downstream tools

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Default batch length (days). CENACE rejects or truncates longer ranges.
pub const DEFAULT_MAX_BATCH_DAYS: u32 = 7;

/// Upper bound for the `--days` control.
pub const MAX_DAYS: u32 = 14;

/// The most recent day CENACE reliably publishes is roughly a week behind.
pub const PUBLICATION_LAG_DAYS: i64 = 8;

pub const DEFAULT_CACHE_DIR: &str = "data_cache";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Electrical subsystem tracked by CENACE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
pub enum System {
    /// Sistema Interconectado Nacional.
    #[serde(rename = "SIN")]
    #[value(name = "SIN")]
    Sin,
    /// Baja California.
    #[serde(rename = "BCA")]
    #[value(name = "BCA")]
    Bca,
    /// Baja California Sur.
    #[serde(rename = "BCS")]
    #[value(name = "BCS")]
    Bcs,
}

impl System {
    pub const ALL: [System; 3] = [System::Sin, System::Bca, System::Bcs];

    pub fn code(self) -> &'static str {
        match self {
            System::Sin => "SIN",
            System::Bca => "BCA",
            System::Bcs => "BCS",
        }
    }

    /// Load zone that represents the whole system in the demand service.
    pub fn zone(self) -> &'static str {
        // Each system is queried through its aggregate zone, which happens to
        // share the system code.
        self.code()
    }

    pub fn display_name(self) -> &'static str {
        match self {
            System::Sin => "Sistema Interconectado Nacional",
            System::Bca => "Baja California",
            System::Bcs => "Baja California Sur",
        }
    }
}

impl fmt::Display for System {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One hourly demand observation.
///
/// Timestamps are naive local wall-clock time, as published. A missing demand
/// value is carried as `f64::NAN` so it can be counted by the quality report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DemandPoint {
    pub timestamp: NaiveDateTime,
    pub demand_mw: f64,
}

impl DemandPoint {
    pub fn new(timestamp: NaiveDateTime, demand_mw: f64) -> Self {
        Self {
            timestamp,
            demand_mw,
        }
    }
}

/// One bounded sub-request `[range_start, range_end)` of a larger window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Batch {
    pub system: System,
    pub range_start: NaiveDateTime,
    pub range_end: NaiveDateTime,
}

impl Batch {
    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        ts >= self.range_start && ts < self.range_end
    }
}

impl fmt::Display for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{} → {})",
            self.system,
            self.range_start.format("%Y-%m-%d %H:%M"),
            self.range_end.format("%Y-%m-%d %H:%M")
        )
    }
}

/// How a batch request is encoded on the wire.
///
/// CENACE has exposed the same data through more than one undocumented
/// service over time; both shapes are supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum RequestStyle {
    /// `GET {base}/{system}/{zone}/{Y}/{m}/{d}/{Y}/{m}/{d}/JSON`.
    Path,
    /// `POST {base}` with a JSON body carrying system, zone and `dd/mm/yyyy` dates.
    JsonBody,
}

/// Remote endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub base_url: String,
    pub style: RequestStyle,
    pub timeout: Duration,
}

/// When a cache entry may be served.
///
/// Entries are keyed by requested range, not content, and are never rewritten.
/// `Permanent` keeps them forever (until deleted by hand).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    #[default]
    Permanent,
    /// Entries whose file is older than this are treated as a miss and refetched.
    MaxAge(Duration),
    /// Never read or write the cache.
    Disabled,
}

/// A full run's configuration as understood by the pipeline.
///
/// This replaces the page-level widget state: everything the pipeline needs is
/// passed in explicitly.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub system: System,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub max_batch_days: u32,
    pub cache_dir: PathBuf,
    pub cache_policy: CachePolicy,
    /// Ignore cached empty results and do not cache new ones, so data
    /// published late is picked up on a later run.
    pub refetch_empty: bool,
    pub endpoint: Endpoint,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.end - self.start > chrono::Duration::days(i64::from(MAX_DAYS)) {
            return Err(AppError::new(
                2,
                format!("Requested window is longer than {MAX_DAYS} days."),
            ));
        }
        if self.max_batch_days == 0 {
            return Err(AppError::new(2, "Batch length must be at least 1 day."));
        }
        if self.endpoint.base_url.trim().is_empty() {
            return Err(AppError::new(2, "CENACE base URL is empty."));
        }
        if self.endpoint.timeout.is_zero() {
            return Err(AppError::new(2, "Request timeout must be greater than zero."));
        }
        Ok(())
    }
}

/// The request window used when no explicit end date is given.
///
/// `end` is midnight `PUBLICATION_LAG_DAYS` before `today`; `start` is `days`
/// before that.
pub fn default_window(today: NaiveDate, days: u32, end: Option<NaiveDate>) -> (NaiveDateTime, NaiveDateTime) {
    let end_date = end.unwrap_or_else(|| today - chrono::Duration::days(PUBLICATION_LAG_DAYS));
    let end = end_date.and_time(NaiveTime::MIN);
    let start = end - chrono::Duration::days(i64::from(days));
    (start, end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_window_lags_publication() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 20).unwrap();
        let (start, end) = default_window(today, 7, None);
        assert_eq!(end, NaiveDate::from_ymd_opt(2025, 3, 12).unwrap().and_hms_opt(0, 0, 0).unwrap());
        assert_eq!(start, NaiveDate::from_ymd_opt(2025, 3, 5).unwrap().and_hms_opt(0, 0, 0).unwrap());
    }

    #[test]
    fn explicit_end_wins() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 20).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();
        let (start, stop) = default_window(today, 14, Some(end));
        assert_eq!(stop.date(), end);
        assert_eq!(start.date(), NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
    }

    #[test]
    fn zero_batch_days_rejected() {
        let cfg = PipelineConfig {
            system: System::Sin,
            start: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap(),
            end: NaiveDate::from_ymd_opt(2025, 1, 2).unwrap().and_hms_opt(0, 0, 0).unwrap(),
            max_batch_days: 0,
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            cache_policy: CachePolicy::Permanent,
            refetch_empty: false,
            endpoint: Endpoint {
                base_url: "https://example.invalid".to_string(),
                style: RequestStyle::Path,
                timeout: DEFAULT_TIMEOUT,
            },
        };
        let err = cfg.validate().unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn overlong_window_rejected() {
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let cfg = PipelineConfig {
            system: System::Bca,
            start,
            end: start + chrono::Duration::days(15),
            max_batch_days: 7,
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            cache_policy: CachePolicy::Disabled,
            refetch_empty: false,
            endpoint: Endpoint {
                base_url: "https://example.invalid".to_string(),
                style: RequestStyle::Path,
                timeout: DEFAULT_TIMEOUT,
            },
        };
        assert_eq!(cfg.validate().unwrap_err().exit_code(), 2);
    }
}
