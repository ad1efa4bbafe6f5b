//! On-disk batch cache.
//!
//! One Parquet file per `(system, range_start, range_end)` key, holding exactly
//! two columns: `timestamp` (millisecond timestamp, no time zone, local wall
//! clock) and `demand_mw` (float64).
//!
//! Whether an existing entry is served is decided by the configured
//! `CachePolicy`. Under `Permanent` an entry is written once and kept; an
//! expired `MaxAge` entry is replaced by the next successful fetch.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use arrow::array::{Array, ArrayRef, Float64Array, TimestampMillisecondArray};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, NaiveDateTime, NaiveTime};
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::domain::{Batch, CachePolicy, DemandPoint, System};
use crate::error::CacheError;

pub const TIMESTAMP_COLUMN: &str = "timestamp";
pub const DEMAND_COLUMN: &str = "demand_mw";

/// Identity of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub system: System,
    pub range_start: NaiveDateTime,
    pub range_end: NaiveDateTime,
}

impl CacheKey {
    /// `demanda_{SYSTEM}_{YYYYMMDD}_{YYYYMMDD}.parquet`.
    ///
    /// Bounds that are not midnight carry their time (`YYYYMMDDTHHMM`) so
    /// distinct keys never share a file.
    pub fn file_name(&self) -> String {
        format!(
            "demanda_{}_{}_{}.parquet",
            self.system.code(),
            key_bound(self.range_start),
            key_bound(self.range_end)
        )
    }
}

impl From<&Batch> for CacheKey {
    fn from(batch: &Batch) -> Self {
        Self {
            system: batch.system,
            range_start: batch.range_start,
            range_end: batch.range_end,
        }
    }
}

fn key_bound(ts: NaiveDateTime) -> String {
    if ts.time() == NaiveTime::MIN {
        ts.format("%Y%m%d").to_string()
    } else {
        ts.format("%Y%m%dT%H%M").to_string()
    }
}

/// Directory-backed cache of normalized batches.
#[derive(Debug, Clone)]
pub struct DiskCache {
    dir: PathBuf,
    policy: CachePolicy,
}

impl DiskCache {
    pub fn new(dir: impl Into<PathBuf>, policy: CachePolicy) -> Self {
        Self {
            dir: dir.into(),
            policy,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    /// Cached series for `key`, or `None` on a miss.
    ///
    /// Unreadable or corrupt files are a miss, not an error.
    pub fn get(&self, key: &CacheKey) -> Option<Vec<DemandPoint>> {
        let max_age = match self.policy {
            CachePolicy::Disabled => return None,
            CachePolicy::Permanent => None,
            CachePolicy::MaxAge(age) => Some(age),
        };

        let path = self.path_for(key);
        if !path.is_file() {
            return None;
        }

        if let Some(max_age) = max_age {
            let fresh = fs::metadata(&path)
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| SystemTime::now().duration_since(modified).ok())
                .is_some_and(|age| age <= max_age);
            if !fresh {
                debug!(path = %path.display(), "cache entry expired");
                return None;
            }
        }

        match read_series_file(&path) {
            Ok(points) => Some(points),
            Err(err) => {
                warn!("{err}; treating as cache miss");
                None
            }
        }
    }

    /// Persist `points` under `key`. A disabled cache accepts and drops writes.
    pub fn put(&self, key: &CacheKey, points: &[DemandPoint]) -> Result<(), CacheError> {
        if self.policy == CachePolicy::Disabled {
            return Ok(());
        }
        let path = self.path_for(key);
        fs::create_dir_all(&self.dir).map_err(|e| CacheError::Write {
            path: path.clone(),
            message: format!("cannot create cache directory: {e}"),
        })?;
        write_series_file(&path, points)
    }
}

fn series_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new(
            TIMESTAMP_COLUMN,
            DataType::Timestamp(TimeUnit::Millisecond, None),
            false,
        ),
        Field::new(DEMAND_COLUMN, DataType::Float64, true),
    ]))
}

/// Write a series atomically: the file appears complete or not at all.
pub fn write_series_file(path: &Path, points: &[DemandPoint]) -> Result<(), CacheError> {
    let write_err = |message: String| CacheError::Write {
        path: path.to_path_buf(),
        message,
    };

    let schema = series_schema();
    let timestamps: Vec<i64> = points
        .iter()
        .map(|p| p.timestamp.and_utc().timestamp_millis())
        .collect();
    let values: Vec<f64> = points.iter().map(|p| p.demand_mw).collect();
    let columns: Vec<ArrayRef> = vec![
        Arc::new(TimestampMillisecondArray::from(timestamps)),
        Arc::new(Float64Array::from(values)),
    ];
    let batch = RecordBatch::try_new(schema.clone(), columns).map_err(|e| write_err(e.to_string()))?;

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| write_err(format!("cannot create temp file: {e}")))?;

    let mut writer = ArrowWriter::try_new(&mut tmp, schema, None).map_err(|e| write_err(e.to_string()))?;
    writer.write(&batch).map_err(|e| write_err(e.to_string()))?;
    writer.close().map_err(|e| write_err(e.to_string()))?;

    tmp.persist(path).map_err(|e| write_err(e.error.to_string()))?;
    Ok(())
}

/// Read a cache file back into a series.
pub fn read_series_file(path: &Path) -> Result<Vec<DemandPoint>, CacheError> {
    let read_err = |message: String| CacheError::Read {
        path: path.to_path_buf(),
        message,
    };

    let file = File::open(path).map_err(|e| read_err(e.to_string()))?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(|e| read_err(e.to_string()))?
        .build()
        .map_err(|e| read_err(e.to_string()))?;

    let mut points = Vec::new();
    for batch in reader {
        let batch = batch.map_err(|e| read_err(e.to_string()))?;

        let timestamps = batch
            .column_by_name(TIMESTAMP_COLUMN)
            .and_then(|c| c.as_any().downcast_ref::<TimestampMillisecondArray>())
            .ok_or_else(|| read_err(format!("missing `{TIMESTAMP_COLUMN}` column")))?;
        let values = batch
            .column_by_name(DEMAND_COLUMN)
            .and_then(|c| c.as_any().downcast_ref::<Float64Array>())
            .ok_or_else(|| read_err(format!("missing `{DEMAND_COLUMN}` column")))?;

        for i in 0..batch.num_rows() {
            if timestamps.is_null(i) {
                return Err(read_err(format!("null timestamp at row {i}")));
            }
            let millis = timestamps.value(i);
            let timestamp = DateTime::from_timestamp_millis(millis)
                .map(|dt| dt.naive_utc())
                .ok_or_else(|| read_err(format!("timestamp {millis} out of range")))?;
            let demand_mw = if values.is_null(i) { f64::NAN } else { values.value(i) };
            points.push(DemandPoint::new(timestamp, demand_mw));
        }
    }

    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use std::time::Duration as StdDuration;

    fn at(d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap().and_hms_opt(h, 0, 0).unwrap()
    }

    fn key() -> CacheKey {
        CacheKey {
            system: System::Sin,
            range_start: at(1, 0),
            range_end: at(8, 0),
        }
    }

    fn series() -> Vec<DemandPoint> {
        (0..48)
            .map(|h| DemandPoint::new(at(1, 0) + Duration::hours(h), 30_000.0 + h as f64 * 1.25))
            .collect()
    }

    #[test]
    fn file_name_follows_range() {
        assert_eq!(key().file_name(), "demanda_SIN_20250101_20250108.parquet");
        let odd = CacheKey {
            system: System::Bcs,
            range_start: at(1, 6),
            range_end: at(2, 0),
        };
        assert_eq!(odd.file_name(), "demanda_BCS_20250101T0600_20250102.parquet");
    }

    #[test]
    fn round_trip_is_exact() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path(), CachePolicy::Permanent);
        let mut points = series();
        points[3].demand_mw = f64::NAN;
        points[4].demand_mw = -1.5;

        cache.put(&key(), &points).unwrap();
        let back = cache.get(&key()).unwrap();

        assert_eq!(back.len(), points.len());
        for (a, b) in back.iter().zip(&points) {
            assert_eq!(a.timestamp, b.timestamp);
            assert!(a.demand_mw == b.demand_mw || (a.demand_mw.is_nan() && b.demand_mw.is_nan()));
        }
    }

    #[test]
    fn file_has_exactly_two_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entry.parquet");
        write_series_file(&path, &series()).unwrap();

        let file = File::open(&path).unwrap();
        let builder = ParquetRecordBatchReaderBuilder::try_new(file).unwrap();
        let names: Vec<String> = builder.schema().fields().iter().map(|f| f.name().clone()).collect();
        assert_eq!(names, vec![TIMESTAMP_COLUMN.to_string(), DEMAND_COLUMN.to_string()]);
    }

    #[test]
    fn empty_series_is_a_hit() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path(), CachePolicy::Permanent);
        cache.put(&key(), &[]).unwrap();
        assert_eq!(cache.get(&key()), Some(Vec::new()));
    }

    #[test]
    fn missing_and_corrupt_entries_are_misses() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path(), CachePolicy::Permanent);
        assert!(cache.get(&key()).is_none());

        fs::write(cache.path_for(&key()), b"not parquet").unwrap();
        assert!(cache.get(&key()).is_none());
    }

    #[test]
    fn disabled_cache_never_touches_disk() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path().join("nested"), CachePolicy::Disabled);
        cache.put(&key(), &series()).unwrap();
        assert!(!dir.path().join("nested").exists());
        assert!(cache.get(&key()).is_none());
    }

    #[test]
    fn max_age_expires_entries() {
        let dir = tempfile::tempdir().unwrap();
        let permanent = DiskCache::new(dir.path(), CachePolicy::Permanent);
        permanent.put(&key(), &series()).unwrap();

        let fresh = DiskCache::new(dir.path(), CachePolicy::MaxAge(StdDuration::from_secs(3600)));
        assert!(fresh.get(&key()).is_some());

        let expired = DiskCache::new(dir.path(), CachePolicy::MaxAge(StdDuration::ZERO));
        std::thread::sleep(StdDuration::from_millis(20));
        assert!(expired.get(&key()).is_none());
    }

    #[test]
    fn write_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"x").unwrap();
        // A regular file where the cache directory should be.
        let cache = DiskCache::new(&blocker, CachePolicy::Permanent);
        assert!(matches!(cache.put(&key(), &series()), Err(CacheError::Write { .. })));
    }
}
