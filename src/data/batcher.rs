//! Split a request window into bounded batches.

use std::iter::FusedIterator;

use chrono::{Duration, NaiveDateTime};

use crate::domain::{Batch, System};

/// Lazy iterator over consecutive `[a, b)` batches covering `[start, end)`.
///
/// Every batch is at most `max_batch_days` long and the last one may be
/// shorter. `start >= end` yields nothing. The iterator is `Clone`, so a copy
/// taken before iteration replays the same sequence.
#[derive(Debug, Clone)]
pub struct RangeBatcher {
    system: System,
    cursor: NaiveDateTime,
    end: NaiveDateTime,
    step: Duration,
}

impl RangeBatcher {
    /// `max_batch_days` of zero is treated as one. Lengths past the end of
    /// the calendar yield a single batch.
    pub fn new(system: System, start: NaiveDateTime, end: NaiveDateTime, max_batch_days: u32) -> Self {
        Self {
            system,
            cursor: start,
            end,
            step: Duration::try_days(i64::from(max_batch_days.max(1))).unwrap_or(Duration::MAX),
        }
    }
}

impl Iterator for RangeBatcher {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        if self.cursor >= self.end {
            return None;
        }
        let next = self
            .cursor
            .checked_add_signed(self.step)
            .map_or(self.end, |t| t.min(self.end));
        let batch = Batch {
            system: self.system,
            range_start: self.cursor,
            range_end: next,
        };
        self.cursor = next;
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.cursor >= self.end {
            return (0, Some(0));
        }
        let span = (self.end - self.cursor).num_seconds();
        let step = self.step.num_seconds();
        let n = usize::try_from((span + step - 1) / step).unwrap_or(usize::MAX);
        (n, Some(n))
    }
}

impl FusedIterator for RangeBatcher {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, 0, 0).unwrap()
    }

    #[test]
    fn batches_cover_window_exactly() {
        let starts = [at(2025, 1, 1, 0), at(2025, 2, 27, 13)];
        let spans_hours = [1_i64, 23, 24, 24 * 7, 24 * 7 + 1, 24 * 14, 24 * 21 - 5, 24 * 40];
        for start in starts {
            for span in spans_hours {
                let end = start + Duration::hours(span);
                for max_days in [1_u32, 2, 7, 10] {
                    let batches: Vec<Batch> = RangeBatcher::new(System::Sin, start, end, max_days).collect();
                    assert!(!batches.is_empty());
                    assert_eq!(batches.first().unwrap().range_start, start);
                    assert_eq!(batches.last().unwrap().range_end, end);
                    for pair in batches.windows(2) {
                        assert_eq!(pair[0].range_end, pair[1].range_start, "gap or overlap");
                    }
                    for b in &batches {
                        assert!(b.range_start < b.range_end);
                        assert!(b.range_end - b.range_start <= Duration::days(i64::from(max_days)));
                    }
                }
            }
        }
    }

    #[test]
    fn degenerate_window_is_empty() {
        let t = at(2025, 1, 1, 0);
        assert_eq!(RangeBatcher::new(System::Bca, t, t, 7).count(), 0);
        assert_eq!(RangeBatcher::new(System::Bca, t + Duration::hours(1), t, 7).count(), 0);
    }

    #[test]
    fn last_batch_may_be_short() {
        let start = at(2025, 1, 1, 0);
        let end = at(2025, 1, 11, 0);
        let batches: Vec<Batch> = RangeBatcher::new(System::Bcs, start, end, 7).collect();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].range_end, at(2025, 1, 8, 0));
        assert_eq!(batches[1].range_end - batches[1].range_start, Duration::days(3));
    }

    #[test]
    fn clone_restarts_sequence() {
        let batcher = RangeBatcher::new(System::Sin, at(2025, 1, 1, 0), at(2025, 1, 22, 0), 7);
        let first: Vec<Batch> = batcher.clone().collect();
        let second: Vec<Batch> = batcher.collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn huge_batch_length_yields_single_batch() {
        let start = at(2025, 1, 1, 0);
        let end = at(2025, 1, 4, 0);
        for max_days in [200_000_000_u32, u32::MAX] {
            let batcher = RangeBatcher::new(System::Sin, start, end, max_days);
            assert_eq!(batcher.size_hint(), (1, Some(1)));
            let batches: Vec<Batch> = batcher.collect();
            assert_eq!(batches.len(), 1);
            assert_eq!(batches[0].range_start, start);
            assert_eq!(batches[0].range_end, end);
        }
    }

    #[test]
    fn size_hint_matches_count() {
        let batcher = RangeBatcher::new(System::Sin, at(2025, 1, 1, 0), at(2025, 1, 16, 0), 7);
        assert_eq!(batcher.size_hint(), (3, Some(3)));
        assert_eq!(batcher.count(), 3);
    }
}
