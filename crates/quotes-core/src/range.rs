//! Half-open time ranges and durable coverage bookkeeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{DataError, Result};
use crate::granularity::Granularity;
use crate::types::Symbol;

/// Half-open time window `[start, end)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    /// Inclusive start.
    pub start: DateTime<Utc>,
    /// Exclusive end.
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Creates a new range.
    ///
    /// # Errors
    /// Returns [`DataError::InvalidParameter`] if `end < start`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if end < start {
            return Err(DataError::InvalidParameter(format!(
                "range end {end} precedes start {start}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Returns true if the range contains no instant.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Returns true if `t` lies inside the range.
    #[must_use]
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t < self.end
    }

    /// Clips the range so that it ends no later than `limit`.
    #[must_use]
    pub fn clip_end(&self, limit: DateTime<Utc>) -> Self {
        Self {
            start: self.start,
            end: self.end.min(limit).max(self.start),
        }
    }

    /// Returns true if the two ranges overlap or touch.
    fn joins(&self, other: &Self) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {})",
            self.start.timestamp_millis(),
            self.end.timestamp_millis()
        )
    }
}

/// Windows of a bar series that are already held by the durable tier.
///
/// Intervals are kept sorted, non-overlapping and maximally merged.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeCoverage {
    /// Series symbol.
    pub symbol: Symbol,
    /// Series granularity.
    pub granularity: Granularity,
    intervals: Vec<TimeRange>,
}

impl RangeCoverage {
    /// Creates empty coverage for a series.
    #[must_use]
    pub const fn new(symbol: Symbol, granularity: Granularity) -> Self {
        Self {
            symbol,
            granularity,
            intervals: Vec::new(),
        }
    }

    /// Rebuilds coverage from stored intervals, normalising them.
    #[must_use]
    pub fn from_intervals(
        symbol: Symbol,
        granularity: Granularity,
        intervals: impl IntoIterator<Item = TimeRange>,
    ) -> Self {
        let mut coverage = Self::new(symbol, granularity);
        for range in intervals {
            coverage.insert(range);
        }
        coverage
    }

    /// Covered intervals, ascending.
    #[must_use]
    pub fn intervals(&self) -> &[TimeRange] {
        &self.intervals
    }

    /// Returns true if nothing is covered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Unions `range` into the coverage, coalescing adjacent and overlapping intervals.
    pub fn insert(&mut self, range: TimeRange) {
        if range.is_empty() {
            return;
        }
        let mut merged = range;
        let mut kept = Vec::with_capacity(self.intervals.len() + 1);
        for interval in self.intervals.drain(..) {
            if interval.joins(&merged) {
                merged.start = merged.start.min(interval.start);
                merged.end = merged.end.max(interval.end);
            } else {
                kept.push(interval);
            }
        }
        let at = kept.partition_point(|i| i.start < merged.start);
        kept.insert(at, merged);
        self.intervals = kept;
    }

    /// Returns the parts of `range` that are not covered, ascending and disjoint.
    #[must_use]
    pub fn gaps(&self, range: &TimeRange) -> Vec<TimeRange> {
        if range.is_empty() {
            return Vec::new();
        }
        let mut gaps = Vec::new();
        let mut cursor = range.start;
        for interval in &self.intervals {
            if interval.end <= cursor {
                continue;
            }
            if interval.start >= range.end {
                break;
            }
            if interval.start > cursor {
                gaps.push(TimeRange {
                    start: cursor,
                    end: interval.start,
                });
            }
            cursor = cursor.max(interval.end);
            if cursor >= range.end {
                break;
            }
        }
        if cursor < range.end {
            gaps.push(TimeRange {
                start: cursor,
                end: range.end,
            });
        }
        gaps
    }

    /// Returns true if `range` is fully covered.
    #[must_use]
    pub fn covers(&self, range: &TimeRange) -> bool {
        self.gaps(range).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, d, 0, 0, 0).unwrap()
    }

    fn range(a: u32, b: u32) -> TimeRange {
        TimeRange::new(day(a), day(b)).unwrap()
    }

    fn coverage() -> RangeCoverage {
        RangeCoverage::new(Symbol::new("AAPL"), Granularity::Day)
    }

    #[test]
    fn test_adjacent_windows_coalesce() {
        let mut cov = coverage();
        cov.insert(range(1, 5));
        cov.insert(range(5, 9));
        assert_eq!(cov.intervals(), &[range(1, 9)]);
    }

    #[test]
    fn test_overlapping_and_bridging_inserts_coalesce() {
        let mut cov = coverage();
        cov.insert(range(10, 12));
        cov.insert(range(1, 3));
        cov.insert(range(5, 7));
        assert_eq!(cov.intervals().len(), 3);
        assert_eq!(cov.intervals()[0], range(1, 3));

        cov.insert(range(2, 11));
        assert_eq!(cov.intervals(), &[range(1, 12)]);
    }

    #[test]
    fn test_gaps_are_the_uncovered_complement() {
        let mut cov = coverage();
        cov.insert(range(3, 5));
        cov.insert(range(7, 8));
        assert_eq!(
            cov.gaps(&range(1, 10)),
            vec![range(1, 3), range(5, 7), range(8, 10)]
        );
        assert_eq!(cov.gaps(&range(3, 5)), Vec::new());
        assert_eq!(cov.gaps(&range(4, 6)), vec![range(5, 6)]);
        assert!(cov.covers(&range(7, 8)));
    }

    #[test]
    fn test_empty_range_has_no_gaps() {
        let cov = coverage();
        assert!(cov.gaps(&range(4, 4)).is_empty());
        assert_eq!(cov.gaps(&range(4, 6)), vec![range(4, 6)]);
    }

    #[test]
    fn test_inverted_range_is_rejected() {
        assert!(TimeRange::new(day(5), day(4)).is_err());
    }

    #[test]
    fn test_clip_end() {
        assert_eq!(range(1, 10).clip_end(day(4)), range(1, 4));
        assert!(range(5, 10).clip_end(day(4)).is_empty());
        assert_eq!(range(1, 3).clip_end(day(4)), range(1, 3));
    }

    #[test]
    fn test_normalises_stored_intervals() {
        let cov = RangeCoverage::from_intervals(
            Symbol::new("AAPL"),
            Granularity::Day,
            vec![range(4, 6), range(1, 4), range(8, 9)],
        );
        assert_eq!(cov.intervals(), &[range(1, 6), range(8, 9)]);
    }

    #[test]
    fn test_serde_round_trip_keeps_intervals() {
        let mut cov = coverage();
        cov.insert(range(1, 2));
        let json = serde_json::to_string(&cov).unwrap();
        let back: RangeCoverage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cov);
    }
}
