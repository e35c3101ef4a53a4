//! The retained series: an ascending-by-time deque of points.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use crate::types::{Labels, MetricPoint, TimeRange, TimestampedValue};

/// One retained entry.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Entry {
    pub(crate) timestamp: DateTime<Utc>,
    pub(crate) point: MetricPoint,
    pub(crate) labels: Labels,
}

impl Entry {
    fn to_value(&self) -> TimestampedValue {
        TimestampedValue {
            timestamp: self.timestamp,
            value: self.point.value,
            kind: self.point.kind,
            labels: self.labels.clone(),
        }
    }
}

/// Points of one (entity, metric) pair, kept in non-decreasing timestamp order.
///
/// Equal timestamps keep their insertion order.
#[derive(Debug, Clone, Default)]
pub(crate) struct RetainedSeries {
    entries: VecDeque<Entry>,
}

impl RetainedSeries {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Inserts a point at its ordered position, after any equal timestamps.
    pub(crate) fn insert(&mut self, timestamp: DateTime<Utc>, point: MetricPoint, labels: Labels) {
        let entry = Entry {
            timestamp,
            point,
            labels,
        };
        // Common case: batches arrive in timestamp order.
        if self
            .entries
            .back()
            .is_none_or(|last| last.timestamp <= timestamp)
        {
            self.entries.push_back(entry);
            return;
        }
        let pos = self.entries.partition_point(|e| e.timestamp <= timestamp);
        self.entries.insert(pos, entry);
    }

    /// Drops entries older than `cutoff` from the front. Returns how many were dropped.
    pub(crate) fn prune(&mut self, cutoff: DateTime<Utc>) -> usize {
        let mut pruned = 0;
        while self.entries.front().is_some_and(|e| e.timestamp < cutoff) {
            self.entries.pop_front();
            pruned += 1;
        }
        pruned
    }

    /// Returns copies of the entries inside `range`, oldest first.
    pub(crate) fn range(&self, range: &TimeRange) -> Vec<TimestampedValue> {
        if range.is_empty() {
            return Vec::new();
        }
        let lo = self.entries.partition_point(|e| e.timestamp < range.start);
        let hi = self.entries.partition_point(|e| e.timestamp < range.end);
        self.entries.range(lo..hi).map(Entry::to_value).collect()
    }

    pub(crate) fn latest(&self) -> Option<&Entry> {
        self.entries.back()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    fn timestamps(&self) -> Vec<DateTime<Utc>> {
        self.entries.iter().map(|e| e.timestamp).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;

    fn base() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn at(offset_secs: i64) -> DateTime<Utc> {
        base() + Duration::seconds(offset_secs)
    }

    fn series_of(offsets: &[i64]) -> RetainedSeries {
        let mut series = RetainedSeries::new();
        for (i, offset) in offsets.iter().enumerate() {
            series.insert(at(*offset), MetricPoint::gauge(i as i64), Labels::new());
        }
        series
    }

    mod insert_tests {
        use super::*;

        #[test]
        fn in_order_inserts_append() {
            let series = series_of(&[1, 2, 3]);
            assert_eq!(series.timestamps(), vec![at(1), at(2), at(3)]);
        }

        #[test]
        fn out_of_order_insert_keeps_ascending_order() {
            let series = series_of(&[10, 30, 20, 5]);
            assert_eq!(series.timestamps(), vec![at(5), at(10), at(20), at(30)]);
        }

        #[test]
        fn duplicate_timestamps_keep_insertion_order() {
            let series = series_of(&[10, 20, 10]);
            let values: Vec<_> = series
                .entries
                .iter()
                .map(|e| e.point.value.as_int())
                .collect();
            assert_eq!(values, vec![Some(0), Some(2), Some(1)]);
        }
    }

    mod prune_tests {
        use super::*;

        #[test]
        fn prune_removes_only_older_entries() {
            let mut series = series_of(&[1, 2, 3, 4]);
            assert_eq!(series.prune(at(3)), 2);
            assert_eq!(series.timestamps(), vec![at(3), at(4)]);
        }

        #[test]
        fn prune_everything() {
            let mut series = series_of(&[1, 2]);
            assert_eq!(series.prune(at(100)), 2);
            assert!(series.is_empty());
            assert!(series.latest().is_none());
        }

        #[test]
        fn prune_nothing() {
            let mut series = series_of(&[5, 6]);
            assert_eq!(series.prune(at(0)), 0);
            assert_eq!(series.len(), 2);
        }
    }

    mod range_tests {
        use super::*;

        #[test]
        fn range_is_half_open() {
            let series = series_of(&[0, 10, 20, 30]);
            let values = series.range(&TimeRange::new(at(10), at(30)));
            let timestamps: Vec<_> = values.iter().map(|v| v.timestamp).collect();
            assert_eq!(timestamps, vec![at(10), at(20)]);
        }

        #[test]
        fn empty_range_returns_nothing() {
            let series = series_of(&[0, 10]);
            assert!(series.range(&TimeRange::new(at(10), at(10))).is_empty());
            assert!(series.range(&TimeRange::new(at(10), at(0))).is_empty());
        }

        #[test]
        fn range_carries_value_kind_and_labels() {
            let mut series = RetainedSeries::new();
            let mut labels = Labels::new();
            labels.insert("type".to_string(), "pod".to_string());
            series.insert(at(1), MetricPoint::cumulative(2.5), labels.clone());

            let values = series.range(&TimeRange::new(at(0), at(2)));
            assert_eq!(values.len(), 1);
            assert_eq!(values[0].value.as_float(), Some(2.5));
            assert_eq!(values[0].kind, crate::types::MetricKind::Cumulative);
            assert_eq!(values[0].labels, labels);
        }
    }

    proptest! {
        #[test]
        fn prop_insert_keeps_non_decreasing_order(offsets in prop::collection::vec(-1000_i64..1000, 0..64)) {
            let series = series_of(&offsets);
            let timestamps = series.timestamps();
            prop_assert_eq!(timestamps.len(), offsets.len());
            prop_assert!(timestamps.windows(2).all(|w| w[0] <= w[1]));
        }

        #[test]
        fn prop_range_matches_filter(
            offsets in prop::collection::vec(-100_i64..100, 0..64),
            start in -120_i64..120,
            width in -20_i64..120,
        ) {
            let series = series_of(&offsets);
            let range = TimeRange::new(at(start), at(start + width));
            let got: Vec<_> = series.range(&range).iter().map(|v| v.timestamp).collect();

            let mut expected: Vec<_> = offsets
                .iter()
                .map(|o| at(*o))
                .filter(|ts| range.contains(*ts))
                .collect();
            expected.sort();
            prop_assert_eq!(got, expected);
        }

        #[test]
        fn prop_prune_leaves_only_entries_at_or_after_cutoff(
            offsets in prop::collection::vec(-100_i64..100, 0..64),
            cutoff in -120_i64..120,
        ) {
            let mut series = series_of(&offsets);
            let before = series.len();
            let pruned = series.prune(at(cutoff));
            prop_assert_eq!(before - pruned, series.len());
            prop_assert!(series.timestamps().iter().all(|ts| *ts >= at(cutoff)));
            let expected_left = offsets.iter().filter(|o| **o >= cutoff).count();
            prop_assert_eq!(series.len(), expected_left);
        }
    }
}
