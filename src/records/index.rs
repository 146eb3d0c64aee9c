//! Stream indices for lookups by global index and by timestamp.

use crate::types::{GlobalIndex, Timestamp};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};

/// In-memory index over a stream log.
///
/// Rebuilt from the log when a stream is opened.
#[derive(Default)]
pub struct StreamIndex {
    /// Global index -> log offset.
    offsets: RwLock<BTreeMap<GlobalIndex, u64>>,

    /// (timestamp, global index) pairs, ordered by time then index.
    by_time: RwLock<BTreeSet<(Timestamp, GlobalIndex)>>,
}

impl StreamIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry to the index.
    pub fn add(&self, index: GlobalIndex, timestamp: Option<Timestamp>, offset: u64) {
        self.offsets.write().insert(index, offset);
        if let Some(timestamp) = timestamp {
            self.by_time.write().insert((timestamp, index));
        }
    }

    /// Log offset of a global index.
    pub fn offset(&self, index: GlobalIndex) -> Option<u64> {
        self.offsets.read().get(&index).copied()
    }

    /// Lowest global index recorded at exactly `timestamp`.
    pub fn index_at(&self, timestamp: Timestamp) -> Option<GlobalIndex> {
        self.by_time
            .read()
            .range((timestamp, GlobalIndex(0))..=(timestamp, GlobalIndex(u64::MAX)))
            .next()
            .map(|(_, index)| *index)
    }

    /// Offsets of `[begin, end]`, in index order.
    pub fn offsets_in(&self, begin: GlobalIndex, end: GlobalIndex) -> Vec<u64> {
        if end < begin {
            return Vec::new();
        }
        self.offsets
            .read()
            .range(begin..=end)
            .map(|(_, offset)| *offset)
            .collect()
    }

    /// Global indices with timestamps in `[begin, end]`, in index order.
    pub fn indices_between(&self, begin: Timestamp, end: Timestamp) -> Vec<GlobalIndex> {
        if end < begin {
            return Vec::new();
        }
        let mut indices: Vec<GlobalIndex> = self
            .by_time
            .read()
            .range((begin, GlobalIndex(0))..=(end, GlobalIndex(u64::MAX)))
            .map(|(_, index)| *index)
            .collect();
        indices.sort_unstable();
        indices
    }

    /// Index of the earliest record at or after `timestamp`.
    pub fn first_at_or_after(&self, timestamp: Timestamp) -> Option<GlobalIndex> {
        self.by_time
            .read()
            .range((timestamp, GlobalIndex(0))..)
            .next()
            .map(|(_, index)| *index)
    }

    /// Get count of records.
    pub fn count(&self) -> usize {
        self.offsets.read().len()
    }

    pub fn max_index(&self) -> Option<GlobalIndex> {
        self.offsets.read().keys().next_back().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_lookup() {
        let index = StreamIndex::new();
        index.add(GlobalIndex(1), Some(Timestamp(100)), 0);
        index.add(GlobalIndex(2), None, 64);

        assert_eq!(index.offset(GlobalIndex(1)), Some(0));
        assert_eq!(index.offset(GlobalIndex(2)), Some(64));
        assert_eq!(index.index_at(Timestamp(100)), Some(GlobalIndex(1)));
        assert_eq!(index.count(), 2);
        assert_eq!(index.max_index(), Some(GlobalIndex(2)));
    }

    #[test]
    fn test_shared_timestamp_resolves_to_lowest_index() {
        let index = StreamIndex::new();
        index.add(GlobalIndex(5), Some(Timestamp(7)), 0);
        index.add(GlobalIndex(3), Some(Timestamp(7)), 10);

        assert_eq!(index.index_at(Timestamp(7)), Some(GlobalIndex(3)));
        assert_eq!(
            index.indices_between(Timestamp(7), Timestamp(7)),
            vec![GlobalIndex(3), GlobalIndex(5)]
        );
    }

    #[test]
    fn test_ranges() {
        let index = StreamIndex::new();
        for i in 1..=5u64 {
            index.add(GlobalIndex(i), Some(Timestamp(i as i64 * 10)), i * 100);
        }

        assert_eq!(index.offsets_in(GlobalIndex(2), GlobalIndex(3)), vec![200, 300]);
        assert!(index.offsets_in(GlobalIndex(3), GlobalIndex(2)).is_empty());
        assert_eq!(
            index.indices_between(Timestamp(15), Timestamp(35)),
            vec![GlobalIndex(2), GlobalIndex(3)]
        );
        assert_eq!(index.first_at_or_after(Timestamp(41)), Some(GlobalIndex(5)));
        assert_eq!(index.first_at_or_after(Timestamp(51)), None);
    }
}
