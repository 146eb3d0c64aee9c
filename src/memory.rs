//! In-memory backing store.

use crate::error::Result;
use crate::record::{Payload, Record, TypedPayload};
use crate::source::BackingStore;
use crate::types::{GlobalIndex, RawRecord, Timestamp};
use std::collections::{BTreeMap, BTreeSet};

/// A backing store that keeps every record in memory.
///
/// Appended records get consecutive global indices starting at 1; records
/// can also be placed at explicit indices to model sparse streams.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    records: BTreeMap<GlobalIndex, RawRecord>,
    by_time: BTreeSet<(Timestamp, GlobalIndex)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a payload at the next free index.
    pub fn append(&mut self, payload: Payload, timestamp: Option<Timestamp>) -> GlobalIndex {
        let index = self
            .records
            .last_key_value()
            .map_or(GlobalIndex(1), |(last, _)| last.next());
        self.insert_at(index, payload, timestamp);
        index
    }

    /// Serialize and append a typed record, keeping its timestamp.
    pub fn append_record<T: TypedPayload>(&mut self, record: &Record<T>) -> Result<GlobalIndex> {
        let erased = record.erase()?;
        let timestamp = erased.timestamp_opt();
        Ok(self.append(erased.into_payload(), timestamp))
    }

    /// Place a payload at `index`, replacing whatever was there.
    pub fn insert_at(&mut self, index: GlobalIndex, payload: Payload, timestamp: Option<Timestamp>) {
        if let Some(old) = self.records.remove(&index) {
            if let Some(ts) = old.timestamp() {
                self.by_time.remove(&(ts, index));
            }
        }
        if let Some(ts) = timestamp {
            self.by_time.insert((ts, index));
        }

        let record_type = payload.type_name().to_string();
        let encoding = payload.encoding();
        self.records.insert(
            index,
            RawRecord {
                index,
                time_stamp: RawRecord::encode_timestamp(timestamp),
                record_type,
                encoding,
                payload: payload.into_bytes(),
            },
        );
    }

    /// Place a raw record at its own index.
    pub fn insert_raw(&mut self, raw: RawRecord) {
        let timestamp = raw.timestamp();
        let index = raw.index;
        let payload = Record::from_raw(raw).into_payload();
        self.insert_at(index, payload, timestamp);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl BackingStore for MemoryStore {
    fn read_at_index(&self, index: GlobalIndex) -> Result<Option<RawRecord>> {
        Ok(self.records.get(&index).cloned())
    }

    fn read_at_timestamp(&self, timestamp: Timestamp) -> Result<Option<RawRecord>> {
        let first = self
            .by_time
            .range((timestamp, GlobalIndex(0))..=(timestamp, GlobalIndex(u64::MAX)))
            .next();
        Ok(first.and_then(|(_, index)| self.records.get(index).cloned()))
    }

    fn read_at_index_range(&self, begin: GlobalIndex, end: GlobalIndex) -> Result<Vec<RawRecord>> {
        if end < begin {
            return Ok(Vec::new());
        }
        Ok(self.records.range(begin..=end).map(|(_, r)| r.clone()).collect())
    }

    fn read_at_timestamp_range(&self, begin: Timestamp, end: Timestamp) -> Result<Vec<RawRecord>> {
        if end < begin {
            return Ok(Vec::new());
        }
        let mut indices: Vec<GlobalIndex> = self
            .by_time
            .range((begin, GlobalIndex(0))..=(end, GlobalIndex(u64::MAX)))
            .map(|(_, index)| *index)
            .collect();
        indices.sort();
        Ok(indices
            .iter()
            .filter_map(|index| self.records.get(index).cloned())
            .collect())
    }

    fn first_index_at_or_after(&self, timestamp: Timestamp) -> Result<Option<GlobalIndex>> {
        Ok(self
            .by_time
            .range((timestamp, GlobalIndex(0))..)
            .next()
            .map(|(_, index)| *index))
    }
}
