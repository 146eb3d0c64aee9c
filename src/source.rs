//! Read interfaces between the bubble cache and the stores behind it.
//!
//! [`BackingStore`] is the raw contract a store implements. [`RecordSource`]
//! is the typed view the cache consumes; every backing store is a record
//! source over erased [`Payload`]s, and [`DataStream`](crate::DataStream)
//! provides one over decoded payloads.

use crate::error::Result;
use crate::record::{Payload, Record};
use crate::types::{GlobalIndex, RawRecord, Timestamp};

/// Randomly-addressable store of raw records.
///
/// Point reads return `Ok(None)` on a miss and range reads return an empty
/// vector; errors are reserved for the store's own failures. Both range
/// reads are inclusive on both ends and ordered by global index.
pub trait BackingStore {
    fn read_at_index(&self, index: GlobalIndex) -> Result<Option<RawRecord>>;

    fn read_at_timestamp(&self, timestamp: Timestamp) -> Result<Option<RawRecord>>;

    fn read_at_index_range(&self, begin: GlobalIndex, end: GlobalIndex) -> Result<Vec<RawRecord>>;

    fn read_at_timestamp_range(&self, begin: Timestamp, end: Timestamp) -> Result<Vec<RawRecord>>;

    /// Index of the earliest-timestamped record at or after `timestamp`.
    fn first_index_at_or_after(&self, timestamp: Timestamp) -> Result<Option<GlobalIndex>> {
        let records = self.read_at_timestamp_range(timestamp, Timestamp(i64::MAX))?;
        Ok(records
            .iter()
            .min_by_key(|r| (r.time_stamp, r.index))
            .map(|r| r.index))
    }
}

/// Typed point and range lookups, as consumed by the bubble cache.
pub trait RecordSource {
    type Payload;

    fn read_at_index(&self, index: GlobalIndex) -> Result<Option<Record<Self::Payload>>>;

    fn read_at_timestamp(&self, timestamp: Timestamp) -> Result<Option<Record<Self::Payload>>>;

    fn read_at_index_range(
        &self,
        begin: GlobalIndex,
        end: GlobalIndex,
    ) -> Result<Vec<Record<Self::Payload>>>;

    fn read_at_timestamp_range(
        &self,
        begin: Timestamp,
        end: Timestamp,
    ) -> Result<Vec<Record<Self::Payload>>>;
}

impl<B: BackingStore> RecordSource for B {
    type Payload = Payload;

    fn read_at_index(&self, index: GlobalIndex) -> Result<Option<Record<Payload>>> {
        Ok(BackingStore::read_at_index(self, index)?.map(Record::from_raw))
    }

    fn read_at_timestamp(&self, timestamp: Timestamp) -> Result<Option<Record<Payload>>> {
        Ok(BackingStore::read_at_timestamp(self, timestamp)?.map(Record::from_raw))
    }

    fn read_at_index_range(
        &self,
        begin: GlobalIndex,
        end: GlobalIndex,
    ) -> Result<Vec<Record<Payload>>> {
        Ok(BackingStore::read_at_index_range(self, begin, end)?
            .into_iter()
            .map(Record::from_raw)
            .collect())
    }

    fn read_at_timestamp_range(
        &self,
        begin: Timestamp,
        end: Timestamp,
    ) -> Result<Vec<Record<Payload>>> {
        Ok(BackingStore::read_at_timestamp_range(self, begin, end)?
            .into_iter()
            .map(Record::from_raw)
            .collect())
    }
}
