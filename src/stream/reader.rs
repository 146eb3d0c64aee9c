//! Typed read facade over a backing store.

use crate::error::{Result, StorageError};
use crate::record::{Payload, Record, TypedPayload};
use crate::source::{BackingStore, RecordSource};
use crate::types::{GlobalIndex, Timestamp};
use once_cell::unsync::OnceCell;
use std::cell::Cell;
use std::marker::PhantomData;
use tracing::debug;

/// Global index of the calibration record in a calibration store.
pub const CALIBRATION_INDEX: GlobalIndex = GlobalIndex(1);

/// Reads records of type `T` from a backing store.
///
/// Misses are reported as `None` or an empty vector; decoding failures and
/// store errors are returned as errors. The stream also owns a forward
/// cursor (see [`DataStream::seek_by_index`]) and a once-only cache of the
/// calibration record.
pub struct DataStream<'a, T, S> {
    store: &'a S,
    calibration_store: Option<&'a S>,
    calibration: OnceCell<Record<Payload>>,
    cursor: Cell<Option<GlobalIndex>>,
    _payload: PhantomData<fn() -> T>,
}

impl<'a, T: TypedPayload, S: BackingStore> DataStream<'a, T, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            calibration_store: None,
            calibration: OnceCell::new(),
            cursor: Cell::new(None),
            _payload: PhantomData,
        }
    }

    /// Attach the store holding the calibration record.
    pub fn with_calibration(mut self, calibration_store: &'a S) -> Self {
        self.calibration_store = Some(calibration_store);
        self
    }

    /// The underlying store.
    pub fn store(&self) -> &'a S {
        self.store
    }

    pub fn read_at_index(&self, index: GlobalIndex) -> Result<Option<Record<T>>> {
        BackingStore::read_at_index(self.store, index)?
            .map(|raw| Record::from_raw(raw).decode())
            .transpose()
    }

    pub fn read_at_timestamp(&self, timestamp: Timestamp) -> Result<Option<Record<T>>> {
        BackingStore::read_at_timestamp(self.store, timestamp)?
            .map(|raw| Record::from_raw(raw).decode())
            .transpose()
    }

    pub fn read_at_index_range(&self, begin: GlobalIndex, end: GlobalIndex) -> Result<Vec<Record<T>>> {
        BackingStore::read_at_index_range(self.store, begin, end)?
            .into_iter()
            .map(|raw| Record::from_raw(raw).decode())
            .collect()
    }

    pub fn read_at_timestamp_range(&self, begin: Timestamp, end: Timestamp) -> Result<Vec<Record<T>>> {
        BackingStore::read_at_timestamp_range(self.store, begin, end)?
            .into_iter()
            .map(|raw| Record::from_raw(raw).decode())
            .collect()
    }

    /// Position the cursor at `index`. Returns false if there is no record
    /// there, leaving the cursor unset.
    pub fn seek_by_index(&self, index: GlobalIndex) -> Result<bool> {
        let found = BackingStore::read_at_index(self.store, index)?.is_some();
        self.cursor.set(found.then_some(index));
        Ok(found)
    }

    /// Position the cursor at the earliest record at or after `timestamp`.
    pub fn seek_by_timestamp(&self, timestamp: Timestamp) -> Result<bool> {
        let index = self.store.first_index_at_or_after(timestamp)?;
        self.cursor.set(index);
        Ok(index.is_some())
    }

    /// Read the record under the cursor and advance it.
    ///
    /// Returns `None` once the cursor runs past the end of the stream or if
    /// it was never positioned.
    pub fn read_next_from_seek(&self) -> Result<Option<Record<T>>> {
        let Some(index) = self.cursor.get() else {
            return Ok(None);
        };
        let record = self.read_at_index(index)?;
        self.cursor.set(record.as_ref().map(|_| index.next()));
        Ok(record)
    }

    /// The calibration record, read from the calibration store on first use.
    ///
    /// Later calls return the same cached record without touching the store.
    pub fn calibration_record(&self) -> Result<&Record<Payload>> {
        self.calibration.get_or_try_init(|| {
            let store = self.calibration_store.ok_or_else(|| {
                StorageError::NotFound("no calibration store attached".into())
            })?;
            let raw = BackingStore::read_at_index(store, CALIBRATION_INDEX)?.ok_or_else(|| {
                StorageError::NotFound("calibration store has no records".into())
            })?;
            debug!(record_type = %raw.record_type, "fetched calibration");
            Ok(Record::from_raw(raw))
        })
    }

    /// Decode the cached calibration record as `C`.
    pub fn fetch_calibration<C: TypedPayload>(&self) -> Result<Record<C>> {
        self.calibration_record()?.clone().decode()
    }
}

impl<'a, T: TypedPayload, S: BackingStore> RecordSource for DataStream<'a, T, S> {
    type Payload = T;

    fn read_at_index(&self, index: GlobalIndex) -> Result<Option<Record<T>>> {
        DataStream::read_at_index(self, index)
    }

    fn read_at_timestamp(&self, timestamp: Timestamp) -> Result<Option<Record<T>>> {
        DataStream::read_at_timestamp(self, timestamp)
    }

    fn read_at_index_range(&self, begin: GlobalIndex, end: GlobalIndex) -> Result<Vec<Record<T>>> {
        DataStream::read_at_index_range(self, begin, end)
    }

    fn read_at_timestamp_range(&self, begin: Timestamp, end: Timestamp) -> Result<Vec<Record<T>>> {
        DataStream::read_at_timestamp_range(self, begin, end)
    }
}
