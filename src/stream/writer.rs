//! Typed writer for on-disk streams.

use crate::error::Result;
use crate::record::{Payload, Record, TypedPayload};
use crate::store::{StreamConfig, StreamStore};
use crate::types::{GlobalIndex, Timestamp};
use std::marker::PhantomData;
use tracing::trace;

/// Appends records of type `T` to a [`StreamStore`].
///
/// The writer owns the store; use [`DataStreamWriter::store`] to read back
/// through a [`DataStream`](crate::DataStream) while writing.
pub struct DataStreamWriter<T> {
    store: StreamStore,
    _payload: PhantomData<fn(T)>,
}

impl<T: TypedPayload> DataStreamWriter<T> {
    /// Open the stream for writing.
    ///
    /// With `append` the existing records are kept and new ones follow them;
    /// otherwise the stream starts empty.
    pub fn open(config: StreamConfig, append: bool) -> Result<Self> {
        let store = if append {
            StreamStore::open_or_create(config)?
        } else {
            StreamStore::create(config)?
        };
        Ok(Self {
            store,
            _payload: PhantomData,
        })
    }

    /// Write a record, keeping its timestamp. Returns the assigned index.
    ///
    /// Any index already on the record is ignored; the stream assigns one.
    pub fn write(&self, record: &Record<T>) -> Result<GlobalIndex> {
        self.write_payload(record.payload(), record.timestamp_opt())
    }

    /// Write a bare payload with an optional timestamp.
    pub fn write_payload(&self, payload: &T, timestamp: Option<Timestamp>) -> Result<GlobalIndex> {
        let raw = self.store.append(Payload::encode(payload)?, timestamp)?;
        trace!(index = raw.index.0, record_type = T::TYPE_NAME, "wrote record");
        Ok(raw.index)
    }

    pub fn store(&self) -> &StreamStore {
        &self.store
    }

    pub fn into_store(self) -> StreamStore {
        self.store
    }

    /// Sync and release the stream.
    pub fn close(self) -> Result<()> {
        self.store.sync()
    }
}
