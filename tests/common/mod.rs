//! Shared fixtures for integration tests.
#![allow(dead_code)]

use bubble_store::{
    BackingStore, GlobalIndex, MemoryStore, Payload, RawRecord, Record, Result, Timestamp,
    TypedPayload,
};
use serde::{Deserialize, Serialize};
use std::cell::Cell;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub heading: f64,
}

impl TypedPayload for Pose {
    const TYPE_NAME: &'static str = "pose";
}

impl Pose {
    pub fn at(n: u64) -> Self {
        Pose {
            x: n as f64,
            y: n as f64 * 2.0,
            heading: n as f64 * 0.25,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RigCalibration {
    pub intrinsics: Vec<f64>,
}

impl TypedPayload for RigCalibration {
    const TYPE_NAME: &'static str = "rig_calibration";
    const ENCODING: bubble_store::PayloadEncoding = bubble_store::PayloadEncoding::MessagePack;
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::TRACE)
        .try_init();
}

/// Memory store holding a `Pose` at each given global index, timestamped
/// `index * 100`.
pub fn pose_store(indices: impl IntoIterator<Item = u64>) -> MemoryStore {
    let mut store = MemoryStore::new();
    for index in indices {
        let payload = Payload::encode(&Pose::at(index)).unwrap();
        store.insert_at(GlobalIndex(index), payload, Some(Timestamp(index as i64 * 100)));
    }
    store
}

/// Backing store wrapper counting every read.
pub struct CountingStore<B> {
    inner: B,
    reads: Cell<usize>,
}

impl<B: BackingStore> CountingStore<B> {
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            reads: Cell::new(0),
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.get()
    }

    fn count(&self) {
        self.reads.set(self.reads.get() + 1);
    }
}

impl<B: BackingStore> BackingStore for CountingStore<B> {
    fn read_at_index(&self, index: GlobalIndex) -> Result<Option<RawRecord>> {
        self.count();
        self.inner.read_at_index(index)
    }

    fn read_at_timestamp(&self, timestamp: Timestamp) -> Result<Option<RawRecord>> {
        self.count();
        self.inner.read_at_timestamp(timestamp)
    }

    fn read_at_index_range(&self, begin: GlobalIndex, end: GlobalIndex) -> Result<Vec<RawRecord>> {
        self.count();
        self.inner.read_at_index_range(begin, end)
    }

    fn read_at_timestamp_range(&self, begin: Timestamp, end: Timestamp) -> Result<Vec<RawRecord>> {
        self.count();
        self.inner.read_at_timestamp_range(begin, end)
    }
}

/// A typed record as the store at `index` holds it.
pub fn expected_pose(index: u64) -> Record<Pose> {
    Record::new(Pose::at(index))
        .with_index(GlobalIndex(index))
        .with_timestamp(Timestamp(index as i64 * 100))
}
