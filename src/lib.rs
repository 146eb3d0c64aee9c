//! # Bubble Store
//!
//! A lazy, dual-indexed record cache over append-only streams of
//! timestamped records.
//!
//! ## Core Concepts
//!
//! - **Records**: a payload with optional global index and timestamp
//! - **Backing stores**: randomly addressable by index or timestamp
//!   ([`MemoryStore`], on-disk [`StreamStore`])
//! - **Streams**: typed read/write facades over a store ([`DataStream`],
//!   [`DataStreamWriter`])
//! - **Bubbles**: windows over a stream, loaded lazily or in bulk and
//!   addressed by local index or by time ([`Bubble`])
//!
//! ## Example
//!
//! ```ignore
//! use bubble_store::{
//!     Bubble, DataStream, DataStreamWriter, GlobalIndex, LocalIndex, Record, StreamConfig, Timestamp,
//! };
//!
//! let writer = DataStreamWriter::<Pose>::open(StreamConfig::new("./run", "poses"), false)?;
//! for pose in poses {
//!     writer.write(&Record::new(pose).with_timestamp(Timestamp::now()))?;
//! }
//!
//! let stream = DataStream::<Pose, _>::new(writer.store());
//! let mut bubble = Bubble::new();
//! bubble.initialize(&stream);
//! bubble.set_index_window(GlobalIndex(10), GlobalIndex(20))?;
//!
//! // Loaded from the stream on first access, from memory afterwards.
//! let pose = bubble.retrieve(LocalIndex(3))?;
//! ```

pub mod bubble;
pub mod error;
pub mod memory;
pub mod record;
pub mod records;
pub mod source;
pub mod store;
pub mod stream;
pub mod types;

// Re-exports
pub use bubble::{to_global, to_local, Bubble, Window};
pub use error::{Result, StorageError};
pub use memory::MemoryStore;
pub use record::{Payload, Record, TypedPayload};
pub use records::{StreamIndex, StreamLog};
pub use source::{BackingStore, RecordSource};
pub use store::{StreamConfig, StreamStore, CALIBRATION_STREAM};
pub use stream::{DataStream, DataStreamWriter, CALIBRATION_INDEX};
pub use types::*;
