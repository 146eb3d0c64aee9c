//! On-disk stream log and its index.
//!
//! Records are stored in an append-only log; the index maps global indices
//! and timestamps to log offsets and is rebuilt when a stream is opened.

mod index;
mod log;

pub use index::StreamIndex;
pub use log::{LogIterator, StreamLog};
