//! Typed stream facade.
//!
//! [`DataStream`] turns raw store records into typed [`Record`]s and is the
//! usual source a [`Bubble`] is bound to. [`DataStreamWriter`] is its
//! counterpart for writing typed records to an on-disk stream.
//!
//! [`Record`]: crate::Record
//! [`Bubble`]: crate::Bubble

mod reader;
mod writer;

pub use reader::{DataStream, CALIBRATION_INDEX};
pub use writer::DataStreamWriter;
