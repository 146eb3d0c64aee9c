//! The bubble cache: a lazily loaded window over a record source.
//!
//! A bubble is scoped either to a range of global indices or to a range of
//! timestamps. Records are addressed by local index (relative to the window
//! start) and can also be looked up by timestamp once loaded.

mod cache;
mod window;

pub use cache::Bubble;
pub use window::{to_global, to_local, Window};
