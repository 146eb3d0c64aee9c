//! Core types shared by the cache, the stream facade and the stores.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Timestamp value a store uses for records that carry no timestamp.
pub const NO_TIMESTAMP_VALUE: i64 = -1;

/// Absolute position of a record in a backing store.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct GlobalIndex(pub u64);

impl GlobalIndex {
    pub fn next(self) -> Self {
        GlobalIndex(self.0 + 1)
    }
}

impl fmt::Debug for GlobalIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Global({})", self.0)
    }
}

impl fmt::Display for GlobalIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of a record relative to the start of a bubble's window.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct LocalIndex(pub u64);

impl fmt::Debug for LocalIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Local({})", self.0)
    }
}

impl fmt::Display for LocalIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Nanoseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp(duration.as_nanos() as i64)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ns", self.0)
    }
}

/// Payload encoding format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PayloadEncoding {
    #[default]
    Json,
    MessagePack,
    Raw,
}

impl PayloadEncoding {
    pub(crate) fn to_byte(self) -> u8 {
        match self {
            PayloadEncoding::Json => 0,
            PayloadEncoding::MessagePack => 1,
            PayloadEncoding::Raw => 2,
        }
    }

    pub(crate) fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(PayloadEncoding::Json),
            1 => Some(PayloadEncoding::MessagePack),
            2 => Some(PayloadEncoding::Raw),
            _ => None,
        }
    }
}

/// A record as a backing store holds it.
///
/// The timestamp uses the store's sentinel convention: `NO_TIMESTAMP_VALUE`
/// means the record has none. Use [`RawRecord::timestamp`] to read it as an
/// option.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Position in the store (assigned by the store on append).
    pub index: GlobalIndex,

    /// Raw timestamp, or `NO_TIMESTAMP_VALUE`.
    pub time_stamp: i64,

    /// Type tag of the serialized payload.
    pub record_type: String,

    pub encoding: PayloadEncoding,

    /// Serialized payload.
    pub payload: Vec<u8>,
}

impl RawRecord {
    /// Timestamp with the sentinel translated to `None`.
    pub fn timestamp(&self) -> Option<Timestamp> {
        if self.time_stamp == NO_TIMESTAMP_VALUE {
            None
        } else {
            Some(Timestamp(self.time_stamp))
        }
    }

    /// Sentinel-encoded form of an optional timestamp.
    pub fn encode_timestamp(timestamp: Option<Timestamp>) -> i64 {
        timestamp.map_or(NO_TIMESTAMP_VALUE, |t| t.0)
    }
}

/// Which addressing scheme a bubble is using.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum AddressMode {
    #[default]
    Unset,
    Index,
    Time,
}

impl fmt::Display for AddressMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressMode::Unset => write!(f, "unset"),
            AddressMode::Index => write!(f, "index mode"),
            AddressMode::Time => write!(f, "time mode"),
        }
    }
}
