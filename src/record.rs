//! Records: a payload with optional index and timestamp metadata.
//!
//! `Record<T>` carries a typed payload. The erased form, `Record<Payload>`,
//! carries serialized bytes tagged with the payload's type name, so decoding
//! it as the wrong type fails with [`StorageError::TypeMismatch`] instead of
//! producing garbage.

use crate::error::{Result, StorageError};
use crate::types::{GlobalIndex, PayloadEncoding, RawRecord, Timestamp};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A payload type that can be stored in a stream.
pub trait TypedPayload: Serialize + DeserializeOwned {
    /// Tag written next to the serialized bytes.
    const TYPE_NAME: &'static str;

    /// Encoding used when writing values of this type.
    const ENCODING: PayloadEncoding = PayloadEncoding::Json;
}

/// A single unit of data, optionally indexed and timestamped.
#[derive(Clone, Debug, PartialEq)]
pub struct Record<T> {
    payload: T,
    index: Option<GlobalIndex>,
    timestamp: Option<Timestamp>,
}

impl<T> Record<T> {
    /// Create a record with no index and no timestamp.
    pub fn new(payload: T) -> Self {
        Self {
            payload,
            index: None,
            timestamp: None,
        }
    }

    pub fn with_index(mut self, index: GlobalIndex) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }

    pub fn payload_mut(&mut self) -> &mut T {
        &mut self.payload
    }

    pub fn into_payload(self) -> T {
        self.payload
    }

    pub fn set_payload(&mut self, payload: T) {
        self.payload = payload;
    }

    pub fn has_timestamp(&self) -> bool {
        self.timestamp.is_some()
    }

    /// Timestamp of the record, failing if none was set.
    pub fn timestamp(&self) -> Result<Timestamp> {
        self.timestamp.ok_or(StorageError::UnsetField("timestamp"))
    }

    pub fn timestamp_opt(&self) -> Option<Timestamp> {
        self.timestamp
    }

    pub fn set_timestamp(&mut self, timestamp: Timestamp) {
        self.timestamp = Some(timestamp);
    }

    pub fn has_index(&self) -> bool {
        self.index.is_some()
    }

    /// Store index of the record, failing if none was set.
    pub fn index(&self) -> Result<GlobalIndex> {
        self.index.ok_or(StorageError::UnsetField("index"))
    }

    pub fn index_opt(&self) -> Option<GlobalIndex> {
        self.index
    }

    pub fn set_index(&mut self, index: GlobalIndex) {
        self.index = Some(index);
    }

    /// Transform the payload, keeping index and timestamp.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Record<U> {
        Record {
            payload: f(self.payload),
            index: self.index,
            timestamp: self.timestamp,
        }
    }

    /// Fallible version of [`Record::map`].
    pub fn try_map<U>(self, f: impl FnOnce(T) -> Result<U>) -> Result<Record<U>> {
        Ok(Record {
            payload: f(self.payload)?,
            index: self.index,
            timestamp: self.timestamp,
        })
    }
}

impl<T: TypedPayload> Record<T> {
    /// Serialize the payload, producing the erased form.
    pub fn erase(&self) -> Result<Record<Payload>> {
        Ok(Record {
            payload: Payload::encode(&self.payload)?,
            index: self.index,
            timestamp: self.timestamp,
        })
    }
}

impl Record<Payload> {
    /// Build an erased record from a store record.
    ///
    /// The store's "no timestamp" sentinel becomes an absent timestamp.
    pub fn from_raw(raw: RawRecord) -> Self {
        let timestamp = raw.timestamp();
        Self {
            payload: Payload {
                type_name: raw.record_type,
                encoding: raw.encoding,
                bytes: raw.payload,
            },
            index: Some(raw.index),
            timestamp,
        }
    }

    /// Decode a copy of the payload as `T`.
    pub fn get<T: TypedPayload>(&self) -> Result<T> {
        self.payload.get()
    }

    /// Decode the payload as `T`, keeping index and timestamp.
    pub fn decode<T: TypedPayload>(self) -> Result<Record<T>> {
        self.try_map(|payload| payload.get())
    }
}

/// Serialized payload tagged with the name of its type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Payload {
    type_name: String,
    encoding: PayloadEncoding,
    bytes: Vec<u8>,
}

impl Payload {
    /// Serialize a typed value.
    pub fn encode<T: TypedPayload>(value: &T) -> Result<Self> {
        let bytes = match T::ENCODING {
            PayloadEncoding::Json => serde_json::to_vec(value)?,
            PayloadEncoding::MessagePack => rmp_serde::to_vec_named(value)?,
            PayloadEncoding::Raw => {
                return Err(StorageError::Serialization(format!(
                    "{} declares raw encoding; build it with Payload::raw",
                    T::TYPE_NAME
                )))
            }
        };
        Ok(Self {
            type_name: T::TYPE_NAME.to_string(),
            encoding: T::ENCODING,
            bytes,
        })
    }

    /// Wrap already-serialized bytes.
    pub fn raw(type_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            type_name: type_name.into(),
            encoding: PayloadEncoding::Raw,
            bytes,
        }
    }

    /// Decode the payload as `T`.
    pub fn get<T: TypedPayload>(&self) -> Result<T> {
        if self.type_name != T::TYPE_NAME {
            return Err(StorageError::TypeMismatch {
                expected: T::TYPE_NAME.to_string(),
                found: self.type_name.clone(),
            });
        }
        match self.encoding {
            PayloadEncoding::Json => serde_json::from_slice(&self.bytes)
                .map_err(|e| StorageError::Deserialization(e.to_string())),
            PayloadEncoding::MessagePack => Ok(rmp_serde::from_slice(&self.bytes)?),
            PayloadEncoding::Raw => Err(StorageError::Deserialization(format!(
                "raw payload of type {} has no decoder",
                self.type_name
            ))),
        }
    }

    /// Whether this payload is tagged as `T`.
    pub fn is<T: TypedPayload>(&self) -> bool {
        self.type_name == T::TYPE_NAME
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn encoding(&self) -> PayloadEncoding {
        self.encoding
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}
