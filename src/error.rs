//! Error types for the bubble cache and its backing stores.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for cache and stream operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Mixing index and time addressing, or operating in the wrong mode.
    #[error("Mode conflict: {0}")]
    ModeConflict(String),

    /// Malformed window bounds or index arithmetic out of range.
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    /// The bubble has no window to operate on.
    #[error("Window not set")]
    WindowNotSet,

    #[error("Field not set: {0}")]
    UnsetField(&'static str),

    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("No backing store bound")]
    UnboundStore,

    #[error("Stream not found: {}", .0.display())]
    StreamNotFound(PathBuf),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Invalid stream format: {0}")]
    InvalidFormat(String),

    #[error("Checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: u32, got: u32 },

    #[error("Stream is locked by another process")]
    Locked,
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for StorageError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for StorageError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        StorageError::Deserialization(e.to_string())
    }
}

/// Result type for cache and stream operations.
pub type Result<T> = std::result::Result<T, StorageError>;
