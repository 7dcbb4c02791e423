//! Error types for the AtlasKV index
//!
//! Provides a unified error type for all index operations. "Not found" is
//! never an error: lookups return `Option` and deletes return `bool`.

use thiserror::Error;

use crate::config::RunMode;

/// Result type alias using IndexError
pub type Result<T> = std::result::Result<T, IndexError>;

/// Unified error type for index operations
#[derive(Debug, Error)]
pub enum IndexError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Index File Errors
    // -------------------------------------------------------------------------
    #[error("Corrupt header in index file {file_id}: {reason}")]
    CorruptHeader { file_id: u16, reason: String },

    /// A record ends before its declared size. Replay treats this as the end
    /// of valid data, so callers only see it from the raw decoder.
    #[error("Truncated record: need {needed} bytes, have {available}")]
    TruncatedRecord { needed: usize, available: usize },

    #[error("Index file id space exhausted after file {0}")]
    FileIdExhausted(u16),

    // -------------------------------------------------------------------------
    // Write Rejections
    // -------------------------------------------------------------------------
    #[error("Filesystem rejected writes in {0}")]
    ReadOnlyDetected(String),

    #[error("Index is read-only")]
    ReadOnly,

    #[error("Key too long: {len} bytes (max 255)")]
    KeyTooLong { len: usize },

    #[error("Operation not available in {0} mode")]
    WrongMode(RunMode),

    #[error("Sequence ids exhausted")]
    SequenceExhausted,

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl IndexError {
    /// True when the underlying I/O error means the filesystem refuses writes
    pub fn is_write_refusal(err: &std::io::Error) -> bool {
        // EROFS on Linux and macOS
        const EROFS: i32 = 30;
        err.kind() == std::io::ErrorKind::PermissionDenied || err.raw_os_error() == Some(EROFS)
    }
}
