//! Error types for wald
//!
//! Provides a unified error type for all operations.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result type alias using WalError
pub type Result<T> = std::result::Result<T, WalError>;

/// Unified error type for wald operations
#[derive(Debug, Error)]
pub enum WalError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error during {op} on {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // -------------------------------------------------------------------------
    // Codec Errors
    // -------------------------------------------------------------------------
    #[error("short buffer: {len} bytes, record header needs {needed}")]
    ShortBuffer { len: usize, needed: usize },

    #[error("unexpected end of record: need {needed} bytes, have {len}")]
    UnexpectedEof { len: usize, needed: usize },

    #[error("checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { stored: u32, computed: u32 },

    #[error("unknown record type tag {0}")]
    UnknownRecordType(u8),

    #[error("{field} too large: {len} bytes (max {max})")]
    FieldTooLarge {
        field: &'static str,
        len: usize,
        max: usize,
    },

    // -------------------------------------------------------------------------
    // Log Scan Errors
    // -------------------------------------------------------------------------
    #[error("WAL corruption in {} at offset {offset}: {source}", path.display())]
    Corruption {
        path: PathBuf,
        offset: u64,
        #[source]
        source: Box<WalError>,
    },

    #[error(
        "WAL truncated in {} at offset {offset}: need {needed} bytes, found {found}",
        path.display()
    )]
    Truncated {
        path: PathBuf,
        offset: u64,
        needed: usize,
        found: usize,
    },

    // -------------------------------------------------------------------------
    // Protocol Errors
    // -------------------------------------------------------------------------
    #[error("WAL is closed")]
    Closed,

    #[error("invalid or inactive transaction {0}")]
    InvalidOrInactiveTransaction(u64),

    #[error("transaction tracker: {0}")]
    Tracker(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl WalError {
    /// Wrap an I/O error with the operation and path it came from
    pub fn io(op: &'static str, path: impl AsRef<Path>, source: std::io::Error) -> Self {
        WalError::Io {
            op,
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Bytes on disk are wrong (checksum or tag)
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            WalError::Corruption { .. }
                | WalError::ChecksumMismatch { .. }
                | WalError::UnknownRecordType(_)
        )
    }

    /// The log ends mid-record, typically a torn write after a crash
    pub fn is_truncation(&self) -> bool {
        matches!(
            self,
            WalError::Truncated { .. }
                | WalError::ShortBuffer { .. }
                | WalError::UnexpectedEof { .. }
        )
    }
}
