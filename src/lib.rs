//! # wald
//!
//! A segmented write-ahead log with:
//! - Fixed-layout binary records with CRC32 integrity checks
//! - Append-only segment files with size-based rotation
//! - Buffered writes with a background flusher
//! - Transactional write grouping (commit / abort markers)
//! - Crash recovery that rebuilds transaction state from the log alone
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Wal (manager)                       │
//! │     sequence numbers · transaction table · recovery         │
//! └──────────────┬──────────────────────────────┬───────────────┘
//!                │ append                       │ scan
//!                ▼                              ▼
//!   ┌────────────────────────┐      ┌────────────────────────┐
//!   │     SegmentWriter      │      │     SegmentReader      │
//!   │ buffer · rotate · sync │      │ ordered, all segments  │
//!   └───────────┬────────────┘      └───────────┬────────────┘
//!               │                               │
//!               ▼                               ▼
//!        ┌──────────────────────────────────────────────┐
//!        │  00000000000000000001.wal  0000…0002.wal  …  │
//!        └──────────────────────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod wal;
pub mod tracker;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{WalError, Result};
pub use config::{Config, RecoveryPolicy};
pub use wal::{Record, RecordType, Wal};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of wald
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
