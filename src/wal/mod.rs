//! Write-Ahead Log (WAL) Module
//!
//! Provides durability guarantees through append-only segment files.
//!
//! ## Responsibilities
//! - Record framing with CRC32 checksums
//! - Log Sequence Numbers for total ordering
//! - Size-based segment rotation and background flushing
//! - Transaction grouping and crash recovery
//!
//! ## File Format
//! ```text
//! {dir}/00000000000000000001.wal, 00000000000000000002.wal, ...
//!
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Record                                                       │
//! │ ┌─────────┬─────────┬──────┬───────┬────────┬────────┬─────┐ │
//! │ │ Seq (8) │ Txn (8) │Ty (1)│Flg (1)│KLen (2)│VLen (2)│CRC 4│ │
//! │ └─────────┴─────────┴──────┴───────┴────────┴────────┴─────┘ │
//! │ │ key (KLen) │ value (VLen) │                                │
//! └──────────────────────────────────────────────────────────────┘
//! ```

mod manager;
mod reader;
mod record;
mod recovery;
pub mod segment;
mod transaction;
mod writer;

pub use manager::Wal;
pub use reader::{Records, SegmentReader};
pub use record::{Record, RecordType, HEADER_SIZE, MAX_FIELD_LEN};
pub use recovery::RecoveryReport;
pub use transaction::{Transaction, TransactionState};
pub use writer::SegmentWriter;
