//! WAL Recovery
//!
//! Rebuilds transaction state by replaying the log from the first segment.

use std::collections::HashMap;

use tracing::{trace, warn};

use crate::config::RecoveryPolicy;
use crate::error::{Result, WalError};

use super::transaction::{Transaction, TransactionState};
use super::{RecordType, SegmentReader};

/// Summary of the last recovery pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Number of records replayed
    pub records_scanned: u64,

    /// Highest sequence number seen
    pub last_sequence: u64,

    /// Highest transaction id seen on any record
    pub max_transaction_id: u64,

    /// Transactions left unresolved by the log, ascending
    pub active_transactions: Vec<u64>,

    /// Where the log was cut under `RecoveryPolicy::TruncateTail`
    /// (segment id, offset)
    pub truncated_at: Option<(u64, u64)>,
}

/// Transaction state reconstructed from the log
#[derive(Debug, Default)]
pub(crate) struct RecoveredState {
    pub(crate) active: HashMap<u64, Transaction>,
    pub(crate) report: RecoveryReport,
}

/// Replay the whole log
///
/// - `TxnBegin` registers an active transaction
/// - `TxnCommit` / `TxnRollback` resolve and drop it
/// - a transactional `Write` with no entry yet registers one, which covers
///   logs that carry no begin markers
///
/// Under `RecoveryPolicy::TruncateTail` the first damaged record ends the
/// scan and its position is reported instead of failing; the caller is
/// responsible for cutting the log there.
pub(crate) fn recover(
    reader: &mut SegmentReader,
    policy: RecoveryPolicy,
) -> Result<RecoveredState> {
    reader.seek_to_start()?;

    let mut state = RecoveredState::default();

    loop {
        let record = match reader.next_record() {
            Ok(Some(record)) => record,
            Ok(None) => break,
            Err(e) if policy == RecoveryPolicy::TruncateTail && is_damage(&e) => {
                warn!(error = %e, "damaged WAL record, truncating log tail");
                state.report.truncated_at = reader.position();
                break;
            }
            Err(e) => return Err(e),
        };

        let report = &mut state.report;
        report.records_scanned += 1;
        report.last_sequence = report.last_sequence.max(record.sequence);
        report.max_transaction_id = report.max_transaction_id.max(record.transaction_id);

        let txn_id = record.transaction_id;
        match record.record_type {
            RecordType::TxnBegin => {
                state.active.insert(txn_id, Transaction::new(txn_id));
            }
            RecordType::TxnCommit | RecordType::TxnRollback => {
                if let Some(mut txn) = state.active.remove(&txn_id) {
                    txn.state = if record.record_type == RecordType::TxnCommit {
                        TransactionState::Committed
                    } else {
                        TransactionState::Aborted
                    };
                    trace!(
                        txn = txn_id,
                        state = %txn.state,
                        "transaction resolved during recovery"
                    );
                }
            }
            RecordType::Write if txn_id > 0 => {
                state
                    .active
                    .entry(txn_id)
                    .or_insert_with(|| Transaction::new(txn_id));
            }
            _ => {}
        }
    }

    state.active.retain(|_, txn| txn.state == TransactionState::Active);

    let mut ids: Vec<u64> = state.active.keys().copied().collect();
    ids.sort_unstable();
    state.report.active_transactions = ids;

    reader.seek_to_start()?;
    Ok(state)
}

fn is_damage(err: &WalError) -> bool {
    err.is_corruption() || err.is_truncation()
}
