//! WAL Manager
//!
//! The public entry point: assigns sequence numbers, tracks transactions,
//! runs recovery on open and filters reads by transaction outcome.

use std::collections::HashMap;
use std::path::Path;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{Result, WalError};

use super::recovery::{self, RecoveryReport};
use super::transaction::{TransactionState, TransactionTable};
use super::{Record, RecordType, SegmentReader, SegmentWriter};

/// A write-ahead log over a directory of segments
///
/// ## Concurrency Model
///
/// - **Log lock** (`log`): serializes sequence assignment, appends, flushes
///   and full scans, so record bytes from different threads never interleave
/// - **Transaction lock** (`transactions`): begin/commit/abort bookkeeping;
///   never held across disk I/O and never held while taking the log lock
/// - The writer's background flusher only ever `try_lock`s the writer
pub struct Wal {
    config: Config,

    /// Appends to the active segment (has its own lock)
    writer: SegmentWriter,

    /// Reader and sequence high-water mark
    log: Mutex<LogState>,

    /// Live transactions and the id allocator
    transactions: Mutex<TransactionTable>,

    /// What the last recovery found
    recovery: RecoveryReport,
}

struct LogState {
    reader: SegmentReader,
    last_sequence: u64,
    closed: bool,
}

impl LogState {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(WalError::Closed);
        }
        Ok(())
    }

    fn next_sequence(&self) -> u64 {
        self.last_sequence + 1
    }
}

impl Wal {
    /// Open or create a WAL with the given config
    ///
    /// On startup:
    /// 1. Open the latest segment for appending (creating the directory
    ///    and the first segment if needed)
    /// 2. Replay the log to rebuild the transaction table
    /// 3. Ready to serve requests
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        let writer = SegmentWriter::open(&config.dir, &config)?;
        let mut reader = SegmentReader::open(&config.dir)?;

        let recovered = recovery::recover(&mut reader, config.recovery_policy)?;
        if let Some((segment, offset)) = recovered.report.truncated_at {
            writer.truncate_tail(segment, offset)?;
        }

        let report = recovered.report;
        info!(
            dir = %config.dir.display(),
            records = report.records_scanned,
            last_sequence = report.last_sequence,
            active_transactions = report.active_transactions.len(),
            "WAL recovered"
        );

        let transactions = TransactionTable::new(report.max_transaction_id + 1, recovered.active);

        Ok(Self {
            log: Mutex::new(LogState {
                reader,
                last_sequence: report.last_sequence,
                closed: false,
            }),
            transactions: Mutex::new(transactions),
            writer,
            recovery: report,
            config,
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::with_dir(path))
    }

    /// Start a transaction
    ///
    /// Only registers the id in memory: no begin marker is logged, so a
    /// transaction that never writes leaves no trace in the log.
    /// Fails with `WalError::Closed` once the WAL is closed.
    pub fn begin(&self) -> Result<u64> {
        self.log.lock().ensure_open()?;

        let id = self.transactions.lock().begin();
        debug!(txn = id, "transaction started");
        Ok(id)
    }

    /// Append a key/value write
    ///
    /// With `transaction_id == 0` the record is flushed before returning.
    /// Otherwise it stays invisible to `read_all` until the transaction
    /// commits. The id is not checked against the table: another process
    /// may own the transaction.
    ///
    /// A failed write leaves nothing in the log and does not use up its
    /// sequence number.
    pub fn write(&self, transaction_id: u64, key: &[u8], value: &[u8]) -> Result<u64> {
        let mut log = self.log.lock();
        log.ensure_open()?;

        let sequence = log.next_sequence();
        let record = Record::write(sequence, transaction_id, key.to_vec(), value.to_vec());
        if transaction_id == 0 {
            self.writer.write_sync(&record)?;
        } else {
            self.writer.write(&record)?;
        }
        log.last_sequence = sequence;
        Ok(sequence)
    }

    /// Commit an active transaction
    ///
    /// Logs a commit marker and flushes it with the transaction's writes.
    /// If that fails the marker is not in the log and the transaction is
    /// active again, so the commit can be retried.
    pub fn commit(&self, transaction_id: u64) -> Result<()> {
        self.transactions.lock().start_commit(transaction_id)?;

        if let Err(e) = self.append_marker(RecordType::TxnCommit, transaction_id, true) {
            self.transactions.lock().revert_commit(transaction_id);
            return Err(e);
        }

        self.transactions.lock().finish_commit(transaction_id);
        debug!(txn = transaction_id, "transaction committed");
        Ok(())
    }

    /// Abort an active transaction
    ///
    /// The rollback marker is not flushed: an unresolved transaction is
    /// just as invisible as an aborted one.
    pub fn abort(&self, transaction_id: u64) -> Result<()> {
        let txn = self.transactions.lock().take_for_abort(transaction_id)?;

        if let Err(e) = self.append_marker(RecordType::TxnRollback, transaction_id, false) {
            self.transactions.lock().restore(txn);
            return Err(e);
        }

        debug!(txn = transaction_id, "transaction aborted");
        Ok(())
    }

    /// Append a flushed checkpoint record
    pub fn checkpoint(&self) -> Result<u64> {
        let mut log = self.log.lock();
        log.ensure_open()?;

        let sequence = log.next_sequence();
        self.writer
            .write_sync(&Record::marker(RecordType::Checkpoint, sequence, 0))?;
        log.last_sequence = sequence;

        debug!(sequence, "checkpoint written");
        Ok(sequence)
    }

    /// Every visible record, in log order
    ///
    /// Two passes over the whole log:
    /// 1. collect the outcome of every transaction from its marker
    /// 2. keep non-transactional records and writes of committed
    ///    transactions; drop markers and everything else
    pub fn read_all(&self) -> Result<Vec<Record>> {
        let mut log = self.log.lock();
        log.ensure_open()?;

        // Appends are blocked by the log lock, so after this the files hold
        // every record and the flusher has nothing left to write.
        self.writer.flush()?;

        let reader = &mut log.reader;

        // Pass 1: transaction outcomes (true = committed)
        reader.seek_to_start()?;
        let mut outcomes: HashMap<u64, bool> = HashMap::new();
        for record in reader.records() {
            let record = record?;
            match record.record_type {
                RecordType::TxnCommit => {
                    outcomes.insert(record.transaction_id, true);
                }
                RecordType::TxnRollback => {
                    outcomes.insert(record.transaction_id, false);
                }
                _ => {}
            }
        }

        // Pass 2: visible records
        reader.seek_to_start()?;
        let mut visible = Vec::new();
        for record in reader.records() {
            let record = record?;
            let keep = match record.record_type {
                RecordType::Write => {
                    record.transaction_id == 0
                        || outcomes.get(&record.transaction_id) == Some(&true)
                }
                kind if kind.is_txn_marker() => false,
                _ => record.transaction_id == 0,
            };
            if keep {
                visible.push(record);
            }
        }
        reader.close();

        Ok(visible)
    }

    /// Flush buffered writes without closing
    pub fn sync(&self) -> Result<()> {
        let log = self.log.lock();
        log.ensure_open()?;
        self.writer.flush()
    }

    /// Close the writer and reader
    ///
    /// Blocks until the background flusher has stopped and the buffer is
    /// on disk. Idempotent.
    pub fn close(&self) -> Result<()> {
        let mut log = self.log.lock();
        if log.closed {
            return Ok(());
        }
        log.closed = true;
        log.reader.close();
        self.writer.close()
    }

    fn append_marker(
        &self,
        record_type: RecordType,
        transaction_id: u64,
        flush: bool,
    ) -> Result<u64> {
        let mut log = self.log.lock();
        log.ensure_open()?;

        let sequence = log.next_sequence();
        let marker = Record::marker(record_type, sequence, transaction_id);
        if flush {
            self.writer.write_sync(&marker)?;
        } else {
            self.writer.write(&marker)?;
        }
        log.last_sequence = sequence;
        Ok(sequence)
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Highest sequence number assigned so far
    pub fn last_sequence(&self) -> u64 {
        self.log.lock().last_sequence
    }

    /// Ids of transactions currently active, ascending
    ///
    /// After a restart this lists transactions the log left unresolved.
    pub fn active_transactions(&self) -> Vec<u64> {
        self.transactions.lock().active_ids()
    }

    /// State of a live transaction; `None` once it has been resolved
    pub fn transaction_state(&self, transaction_id: u64) -> Option<TransactionState> {
        self.transactions.lock().state(transaction_id)
    }

    /// Id the next `begin` will hand out
    pub fn next_transaction_id(&self) -> u64 {
        self.transactions.lock().next_id()
    }

    /// What recovery found when this WAL was opened
    pub fn recovery_report(&self) -> &RecoveryReport {
        &self.recovery
    }

    /// Id of the segment accepting appends
    pub fn current_segment(&self) -> u64 {
        self.writer.segment_id()
    }

    /// Get the WAL directory
    pub fn dir(&self) -> &Path {
        &self.config.dir
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}
