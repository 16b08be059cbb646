//! Active transaction tracker
//!
//! Remembers, across separate CLI invocations, which single transaction is
//! open. This is independent of the WAL's own transaction table.
//!
//! State lives in `{dir}/.txstate` and is replaced atomically
//! (write temp file, then rename).

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WalError};

/// Name of the state file inside the WAL directory
pub const STATE_FILE: &str = ".txstate";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
struct TrackerState {
    active: bool,
    txn_id: u64,
}

/// File-backed record of the one transaction a CLI user has open
pub struct TxnTracker {
    path: PathBuf,
    lock: Mutex<()>,
}

impl TxnTracker {
    /// Tracker whose state file lives in `dir`
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(STATE_FILE),
            lock: Mutex::new(()),
        }
    }

    /// Open a new transaction and return its id
    ///
    /// The id is at least `floor`, so callers can keep it clear of ids the
    /// log already holds. Fails if a transaction is already open.
    pub fn begin(&self, floor: u64) -> Result<u64> {
        let _guard = self.lock.lock();

        let mut state = self.load()?;
        if state.active {
            return Err(WalError::Tracker(format!(
                "transaction {} is already active",
                state.txn_id
            )));
        }

        state.txn_id = (state.txn_id + 1).max(floor);
        state.active = true;
        self.store(&state)?;

        Ok(state.txn_id)
    }

    /// Close the open transaction
    ///
    /// Ids are never handed out twice, aborted or not: a reused id would let
    /// a later commit marker expose the aborted writes.
    pub fn end(&self, txn_id: u64, committed: bool) -> Result<()> {
        let _guard = self.lock.lock();

        let mut state = self.load()?;
        if !state.active || state.txn_id != txn_id {
            return Err(WalError::Tracker(format!(
                "no active transaction with id {}",
                txn_id
            )));
        }

        state.active = false;
        tracing::debug!(txn = txn_id, committed, "tracked transaction ended");
        self.store(&state)
    }

    /// Id of the open transaction, if any
    pub fn active(&self) -> Result<Option<u64>> {
        let _guard = self.lock.lock();

        let state = self.load()?;
        Ok(state.active.then_some(state.txn_id))
    }

    /// Path of the state file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<TrackerState> {
        match fs::read(&self.path) {
            Ok(bytes) => bincode::deserialize(&bytes)
                .map_err(|e| WalError::Serialization(format!("tracker state: {}", e))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(TrackerState::default()),
            Err(e) => Err(WalError::io("read tracker state", &self.path, e)),
        }
    }

    fn store(&self, state: &TrackerState) -> Result<()> {
        let bytes = bincode::serialize(state)
            .map_err(|e| WalError::Serialization(format!("tracker state: {}", e)))?;

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, bytes).map_err(|e| WalError::io("write tracker state", &tmp, e))?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| WalError::io("replace tracker state", &self.path, e))
    }
}
