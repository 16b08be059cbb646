//! Transaction table
//!
//! Process-local bookkeeping for open transactions. Outcomes are durable
//! only through the marker records in the log.

use std::collections::HashMap;
use std::fmt;
use std::time::SystemTime;

use crate::error::{Result, WalError};

/// Lifecycle state of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committing,
    Committed,
    Aborted,
}

impl TransactionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TransactionState::Committed | TransactionState::Aborted)
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionState::Active => "active",
            TransactionState::Committing => "committing",
            TransactionState::Committed => "committed",
            TransactionState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// An open group of writes
#[derive(Debug, Clone)]
pub struct Transaction {
    pub id: u64,
    pub state: TransactionState,
    /// Informational only
    pub started_at: SystemTime,
}

impl Transaction {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            state: TransactionState::Active,
            started_at: SystemTime::now(),
        }
    }
}

/// Live transactions plus the id allocator
#[derive(Debug)]
pub(crate) struct TransactionTable {
    next_id: u64,
    live: HashMap<u64, Transaction>,
}

impl TransactionTable {
    /// Table seeded from recovery
    pub(crate) fn new(next_id: u64, live: HashMap<u64, Transaction>) -> Self {
        Self {
            next_id: next_id.max(1),
            live,
        }
    }

    /// Allocate an id and register it as active
    pub(crate) fn begin(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.live.insert(id, Transaction::new(id));
        id
    }

    /// Move an active transaction to `Committing`
    pub(crate) fn start_commit(&mut self, id: u64) -> Result<()> {
        let txn = self.active_mut(id)?;
        txn.state = TransactionState::Committing;
        Ok(())
    }

    /// Return a transaction whose commit marker could not be written
    pub(crate) fn revert_commit(&mut self, id: u64) {
        if let Some(txn) = self.live.get_mut(&id) {
            txn.state = TransactionState::Active;
        }
    }

    /// Mark committed and drop from the table
    pub(crate) fn finish_commit(&mut self, id: u64) -> Option<Transaction> {
        let mut txn = self.live.remove(&id)?;
        txn.state = TransactionState::Committed;
        Some(txn)
    }

    /// Take an active transaction out of the table for aborting
    pub(crate) fn take_for_abort(&mut self, id: u64) -> Result<Transaction> {
        self.active_mut(id)?;
        let mut txn = self
            .live
            .remove(&id)
            .ok_or(WalError::InvalidOrInactiveTransaction(id))?;
        txn.state = TransactionState::Aborted;
        Ok(txn)
    }

    /// Put back a transaction whose rollback marker could not be written
    pub(crate) fn restore(&mut self, mut txn: Transaction) {
        txn.state = TransactionState::Active;
        self.live.insert(txn.id, txn);
    }

    pub(crate) fn state(&self, id: u64) -> Option<TransactionState> {
        self.live.get(&id).map(|txn| txn.state)
    }

    /// Ids of active transactions, ascending
    pub(crate) fn active_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self
            .live
            .values()
            .filter(|txn| txn.state == TransactionState::Active)
            .map(|txn| txn.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub(crate) fn next_id(&self) -> u64 {
        self.next_id
    }

    fn active_mut(&mut self, id: u64) -> Result<&mut Transaction> {
        match self.live.get_mut(&id) {
            Some(txn) if txn.state == TransactionState::Active => Ok(txn),
            _ => Err(WalError::InvalidOrInactiveTransaction(id)),
        }
    }
}
