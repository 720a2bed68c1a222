use std::collections::HashMap;

use log::debug;

use crate::error::DbError;
use crate::tuple::Tuple;
use crate::types::DbResult;
use crate::wait_for_graph::TransactionId;

/// One pending mutation, kept so `abort` can replay it in reverse.
/// This is a tuple-level undo: an `Update` carries its full
/// before-image rather than just the primary key needed to redelete
/// an insert.
#[derive(Debug, Clone)]
pub enum UndoOp {
    /// Undone by deleting the tuple.
    Insert(Tuple),
    /// Undone by re-inserting the tuple.
    Delete(Tuple),
    /// Undone by writing the before-image back in place.
    Update(Tuple),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Active,
    Committed,
    Aborted,
}

/// An identifier assigned monotonically at begin, a three-state
/// lifecycle (ACTIVE, COMMITTED, ABORTED), and an ordered undo
/// buffer.
#[derive(Debug)]
pub struct Transaction {
    pub id: TransactionId,
    pub status: TransactionStatus,
    undo: Vec<(String, UndoOp)>,
}

impl Transaction {
    fn new(id: TransactionId) -> Self {
        Self {
            id,
            status: TransactionStatus::Active,
            undo: Vec::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == TransactionStatus::Active
    }

    /// Append an undo entry for a mutation that just succeeded. Fails
    /// if the transaction is no longer ACTIVE.
    pub fn record_undo(&mut self, table: &str, op: UndoOp) -> DbResult<()> {
        if !self.is_active() {
            return Err(DbError::invalid_txn_state(format!(
                "transaction {} is not ACTIVE",
                self.id
            )));
        }
        self.undo.push((table.to_string(), op));
        Ok(())
    }
}

/// Owns the transaction table and assigns monotonically increasing
/// ids starting at 1. Locking and undo replay are driven by the
/// Database facade, which has the heap/index/catalog context this
/// type deliberately does not hold.
#[derive(Debug, Default)]
pub struct TransactionManager {
    transactions: HashMap<TransactionId, Transaction>,
    next_id: TransactionId,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self {
            transactions: HashMap::new(),
            next_id: 1,
        }
    }

    pub fn begin(&mut self) -> TransactionId {
        let id = self.next_id;
        self.next_id += 1;
        self.transactions.insert(id, Transaction::new(id));
        debug!("transaction {} started", id);
        id
    }

    /// Look up a transaction by id. Only fails for an id that was
    /// never assigned; a terminated transaction is still `Ok` here so
    /// callers can inspect its final status.
    pub fn get(&self, id: TransactionId) -> DbResult<&Transaction> {
        self.transactions
            .get(&id)
            .ok_or_else(|| DbError::not_found(format!("transaction {} not found", id)))
    }

    pub fn get_mut(&mut self, id: TransactionId) -> DbResult<&mut Transaction> {
        self.require_active(id)?;
        self.transactions
            .get_mut(&id)
            .ok_or_else(|| DbError::not_found(format!("transaction {} not found", id)))
    }

    /// Require the transaction to be ACTIVE. An unknown id is
    /// `NotFound`; a known but terminated (COMMITTED/ABORTED) id is
    /// `InvalidTxnState` — terminated transactions stay in the table
    /// rather than disappearing, so any operation on one (a second
    /// `commit`, an `insert` after `abort`, ...) reports the right
    /// error instead of looking like the transaction never existed.
    pub fn require_active(&self, id: TransactionId) -> DbResult<()> {
        if !self.get(id)?.is_active() {
            return Err(DbError::invalid_txn_state(format!(
                "transaction {} is not ACTIVE",
                id
            )));
        }
        Ok(())
    }

    /// Finalize a commit: mark COMMITTED and clear the undo buffer,
    /// since a committed mutation is never undone.
    pub fn finish_commit(&mut self, id: TransactionId) -> DbResult<()> {
        self.require_active(id)?;
        let txn = self.transactions.get_mut(&id).expect("checked by require_active");
        txn.status = TransactionStatus::Committed;
        txn.undo.clear();
        debug!("transaction {} committed", id);
        Ok(())
    }

    /// Finalize an abort: mark ABORTED and hand back its undo entries
    /// in replay order (most recent mutation first) so the caller can
    /// undo them before releasing locks.
    pub fn finish_abort(&mut self, id: TransactionId) -> DbResult<Vec<(String, UndoOp)>> {
        self.require_active(id)?;
        let txn = self.transactions.get_mut(&id).expect("checked by require_active");
        txn.status = TransactionStatus::Aborted;
        let undo = std::mem::take(&mut txn.undo);
        debug!("transaction {} aborted", id);
        Ok(undo.into_iter().rev().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn ids_are_monotonic_starting_at_one() {
        let mut tm = TransactionManager::new();
        assert_eq!(tm.begin(), 1);
        assert_eq!(tm.begin(), 2);
    }

    #[test]
    fn undo_replays_most_recent_first() {
        let mut tm = TransactionManager::new();
        let id = tm.begin();
        let txn = tm.get_mut(id).unwrap();
        txn.record_undo("t", UndoOp::Insert(Tuple::new(vec![Value::Int32(1)])))
            .unwrap();
        txn.record_undo("t", UndoOp::Insert(Tuple::new(vec![Value::Int32(2)])))
            .unwrap();

        let ops = tm.finish_abort(id).unwrap();
        match &ops[0].1 {
            UndoOp::Insert(t) => assert_eq!(t.get(0), &Value::Int32(2)),
            _ => panic!("expected Insert"),
        }
    }

    #[test]
    fn double_commit_is_invalid_state() {
        let mut tm = TransactionManager::new();
        let id = tm.begin();
        tm.finish_commit(id).unwrap();
        assert!(tm.require_active(id).is_err());
        match tm.finish_commit(id) {
            Err(DbError::InvalidTxnState(_)) => {}
            other => panic!("expected InvalidTxnState, got {:?}", other),
        }
    }

    #[test]
    fn abort_after_commit_is_invalid_state() {
        let mut tm = TransactionManager::new();
        let id = tm.begin();
        tm.finish_commit(id).unwrap();
        match tm.finish_abort(id) {
            Err(DbError::InvalidTxnState(_)) => {}
            other => panic!("expected InvalidTxnState, got {:?}", other),
        }
    }
}
