use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::common::{RecordId, TxnId};

use super::LockManager;

/// Lifecycle of a transaction under strict two-phase locking. The
/// GROWING -> SHRINKING edge is crossed exactly once, on the first unlock;
/// a transaction in SHRINKING can never acquire another lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Growing,
    Shrinking,
    Committed,
    Aborted,
}

/// A transaction: its id, 2PL phase, and the record locks it holds. The
/// state cell is shared mutable because the wound-wait arbiter aborts a
/// younger transaction from another thread's locking call.
pub struct Transaction {
    id: TxnId,
    state: Mutex<TransactionState>,
    shared_lock_set: Mutex<HashSet<RecordId>>,
    exclusive_lock_set: Mutex<HashSet<RecordId>>,
}

impl Transaction {
    pub fn new(id: TxnId) -> Self {
        Self {
            id,
            state: Mutex::new(TransactionState::Growing),
            shared_lock_set: Mutex::new(HashSet::new()),
            exclusive_lock_set: Mutex::new(HashSet::new()),
        }
    }

    pub fn id(&self) -> TxnId {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        *self.state.lock()
    }

    pub fn set_state(&self, state: TransactionState) {
        *self.state.lock() = state;
    }

    pub fn is_shared_locked(&self, rid: RecordId) -> bool {
        self.shared_lock_set.lock().contains(&rid)
    }

    pub fn is_exclusive_locked(&self, rid: RecordId) -> bool {
        self.exclusive_lock_set.lock().contains(&rid)
    }

    pub(crate) fn add_shared_lock(&self, rid: RecordId) {
        self.shared_lock_set.lock().insert(rid);
    }

    pub(crate) fn add_exclusive_lock(&self, rid: RecordId) {
        self.exclusive_lock_set.lock().insert(rid);
    }

    pub(crate) fn remove_lock(&self, rid: RecordId) {
        self.shared_lock_set.lock().remove(&rid);
        self.exclusive_lock_set.lock().remove(&rid);
    }

    pub(crate) fn promote_lock(&self, rid: RecordId) {
        self.shared_lock_set.lock().remove(&rid);
        self.exclusive_lock_set.lock().insert(rid);
    }

    /// Every record this transaction currently holds a lock on.
    pub fn held_locks(&self) -> Vec<RecordId> {
        let mut rids: Vec<RecordId> = self.shared_lock_set.lock().iter().copied().collect();
        rids.extend(self.exclusive_lock_set.lock().iter().copied());
        rids
    }
}

/// Hands out monotonically increasing transaction ids and drives the
/// commit/abort endpoints, releasing every held lock through the lock
/// manager. There is no WAL, so abort releases locks without undoing data.
pub struct TransactionManager {
    next_txn_id: AtomicU64,
    lock_manager: Arc<LockManager>,
}

impl TransactionManager {
    pub fn new(lock_manager: Arc<LockManager>) -> Self {
        Self {
            next_txn_id: AtomicU64::new(0),
            lock_manager,
        }
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.lock_manager
    }

    pub fn begin(&self) -> Arc<Transaction> {
        let id = self.next_txn_id.fetch_add(1, Ordering::Relaxed);
        Arc::new(Transaction::new(id))
    }

    pub fn commit(&self, txn: &Arc<Transaction>) {
        self.release_all(txn);
        txn.set_state(TransactionState::Committed);
    }

    pub fn abort(&self, txn: &Arc<Transaction>) {
        self.release_all(txn);
        txn.set_state(TransactionState::Aborted);
    }

    fn release_all(&self, txn: &Arc<Transaction>) {
        for rid in txn.held_locks() {
            self.lock_manager.unlock(txn, rid);
        }
    }
}
