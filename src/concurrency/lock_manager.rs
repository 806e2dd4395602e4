use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use log::debug;
use parking_lot::{Condvar, Mutex};

use crate::common::{RecordId, TxnId};

use super::{Transaction, TransactionState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

struct LockRequest {
    txn: Arc<Transaction>,
    mode: LockMode,
    granted: bool,
}

/// Per-record FIFO of lock requests plus the condition variable its
/// waiters park on. At most one upgrade may be pending per record.
struct LockRequestQueue {
    queue: VecDeque<LockRequest>,
    cv: Arc<Condvar>,
    upgrading: Option<TxnId>,
}

impl Default for LockRequestQueue {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
            cv: Arc::new(Condvar::new()),
            upgrading: None,
        }
    }
}

/// Record-granularity lock manager implementing strict two-phase locking
/// with wound-wait deadlock avoidance.
///
/// One mutex guards the whole record -> queue map, exactly as wide as the
/// grant decisions need; waiters release it while parked on their queue's
/// condition variable and re-evaluate on every wakeup. Wound-wait: an
/// older requester (smaller txn id) marks every younger conflicting
/// holder ABORTED and never waits on it; a wait therefore only ever points
/// at an older transaction, so the wait-for relation follows the total txn
/// id order and cannot form a cycle. The wounded transaction notices on
/// its next locking call (or wakeup) and returns false; its lock release
/// happens on the transaction manager's abort path.
pub struct LockManager {
    lock_table: Mutex<HashMap<RecordId, LockRequestQueue>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            lock_table: Mutex::new(HashMap::new()),
        }
    }

    /// Acquires a shared lock on the record. Returns false (leaving the
    /// transaction ABORTED) if the transaction is aborted or already
    /// shrinking; blocks while a live older exclusive holder exists.
    pub fn lock_shared(&self, txn: &Arc<Transaction>, rid: RecordId) -> bool {
        if !Self::can_acquire(txn) {
            return false;
        }
        if txn.is_shared_locked(rid) || txn.is_exclusive_locked(rid) {
            return true;
        }

        let mut table = self.lock_table.lock();
        let cv = {
            let queue = table.entry(rid).or_default();
            queue.queue.push_back(LockRequest {
                txn: Arc::clone(txn),
                mode: LockMode::Shared,
                granted: false,
            });
            Arc::clone(&queue.cv)
        };

        loop {
            let queue = table.get_mut(&rid).expect("queue vanished under waiter");
            Self::wound_conflicting(queue, txn.id(), LockMode::Shared);

            if txn.state() == TransactionState::Aborted {
                Self::retire_request(queue, txn.id());
                cv.notify_all();
                return false;
            }

            let blocked = queue.queue.iter().any(|r| {
                r.granted
                    && r.mode == LockMode::Exclusive
                    && r.txn.id() != txn.id()
                    && r.txn.state() != TransactionState::Aborted
            });
            if !blocked {
                Self::grant(queue, txn.id());
                txn.add_shared_lock(rid);
                return true;
            }
            cv.wait(&mut table);
        }
    }

    /// Acquires an exclusive lock on the record. Wounds every younger
    /// granted holder of either mode; blocks while any live older granted
    /// request exists.
    pub fn lock_exclusive(&self, txn: &Arc<Transaction>, rid: RecordId) -> bool {
        if !Self::can_acquire(txn) {
            return false;
        }
        if txn.is_exclusive_locked(rid) {
            return true;
        }

        let mut table = self.lock_table.lock();
        let cv = {
            let queue = table.entry(rid).or_default();
            queue.queue.push_back(LockRequest {
                txn: Arc::clone(txn),
                mode: LockMode::Exclusive,
                granted: false,
            });
            Arc::clone(&queue.cv)
        };

        loop {
            let queue = table.get_mut(&rid).expect("queue vanished under waiter");
            Self::wound_conflicting(queue, txn.id(), LockMode::Exclusive);

            if txn.state() == TransactionState::Aborted {
                Self::retire_request(queue, txn.id());
                cv.notify_all();
                return false;
            }

            let blocked = queue.queue.iter().any(|r| {
                r.granted
                    && r.txn.id() != txn.id()
                    && r.txn.state() != TransactionState::Aborted
            });
            if !blocked {
                Self::grant(queue, txn.id());
                txn.add_exclusive_lock(rid);
                return true;
            }
            cv.wait(&mut table);
        }
    }

    /// Upgrades a held shared lock to exclusive. Fails (aborting the
    /// transaction) when another upgrade is already pending on the record;
    /// otherwise wounds younger holders and waits until this transaction
    /// is the only live granted entry.
    pub fn lock_upgrade(&self, txn: &Arc<Transaction>, rid: RecordId) -> bool {
        if !Self::can_acquire(txn) {
            return false;
        }
        if txn.is_exclusive_locked(rid) {
            return true;
        }

        let mut table = self.lock_table.lock();
        {
            let Some(queue) = table.get_mut(&rid) else {
                txn.set_state(TransactionState::Aborted);
                return false;
            };
            if queue.queue.iter().all(|r| r.txn.id() != txn.id()) {
                txn.set_state(TransactionState::Aborted);
                return false;
            }
            if queue.upgrading.is_some() {
                // Concurrent upgrades on one record would deadlock on each
                // other; the second comer loses.
                debug!("upgrade conflict on {rid}: txn {} aborted", txn.id());
                txn.set_state(TransactionState::Aborted);
                return false;
            }
            queue.upgrading = Some(txn.id());
        }
        let cv = Arc::clone(&table.get(&rid).unwrap().cv);

        loop {
            let queue = table.get_mut(&rid).expect("queue vanished under waiter");
            Self::wound_conflicting(queue, txn.id(), LockMode::Exclusive);

            if txn.state() == TransactionState::Aborted {
                queue.upgrading = None;
                Self::retire_request(queue, txn.id());
                cv.notify_all();
                return false;
            }

            let blocked = queue.queue.iter().any(|r| {
                r.granted
                    && r.txn.id() != txn.id()
                    && r.txn.state() != TransactionState::Aborted
            });
            if !blocked {
                if let Some(req) = queue.queue.iter_mut().find(|r| r.txn.id() == txn.id()) {
                    req.mode = LockMode::Exclusive;
                    req.granted = true;
                }
                queue.upgrading = None;
                txn.promote_lock(rid);
                return true;
            }
            cv.wait(&mut table);
        }
    }

    /// Releases the transaction's lock on the record. The first unlock
    /// flips a GROWING transaction to SHRINKING, committing it to strict
    /// 2PL's shrink phase.
    pub fn unlock(&self, txn: &Arc<Transaction>, rid: RecordId) -> bool {
        txn.remove_lock(rid);
        if txn.state() == TransactionState::Growing {
            txn.set_state(TransactionState::Shrinking);
        }

        let mut table = self.lock_table.lock();
        let Some(queue) = table.get_mut(&rid) else {
            return false;
        };
        let removed = Self::retire_request(queue, txn.id());
        let cv = Arc::clone(&queue.cv);
        if queue.queue.is_empty() {
            table.remove(&rid);
        }
        drop(table);
        cv.notify_all();
        removed
    }

    /// Aborted and shrinking transactions cannot acquire; trying marks
    /// them aborted.
    fn can_acquire(txn: &Arc<Transaction>) -> bool {
        match txn.state() {
            TransactionState::Aborted | TransactionState::Shrinking => {
                txn.set_state(TransactionState::Aborted);
                false
            }
            _ => true,
        }
    }

    /// Wound-wait arbiter: the requester marks every younger granted
    /// holder it conflicts with ABORTED. Shared requests conflict with
    /// exclusive holders only; exclusive requests conflict with every
    /// granted entry.
    fn wound_conflicting(queue: &mut LockRequestQueue, requester: TxnId, mode: LockMode) {
        for req in queue.queue.iter() {
            if !req.granted || req.txn.id() == requester || req.txn.id() < requester {
                continue;
            }
            let conflicts = match mode {
                LockMode::Shared => req.mode == LockMode::Exclusive,
                LockMode::Exclusive => true,
            };
            if conflicts && req.txn.state() != TransactionState::Aborted {
                debug!("txn {} wounds younger txn {}", requester, req.txn.id());
                req.txn.set_state(TransactionState::Aborted);
            }
        }
    }

    fn grant(queue: &mut LockRequestQueue, txn_id: TxnId) {
        if let Some(req) = queue.queue.iter_mut().find(|r| r.txn.id() == txn_id) {
            req.granted = true;
        }
    }

    fn retire_request(queue: &mut LockRequestQueue, txn_id: TxnId) -> bool {
        let before = queue.queue.len();
        queue.queue.retain(|r| r.txn.id() != txn_id);
        queue.queue.len() != before
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}
