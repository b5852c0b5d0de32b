use std::{
    collections::HashSet,
    fmt,
    sync::Mutex,
};

use crate::{concurrency::{LockDataId, LockManager}, record::Rid};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TransactionState {
    Default,
    Growing,
    Shrinking,
    Committed,
    Aborted,
}

impl TransactionState {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionState::Default => "default",
            TransactionState::Growing => "growing",
            TransactionState::Shrinking => "shrinking",
            TransactionState::Committed => "committed",
            TransactionState::Aborted => "aborted",
        }
    }
}

/// One entry of a transaction's in-memory write log. Replayed newest to
/// oldest on abort; a delete or update carries the pre-image bytes it has
/// to put back.
#[derive(Clone, Debug)]
pub enum WriteRecord {
    Insert {
        tab_name: String,
        rid: Rid,
    },
    Delete {
        tab_name: String,
        rid: Rid,
        record: Vec<u8>,
    },
    Update {
        tab_name: String,
        rid: Rid,
        old_record: Vec<u8>,
    },
}

/// A client transaction: its 2PL phase, the locks it holds and the writes
/// it may have to undo. Shared across the lock manager's queues by id, so
/// the mutable pieces sit behind mutexes.
pub struct Transaction {
    id: u32,
    state: Mutex<TransactionState>,
    lock_set: Mutex<HashSet<LockDataId>>,
    write_set: Mutex<Vec<WriteRecord>>,
}

impl Transaction {
    pub(crate) fn new(id: u32) -> Self {
        Self {
            id,
            state: Mutex::new(TransactionState::Default),
            lock_set: Mutex::new(HashSet::new()),
            write_set: Mutex::new(Vec::new()),
        }
    }

    pub fn get_id(&self) -> u32 {
        self.id
    }

    pub fn get_state(&self) -> TransactionState {
        *self.state.lock().unwrap()
    }

    pub(crate) fn set_state(&self, state: TransactionState) {
        *self.state.lock().unwrap() = state;
    }

    pub fn append_write_record(&self, record: WriteRecord) {
        self.write_set.lock().unwrap().push(record);
    }

    pub(crate) fn pop_write_record(&self) -> Option<WriteRecord> {
        self.write_set.lock().unwrap().pop()
    }

    pub(crate) fn clear_write_set(&self) {
        self.write_set.lock().unwrap().clear();
    }

    pub fn write_count(&self) -> usize {
        self.write_set.lock().unwrap().len()
    }

    pub(crate) fn add_lock(&self, id: LockDataId) {
        self.lock_set.lock().unwrap().insert(id);
    }

    pub(crate) fn remove_lock(&self, id: LockDataId) {
        self.lock_set.lock().unwrap().remove(&id);
    }

    pub fn hold_count(&self) -> usize {
        self.lock_set.lock().unwrap().len()
    }

    /// Drain the lock set; commit and abort unlock each returned entry.
    pub(crate) fn take_lock_set(&self) -> HashSet<LockDataId> {
        std::mem::take(&mut *self.lock_set.lock().unwrap())
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "txn_{}", self.id)
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

/// What DML entry points need from their caller: the lock manager and the
/// transaction doing the work.
pub struct Context<'a> {
    pub lock_mgr: &'a LockManager,
    pub txn: &'a Transaction,
}

impl<'a> Context<'a> {
    pub fn new(lock_mgr: &'a LockManager, txn: &'a Transaction) -> Self {
        Self { lock_mgr, txn }
    }
}
