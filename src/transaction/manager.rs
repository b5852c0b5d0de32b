use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc, Mutex,
    },
};

use log::debug;
use once_cell::sync::Lazy;

use crate::{
    concurrency::LockManager,
    error::Result,
    system::SystemManager,
    transaction::{Context, Transaction, TransactionState, WriteRecord},
};

// Process-wide transaction registry. Ids increase monotonically from 1.
static TXN_MAP: Lazy<Mutex<HashMap<u32, Arc<Transaction>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));
static NEXT_TXN_ID: AtomicU32 = AtomicU32::new(1);

/// Begin/commit/abort. Commit is nothing but a lock release (no-force, no
/// WAL); abort replays the transaction's write log backwards through the
/// system manager before releasing.
pub struct TransactionManager {
    lock_manager: Arc<LockManager>,
}

impl TransactionManager {
    pub fn new(lock_manager: Arc<LockManager>) -> Self {
        Self { lock_manager }
    }

    pub fn get_lock_manager(&self) -> &Arc<LockManager> {
        &self.lock_manager
    }

    /// Register a transaction, creating one when the caller has none yet.
    pub fn begin(&self, txn: Option<Arc<Transaction>>) -> Arc<Transaction> {
        let txn = txn.unwrap_or_else(|| {
            let id = NEXT_TXN_ID.fetch_add(1, Ordering::SeqCst);
            Arc::new(Transaction::new(id))
        });
        txn.set_state(TransactionState::Default);
        TXN_MAP.lock().unwrap().insert(txn.get_id(), Arc::clone(&txn));
        debug!("{} began", txn);
        txn
    }

    pub fn get_transaction(txn_id: u32) -> Option<Arc<Transaction>> {
        TXN_MAP.lock().unwrap().get(&txn_id).cloned()
    }

    pub fn commit(&self, txn: &Transaction) -> Result<()> {
        // durability is delegated to the buffer pool; the write log is
        // only needed for rollback
        txn.clear_write_set();
        for id in txn.take_lock_set() {
            self.lock_manager.unlock(txn, id)?;
        }
        txn.set_state(TransactionState::Committed);
        debug!("{} committed", txn);
        Ok(())
    }

    pub fn abort(&self, txn: &Transaction, sm: &SystemManager) -> Result<()> {
        let ctx = Context::new(&self.lock_manager, txn);
        while let Some(record) = txn.pop_write_record() {
            match record {
                WriteRecord::Insert { tab_name, rid } => {
                    sm.rollback_insert(&tab_name, rid, &ctx)?;
                }
                WriteRecord::Delete {
                    tab_name, record, ..
                } => {
                    sm.rollback_delete(&tab_name, &record, &ctx)?;
                }
                WriteRecord::Update {
                    tab_name,
                    rid,
                    old_record,
                } => {
                    sm.rollback_update(&tab_name, rid, &old_record, &ctx)?;
                }
            }
        }
        for id in txn.take_lock_set() {
            self.lock_manager.unlock(txn, id)?;
        }
        txn.set_state(TransactionState::Aborted);
        debug!("{} aborted", txn);
        Ok(())
    }
}
