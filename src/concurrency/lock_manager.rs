use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Condvar, Mutex},
};

use log::debug;

use crate::{
    error::{Error, Result},
    record::Rid,
    transaction::{Transaction, TransactionState},
};

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum LockDataType {
    Table,
    Record,
}

/// What a lock protects: a whole table (the record file's fd) or a single
/// record in it. Equality is structural; the rid is ignored for tables.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct LockDataId {
    pub fd: i32,
    pub rid: Rid,
    pub data_type: LockDataType,
}

impl LockDataId {
    pub fn for_table(fd: i32) -> Self {
        Self {
            fd,
            rid: Rid::INVALID,
            data_type: LockDataType::Table,
        }
    }

    pub fn for_record(fd: i32, rid: Rid) -> Self {
        Self {
            fd,
            rid,
            data_type: LockDataType::Record,
        }
    }
}

impl fmt::Debug for LockDataId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.data_type {
            LockDataType::Table => write!(f, "lock_tab_{}", self.fd),
            LockDataType::Record => write!(f, "lock_rec_{}_{}", self.fd, self.rid),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LockMode {
    IntentionShared,
    IntentionExclusive,
    Shared,
    SharedIntentionExclusive,
    Exclusive,
}

impl LockMode {
    /// The standard multi-granularity compatibility matrix.
    pub fn compatible(a: LockMode, b: LockMode) -> bool {
        use LockMode::*;
        match (a, b) {
            (IntentionShared, Exclusive) | (Exclusive, IntentionShared) => false,
            (IntentionShared, _) | (_, IntentionShared) => true,
            (IntentionExclusive, IntentionExclusive) => true,
            (Shared, Shared) => true,
            _ => false,
        }
    }

    /// Whether holding `self` already grants everything `other` would.
    fn covers(self, other: LockMode) -> bool {
        use LockMode::*;
        match (self, other) {
            (a, b) if a == b => true,
            (Exclusive, _) => true,
            (SharedIntentionExclusive, IntentionShared)
            | (SharedIntentionExclusive, IntentionExclusive)
            | (SharedIntentionExclusive, Shared) => true,
            (Shared, IntentionShared) => true,
            (IntentionExclusive, IntentionShared) => true,
            _ => false,
        }
    }

    /// The mode a held lock is promoted to when `requested` arrives:
    /// the least mode granting both.
    fn upgraded(held: LockMode, requested: LockMode) -> LockMode {
        if held.covers(requested) {
            held
        } else if requested.covers(held) {
            requested
        } else {
            // S + IX in either order
            LockMode::SharedIntentionExclusive
        }
    }

    fn rank(self) -> u8 {
        use LockMode::*;
        match self {
            IntentionShared => 1,
            IntentionExclusive => 2,
            Shared => 3,
            SharedIntentionExclusive => 4,
            Exclusive => 5,
        }
    }
}

/// Summary of the granted group on one LockDataId.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum GroupLockMode {
    NonLock,
    IS,
    IX,
    S,
    SIX,
    X,
}

impl GroupLockMode {
    fn from_mode(mode: LockMode) -> Self {
        use LockMode::*;
        match mode {
            IntentionShared => GroupLockMode::IS,
            IntentionExclusive => GroupLockMode::IX,
            Shared => GroupLockMode::S,
            SharedIntentionExclusive => GroupLockMode::SIX,
            Exclusive => GroupLockMode::X,
        }
    }

    /// Whether a fresh request of `mode` may join a group in this state.
    fn admits(self, mode: LockMode) -> bool {
        use LockMode::*;
        match self {
            GroupLockMode::NonLock => true,
            GroupLockMode::IS => mode != Exclusive,
            GroupLockMode::IX => mode == IntentionShared || mode == IntentionExclusive,
            GroupLockMode::S => mode == IntentionShared || mode == Shared,
            GroupLockMode::SIX => mode == IntentionShared,
            GroupLockMode::X => false,
        }
    }
}

struct LockRequest {
    txn_id: u32,
    mode: LockMode,
}

/// Per-LockDataId queue. Every entry in `requests` is granted; waiters
/// spin on the condvar until the group admits them, then join.
struct LockQueue {
    group_mode: GroupLockMode,
    shared_count: usize,
    ix_count: usize,
    requests: Vec<LockRequest>,
    cv: Arc<Condvar>,
}

impl LockQueue {
    fn new() -> Self {
        Self {
            group_mode: GroupLockMode::NonLock,
            shared_count: 0,
            ix_count: 0,
            requests: Vec::new(),
            cv: Arc::new(Condvar::new()),
        }
    }

    /// Recompute group_mode and the S/IX counters from the granted set.
    fn refresh(&mut self) {
        self.shared_count = 0;
        self.ix_count = 0;
        let mut strongest: Option<LockMode> = None;
        for req in &self.requests {
            match req.mode {
                LockMode::Shared => self.shared_count += 1,
                LockMode::IntentionExclusive => self.ix_count += 1,
                _ => {}
            }
            strongest = Some(match strongest {
                Some(m) if m.rank() >= req.mode.rank() => m,
                _ => req.mode,
            });
        }
        self.group_mode = match strongest {
            Some(m) => GroupLockMode::from_mode(m),
            None => GroupLockMode::NonLock,
        };
    }
}

/// Multi-granularity lock manager: S/X on records, the five modes on
/// tables, strict two-phase locking. One global mutex guards the lock
/// table; waiters block on per-queue condition variables. There is no
/// deadlock detection — two transactions acquiring in crossing orders can
/// wait forever.
pub struct LockManager {
    lock_table: Mutex<HashMap<LockDataId, LockQueue>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            lock_table: Mutex::new(HashMap::new()),
        }
    }

    pub fn lock_shared_on_record(&self, txn: &Transaction, rid: Rid, tab_fd: i32) -> Result<()> {
        self.lock(txn, LockDataId::for_record(tab_fd, rid), LockMode::Shared)
    }

    pub fn lock_exclusive_on_record(
        &self,
        txn: &Transaction,
        rid: Rid,
        tab_fd: i32,
    ) -> Result<()> {
        self.lock(txn, LockDataId::for_record(tab_fd, rid), LockMode::Exclusive)
    }

    pub fn lock_shared_on_table(&self, txn: &Transaction, tab_fd: i32) -> Result<()> {
        self.lock(txn, LockDataId::for_table(tab_fd), LockMode::Shared)
    }

    pub fn lock_exclusive_on_table(&self, txn: &Transaction, tab_fd: i32) -> Result<()> {
        self.lock(txn, LockDataId::for_table(tab_fd), LockMode::Exclusive)
    }

    pub fn lock_is_on_table(&self, txn: &Transaction, tab_fd: i32) -> Result<()> {
        self.lock(txn, LockDataId::for_table(tab_fd), LockMode::IntentionShared)
    }

    pub fn lock_ix_on_table(&self, txn: &Transaction, tab_fd: i32) -> Result<()> {
        self.lock(
            txn,
            LockDataId::for_table(tab_fd),
            LockMode::IntentionExclusive,
        )
    }

    fn lock(&self, txn: &Transaction, id: LockDataId, mode: LockMode) -> Result<()> {
        self.check_growing(txn)?;
        let txn_id = txn.get_id();

        let mut table = self.lock_table.lock().unwrap();
        table.entry(id).or_insert_with(LockQueue::new);

        let held = table[&id]
            .requests
            .iter()
            .find(|r| r.txn_id == txn_id)
            .map(|r| r.mode);

        match held {
            Some(held) if held.covers(mode) => Ok(()),
            Some(held) => {
                // Upgrade path: the held request is mutated in place, but
                // only once the target is compatible with every *other*
                // granted request. For X that means being the sole holder.
                let target = LockMode::upgraded(held, mode);
                loop {
                    let queue = table.get_mut(&id).unwrap();
                    let admissible = queue
                        .requests
                        .iter()
                        .filter(|r| r.txn_id != txn_id)
                        .all(|r| LockMode::compatible(target, r.mode));
                    if admissible {
                        break;
                    }
                    let cv = Arc::clone(&queue.cv);
                    table = cv.wait(table).unwrap();
                }
                let queue = table.get_mut(&id).unwrap();
                for req in queue.requests.iter_mut() {
                    if req.txn_id == txn_id {
                        req.mode = target;
                    }
                }
                queue.refresh();
                queue.cv.notify_all();
                debug!("txn {} upgraded {:?} to {:?}", txn_id, id, target);
                Ok(())
            }
            None => {
                loop {
                    let queue = table.get_mut(&id).unwrap();
                    if queue.group_mode.admits(mode) {
                        break;
                    }
                    let cv = Arc::clone(&queue.cv);
                    table = cv.wait(table).unwrap();
                }
                let queue = table.get_mut(&id).unwrap();
                queue.requests.push(LockRequest { txn_id, mode });
                queue.refresh();
                txn.add_lock(id);
                debug!("txn {} granted {:?} in {:?}", txn_id, id, mode);
                Ok(())
            }
        }
    }

    /// Release one lock. The transaction enters its shrinking phase; any
    /// later acquisition will be rejected.
    pub fn unlock(&self, txn: &Transaction, id: LockDataId) -> Result<()> {
        match txn.get_state() {
            TransactionState::Growing | TransactionState::Shrinking => {}
            state => {
                return Err(Error::LockAbort {
                    txn_id: txn.get_id(),
                    state: state.as_str(),
                })
            }
        }
        txn.set_state(TransactionState::Shrinking);

        let mut table = self.lock_table.lock().unwrap();
        if let Some(queue) = table.get_mut(&id) {
            queue.requests.retain(|r| r.txn_id != txn.get_id());
            queue.refresh();
            queue.cv.notify_all();
        }
        txn.remove_lock(id);
        Ok(())
    }

    /// Snapshot of one queue: (group_mode, shared_count, ix_count). None
    /// when nothing was ever locked on the id.
    pub fn group_state(&self, id: LockDataId) -> Option<(GroupLockMode, usize, usize)> {
        let table = self.lock_table.lock().unwrap();
        table
            .get(&id)
            .map(|q| (q.group_mode, q.shared_count, q.ix_count))
    }

    fn check_growing(&self, txn: &Transaction) -> Result<()> {
        match txn.get_state() {
            TransactionState::Default | TransactionState::Growing => {
                txn.set_state(TransactionState::Growing);
                Ok(())
            }
            state => Err(Error::LockAbort {
                txn_id: txn.get_id(),
                state: state.as_str(),
            }),
        }
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::LockMode::*;
    use super::*;

    #[test]
    fn test_compatibility_matrix() {
        let modes = [
            IntentionShared,
            IntentionExclusive,
            Shared,
            SharedIntentionExclusive,
            Exclusive,
        ];
        let expected = [
            // IS     IX     S      SIX    X
            [true, true, true, true, false],   // IS
            [true, true, false, false, false], // IX
            [true, false, true, false, false], // S
            [true, false, false, false, false], // SIX
            [false, false, false, false, false], // X
        ];
        for (i, a) in modes.iter().enumerate() {
            for (j, b) in modes.iter().enumerate() {
                assert_eq!(
                    LockMode::compatible(*a, *b),
                    expected[i][j],
                    "{:?} vs {:?}",
                    a,
                    b
                );
                // the matrix is symmetric
                assert_eq!(LockMode::compatible(*a, *b), LockMode::compatible(*b, *a));
            }
        }
    }

    #[test]
    fn test_upgrade_lattice() {
        assert_eq!(LockMode::upgraded(Shared, Exclusive), Exclusive);
        assert_eq!(
            LockMode::upgraded(Shared, IntentionExclusive),
            SharedIntentionExclusive
        );
        assert_eq!(
            LockMode::upgraded(IntentionExclusive, Shared),
            SharedIntentionExclusive
        );
        assert_eq!(LockMode::upgraded(IntentionShared, Shared), Shared);
        assert_eq!(
            LockMode::upgraded(SharedIntentionExclusive, IntentionExclusive),
            SharedIntentionExclusive
        );
        assert_eq!(
            LockMode::upgraded(SharedIntentionExclusive, Exclusive),
            Exclusive
        );
    }

    #[test]
    fn test_group_mode_tracking() {
        let lm = LockManager::new();
        let t1 = Transaction::new(1);
        let t2 = Transaction::new(2);
        let id = LockDataId::for_table(0);

        lm.lock_is_on_table(&t1, 0).unwrap();
        assert_eq!(lm.group_state(id), Some((GroupLockMode::IS, 0, 0)));

        lm.lock_ix_on_table(&t2, 0).unwrap();
        assert_eq!(lm.group_state(id), Some((GroupLockMode::IX, 0, 1)));

        // t1's IS->S upgrade turns the group into S + IX, which only SIX
        // summarizes... so it must wait; here t2 releases first
        lm.unlock(&t2, id).unwrap();
        assert_eq!(lm.group_state(id), Some((GroupLockMode::IS, 0, 0)));

        lm.lock_shared_on_table(&t1, 0).unwrap();
        assert_eq!(lm.group_state(id), Some((GroupLockMode::S, 1, 0)));

        lm.unlock(&t1, id).unwrap();
        assert_eq!(lm.group_state(id), Some((GroupLockMode::NonLock, 0, 0)));
    }

    #[test]
    fn test_group_admission() {
        assert!(GroupLockMode::NonLock.admits(Exclusive));
        assert!(GroupLockMode::IS.admits(SharedIntentionExclusive));
        assert!(!GroupLockMode::IS.admits(Exclusive));
        assert!(GroupLockMode::IX.admits(IntentionExclusive));
        assert!(!GroupLockMode::IX.admits(Shared));
        assert!(GroupLockMode::S.admits(Shared));
        assert!(!GroupLockMode::S.admits(IntentionExclusive));
        assert!(GroupLockMode::SIX.admits(IntentionShared));
        assert!(!GroupLockMode::SIX.admits(Shared));
        assert!(!GroupLockMode::X.admits(IntentionShared));
    }
}
