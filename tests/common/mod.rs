#![allow(dead_code)]

use std::{
    fs,
    path::PathBuf,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
};

use minirel::{
    utils, BufferPool, ColDef, ColType, DiskManager, LockManager, SystemManager,
    TransactionManager,
};

static DIR_SEQ: AtomicU32 = AtomicU32::new(0);

/// Logger bootstrap shared by every integration test.
pub fn setup() {
    utils::init_log();
}

fn scratch_dir(name: &str) -> PathBuf {
    let seq = DIR_SEQ.fetch_add(1, Ordering::SeqCst);
    std::env::temp_dir().join(format!(
        "minirel_test_{}_{}_{}",
        std::process::id(),
        name,
        seq
    ))
}

/// A database opened in a scratch directory, wired to a fresh disk
/// manager, buffer pool, lock manager and transaction manager. The
/// directory is removed when the value drops.
pub struct TestDb {
    pub sm: Arc<SystemManager>,
    pub tm: TransactionManager,
    dir: PathBuf,
}

impl TestDb {
    pub fn new(name: &str) -> Self {
        setup();
        let dir = scratch_dir(name);
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();

        let disk_manager = Arc::new(DiskManager::new());
        let buffer_pool = Arc::new(BufferPool::new(256, disk_manager));
        let sm = Arc::new(SystemManager::new(&dir, buffer_pool));
        let tm = TransactionManager::new(Arc::new(LockManager::new()));

        sm.create_db("db").unwrap();
        sm.open_db("db").unwrap();
        Self { sm, tm, dir }
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        self.tm.get_lock_manager()
    }
}

impl Drop for TestDb {
    fn drop(&mut self) {
        let _ = self.sm.close_db();
        let _ = fs::remove_dir_all(&self.dir);
    }
}

/// A standalone B+tree index file (no catalog around it), plus the lock
/// and transaction plumbing its entry points expect.
pub struct TestIndex {
    pub ih: minirel::BTreeFile,
    pub tm: TransactionManager,
    dir: PathBuf,
}

impl TestIndex {
    pub fn new(name: &str, col_type: ColType, col_len: usize) -> Self {
        setup();
        let dir = scratch_dir(name);
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();

        let disk_manager = Arc::new(DiskManager::new());
        let buffer_pool = Arc::new(BufferPool::new(256, Arc::clone(&disk_manager)));
        let path = dir.join("test.idx");
        minirel::BTreeFile::create(&path, col_type, col_len, &disk_manager).unwrap();
        let ih = minirel::BTreeFile::open(&path, buffer_pool).unwrap();

        let tm = TransactionManager::new(Arc::new(LockManager::new()));
        Self { ih, tm, dir }
    }
}

impl Drop for TestIndex {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.dir);
    }
}

/// A standalone record file with the lock and transaction plumbing its
/// entry points expect.
pub struct TestRecordFile {
    pub rf: minirel::RecordFile,
    pub tm: TransactionManager,
    dir: PathBuf,
}

impl TestRecordFile {
    pub fn new(name: &str, record_size: usize) -> Self {
        setup();
        let dir = scratch_dir(name);
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();

        let disk_manager = Arc::new(DiskManager::new());
        let buffer_pool = Arc::new(BufferPool::new(256, Arc::clone(&disk_manager)));
        let path = dir.join("records");
        minirel::RecordFile::create(&path, record_size, &disk_manager).unwrap();
        let rf = minirel::RecordFile::open(&path, buffer_pool).unwrap();

        let tm = TransactionManager::new(Arc::new(LockManager::new()));
        Self { rf, tm, dir }
    }
}

impl Drop for TestRecordFile {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.dir);
    }
}

/// Little-endian key image of an integer, the way an Int column stores
/// it in a record.
pub fn int_key(v: i32) -> [u8; 4] {
    v.to_le_bytes()
}

/// Fixed-width string key padded with zeros; `{:08}` formatting makes the
/// lexicographic order match the numeric one.
pub fn str_key(v: u32, len: usize) -> Vec<u8> {
    let mut buf = format!("{:08}", v).into_bytes();
    buf.resize(len, 0);
    buf
}

/// Column pair used by most table tests: an indexed-able int id plus an
/// int payload.
pub fn two_int_cols() -> Vec<ColDef> {
    vec![
        ColDef {
            name: "id".to_string(),
            col_type: ColType::Int,
            len: 4,
        },
        ColDef {
            name: "v".to_string(),
            col_type: ColType::Int,
            len: 4,
        },
    ]
}
