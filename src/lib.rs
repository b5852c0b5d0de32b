pub mod btree;
pub mod concurrency;
pub mod error;
pub mod record;
pub mod storage;
pub mod system;
pub mod transaction;
pub mod utils;

pub use error::{Error, Result};
pub use storage::{BufferPool, DiskManager, PageId, INVALID_PAGE_ID, PAGE_SIZE};
pub use record::{RecordFile, RecordScan, Rid};
pub use btree::{BTreeFile, Iid, IndexScan, IX_NO_PAGE};
pub use concurrency::{LockDataId, LockDataType, LockManager, LockMode};
pub use system::{ColDef, ColMeta, ColType, DbMeta, SystemManager, TabMeta, Value};
pub use transaction::{Context, Transaction, TransactionManager, TransactionState, WriteRecord};
