mod lock_manager;

pub use lock_manager::{GroupLockMode, LockDataId, LockDataType, LockManager, LockMode};
