use std::io;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by the storage core. The executor decides whether an
/// error aborts the surrounding transaction; nothing is swallowed here.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid value count: expected {expected}, got {got}")]
    InvalidValueCount { expected: usize, got: usize },

    #[error("incompatible type: expected {expected}, got {got}")]
    IncompatibleType {
        expected: &'static str,
        got: &'static str,
    },

    #[error("record not found: page {page_no}, slot {slot_no}")]
    RecordNotFound { page_no: i32, slot_no: i32 },

    #[error("page does not exist: fd {fd}, page {page_no}")]
    PageNotExist { fd: i32, page_no: i32 },

    #[error("index entry not found")]
    IndexEntryNotFound,

    #[error("database already exists: {0}")]
    DatabaseExists(String),

    #[error("database not found: {0}")]
    DatabaseNotFound(String),

    #[error("table already exists: {0}")]
    TableExists(String),

    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("column not found: {0}")]
    ColumnNotFound(String),

    #[error("index already exists: {tab_name}.{col_name}")]
    IndexExists { tab_name: String, col_name: String },

    #[error("index not found: {tab_name}.{col_name}")]
    IndexNotFound { tab_name: String, col_name: String },

    #[error("unix error: {0}")]
    Unix(#[from] io::Error),

    #[error("lock request rejected: transaction {txn_id} is {state}")]
    LockAbort { txn_id: u32, state: &'static str },

    #[error("buffer pool exhausted: all frames pinned")]
    BufferPoolFull,

    #[error("corrupted meta file: {0}")]
    BadMeta(String),
}
