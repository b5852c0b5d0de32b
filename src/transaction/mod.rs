mod manager;
mod transaction;

pub use manager::TransactionManager;
pub use transaction::{Context, Transaction, TransactionState, WriteRecord};
