use thiserror::Error;

use crate::transaction::TransactionError;

/// Failure of an outbox store operation. The enclosing transaction is
/// rolled back; workers treat these as transient and retry next cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error(transparent)]
    Transaction(#[from] TransactionError),
    #[error("outbox lock poisoned during {0}")]
    LockPoisoned(&'static str),
    /// Waiting for `holder` would close a cycle of transactions waiting on
    /// each other. `tx` must roll back to release its locks.
    #[error("deadlock: transaction {tx} waits on {holder}, which waits on it")]
    Deadlock { tx: u64, holder: u64 },
    #[error("outbox storage error: {0}")]
    Storage(String),
}
