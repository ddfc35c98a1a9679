use thiserror::Error;

/// Errors raised by the scoped transaction unit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionError {
    /// An operation that must run inside a scoped transaction was called
    /// without one. This is a programming error, not a transient failure.
    #[error("transaction not found")]
    NotFound,
    /// The transaction was opened on a different store.
    #[error("transaction {0} belongs to another store")]
    Foreign(u64),
    /// The backing store's lock was poisoned while the transaction used it.
    #[error("transaction lock poisoned during {0}")]
    LockPoisoned(&'static str),
}
