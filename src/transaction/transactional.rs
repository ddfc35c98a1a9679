use tracing::warn;

use super::TransactionError;

/// A store that can group several writes into one atomic unit.
///
/// Implementations must roll back a transaction that is dropped without
/// being committed, so a panic inside a scoped closure never leaves
/// half-applied state or dangling row locks behind.
pub trait Transactional: Send + Sync {
    /// Handle to an open transaction.
    type Transaction: Send;

    /// Open a new transaction.
    fn begin(&self) -> Result<Self::Transaction, TransactionError>;

    /// Atomically apply every write made through `tx`.
    fn commit(&self, tx: Self::Transaction) -> Result<(), TransactionError>;

    /// Discard every write made through `tx` and release its locks.
    fn rollback(&self, tx: Self::Transaction) -> Result<(), TransactionError>;

    /// Run `f` inside a transaction.
    ///
    /// If `current` already holds a transaction, `f` runs on it and the
    /// outer scope stays responsible for committing. Otherwise a new
    /// transaction is opened, committed when `f` returns `Ok`, and rolled
    /// back when it returns `Err` (the closure's error is returned).
    fn with_transaction<T, E, F>(
        &self,
        current: Option<&mut Self::Transaction>,
        f: F,
    ) -> Result<T, E>
    where
        F: FnOnce(&mut Self::Transaction) -> Result<T, E>,
        E: From<TransactionError>,
    {
        if let Some(tx) = current {
            return f(tx);
        }

        let mut tx = self.begin()?;
        match f(&mut tx) {
            Ok(value) => {
                self.commit(tx)?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.rollback(tx) {
                    warn!(error = %rollback_err, "cannot roll back transaction");
                }
                Err(err)
            }
        }
    }
}

/// Unwrap an ambient transaction, failing with [`TransactionError::NotFound`]
/// when the caller did not supply one.
pub fn require_transaction<T>(tx: Option<&mut T>) -> Result<&mut T, TransactionError> {
    tx.ok_or(TransactionError::NotFound)
}
