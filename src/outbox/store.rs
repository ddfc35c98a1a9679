use std::time::Duration;

use crate::transaction::Transactional;

use super::{OutboxKind, OutboxMessage, StoreError};

/// Durable outbox queue.
///
/// Every operation takes the ambient transaction explicitly. Passing
/// `Some(tx)` makes the operation part of that transaction (and so atomic
/// with whatever business write shares it); `None` runs it in a
/// transaction of its own.
pub trait OutboxStore: Transactional {
    /// Insert a `Created` message. A key that already exists is a silent
    /// no-op, which is what makes producer retries safe.
    fn enqueue(
        &self,
        tx: Option<&mut Self::Transaction>,
        idempotency_key: &str,
        kind: OutboxKind,
        payload: &[u8],
    ) -> Result<(), StoreError>;

    /// Atomically select up to `limit` claimable messages, oldest
    /// `updated_at` first, flip them to `InProgress` with a fresh
    /// `updated_at` and return them.
    ///
    /// Rows locked by another open transaction are skipped, so concurrent
    /// callers always receive disjoint batches.
    fn claim_batch(
        &self,
        tx: Option<&mut Self::Transaction>,
        limit: usize,
        in_progress_ttl: Duration,
    ) -> Result<Vec<OutboxMessage>, StoreError>;

    /// Move `keys` to `Success`. Empty input is a no-op; repeating the call
    /// for keys that already succeeded is harmless.
    fn mark_success(
        &self,
        tx: Option<&mut Self::Transaction>,
        keys: &[String],
    ) -> Result<(), StoreError>;
}
