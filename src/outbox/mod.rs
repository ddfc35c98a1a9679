//! Outbox data model and store contract.
//!
//! A producer enqueues an [`OutboxMessage`] in the same transaction as the
//! business write that caused it. Workers later claim batches, deliver them
//! and mark the delivered subset as done:
//!
//! ```ignore
//! store.with_transaction(None, |tx| {
//!     let batch = store.claim_batch(Some(tx), 10, Duration::from_secs(30))?;
//!     let delivered: Vec<String> = batch
//!         .iter()
//!         .filter(|m| deliver(m).is_ok())
//!         .map(|m| m.idempotency_key.clone())
//!         .collect();
//!     store.mark_success(Some(tx), &delivered)
//! })?;
//! ```

mod error;
mod message;
mod record;
mod store;

pub use error::StoreError;
pub use message::{OutboxKind, OutboxMessage};
pub use record::{OutboxRecord, OutboxStatus};
pub use store::OutboxStore;
