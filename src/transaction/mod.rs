//! Scoped transaction unit.
//!
//! A business write and the outbox enqueue that announces it must commit or
//! roll back together. [`Transactional::with_transaction`] opens a
//! transaction, hands it to a closure and commits on `Ok` / rolls back on
//! `Err`. The transaction is passed explicitly: nested code receives
//! `Some(tx)` and reuses it instead of opening a second one (flat nesting,
//! no savepoints).
//!
//! ```ignore
//! db.with_transaction(None, |tx| {
//!     let book = db.create_book(Some(tx), "Dune", &authors)?;
//!     db.enqueue(Some(tx), &OutboxKind::Book.idempotency_key(&book.id), OutboxKind::Book, &bytes)?;
//!     Ok(book)
//! })?;
//! ```

mod error;
mod transactional;

pub use error::TransactionError;
pub use transactional::{require_transaction, Transactional};
