use thiserror::Error;

use crate::outbox::StoreError;
use crate::transaction::TransactionError;

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("author not found: {0}")]
    AuthorNotFound(String),
    #[error("book not found: {0}")]
    BookNotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Transaction(#[from] TransactionError),
    #[error("cannot serialize entity: {0}")]
    Serialization(#[from] serde_json::Error),
}
