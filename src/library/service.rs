use std::sync::Arc;

use tracing::info;

use crate::hashmap::{HashMapDatabase, HashMapTransaction};
use crate::outbox::{OutboxKind, OutboxStore};
use crate::transaction::Transactional;

use super::entity::{Author, Book};
use super::error::LibraryError;
use super::repository::{AuthorRepository, BookRepository};

/// Registration use cases. Each one writes its entity and the matching
/// outbox message in a single transaction, so either both land or neither.
#[derive(Clone)]
pub struct LibraryService {
    db: Arc<HashMapDatabase>,
}

impl LibraryService {
    pub fn new(db: Arc<HashMapDatabase>) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Arc<HashMapDatabase> {
        &self.db
    }

    pub fn register_author(&self, name: &str) -> Result<Author, LibraryError> {
        self.register_author_in(None, name)
    }

    /// Same as [`register_author`](Self::register_author) but joins the
    /// caller's transaction when one is given.
    pub fn register_author_in(
        &self,
        tx: Option<&mut HashMapTransaction>,
        name: &str,
    ) -> Result<Author, LibraryError> {
        let author = self.db.with_transaction(tx, |tx| {
            let author = self.db.create_author(Some(&mut *tx), name)?;
            self.publish(tx, OutboxKind::Author, &author.id, &author)?;
            Ok::<_, LibraryError>(author)
        })?;
        info!(author_id = %author.id, "author registered");
        Ok(author)
    }

    pub fn register_book(&self, name: &str, author_ids: &[String]) -> Result<Book, LibraryError> {
        self.register_book_in(None, name, author_ids)
    }

    pub fn register_book_in(
        &self,
        tx: Option<&mut HashMapTransaction>,
        name: &str,
        author_ids: &[String],
    ) -> Result<Book, LibraryError> {
        let book = self.db.with_transaction(tx, |tx| {
            let book = self.db.create_book(Some(&mut *tx), name, author_ids)?;
            self.publish(tx, OutboxKind::Book, &book.id, &book)?;
            Ok::<_, LibraryError>(book)
        })?;
        info!(book_id = %book.id, authors = book.author_ids.len(), "book registered");
        Ok(book)
    }

    pub fn get_author(&self, id: &str) -> Result<Author, LibraryError> {
        self.db.get_author(id)
    }

    pub fn get_book(&self, id: &str) -> Result<Book, LibraryError> {
        self.db.get_book(id)
    }

    fn publish<T: serde::Serialize>(
        &self,
        tx: &mut HashMapTransaction,
        kind: OutboxKind,
        id: &str,
        entity: &T,
    ) -> Result<(), LibraryError> {
        let payload = serde_json::to_vec(entity)?;
        self.db
            .enqueue(Some(tx), &kind.idempotency_key(id), kind, &payload)?;
        Ok(())
    }
}
