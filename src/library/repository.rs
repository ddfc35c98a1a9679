use std::time::SystemTime;

use crate::hashmap::{HashMapDatabase, HashMapTransaction};
use crate::transaction::{require_transaction, Transactional};

use super::entity::{Author, Book};
use super::error::LibraryError;

const AUTHORS: &str = "author";
const BOOKS: &str = "book";
const AUTHOR_BOOKS: &str = "author_book";

/// Author rows on a [`HashMapDatabase`].
pub trait AuthorRepository {
    fn create_author(
        &self,
        tx: Option<&mut HashMapTransaction>,
        name: &str,
    ) -> Result<Author, LibraryError>;

    fn get_author(&self, id: &str) -> Result<Author, LibraryError>;
}

/// Book rows on a [`HashMapDatabase`].
pub trait BookRepository {
    /// Insert a book and link it to its authors; fails with
    /// `AuthorNotFound` if any author does not exist.
    fn create_book(
        &self,
        tx: Option<&mut HashMapTransaction>,
        name: &str,
        author_ids: &[String],
    ) -> Result<Book, LibraryError>;

    fn get_book(&self, id: &str) -> Result<Book, LibraryError>;
}

impl AuthorRepository for HashMapDatabase {
    fn create_author(
        &self,
        tx: Option<&mut HashMapTransaction>,
        name: &str,
    ) -> Result<Author, LibraryError> {
        let author = Author {
            id: self.next_id(AUTHORS)?.to_string(),
            name: name.to_string(),
        };
        self.put_row(tx, AUTHORS, &author.id, serde_json::to_vec(&author)?)?;
        Ok(author)
    }

    fn get_author(&self, id: &str) -> Result<Author, LibraryError> {
        let row = self
            .get_row(None, AUTHORS, id)?
            .ok_or_else(|| LibraryError::AuthorNotFound(id.to_string()))?;
        Ok(serde_json::from_slice(&row)?)
    }
}

impl BookRepository for HashMapDatabase {
    fn create_book(
        &self,
        tx: Option<&mut HashMapTransaction>,
        name: &str,
        author_ids: &[String],
    ) -> Result<Book, LibraryError> {
        self.with_transaction(tx, |tx| {
            let now = SystemTime::now();
            let book = Book {
                id: self.next_id(BOOKS)?.to_string(),
                name: name.to_string(),
                author_ids: author_ids.to_vec(),
                created_at: now,
                updated_at: now,
            };
            self.put_row(Some(&mut *tx), BOOKS, &book.id, serde_json::to_vec(&book)?)?;
            link_authors(self, Some(tx), &book.id, author_ids)?;
            Ok(book)
        })
    }

    fn get_book(&self, id: &str) -> Result<Book, LibraryError> {
        let row = self
            .get_row(None, BOOKS, id)?
            .ok_or_else(|| LibraryError::BookNotFound(id.to_string()))?;
        Ok(serde_json::from_slice(&row)?)
    }
}

/// Write the author/book join rows. Only meaningful as part of the book
/// insert, so it refuses to run outside a transaction.
fn link_authors(
    db: &HashMapDatabase,
    tx: Option<&mut HashMapTransaction>,
    book_id: &str,
    author_ids: &[String],
) -> Result<(), LibraryError> {
    let tx = require_transaction(tx)?;
    for author_id in author_ids {
        if db.get_row(Some(&*tx), AUTHORS, author_id)?.is_none() {
            return Err(LibraryError::AuthorNotFound(author_id.clone()));
        }
        let link = format!("{}:{}", author_id, book_id);
        db.put_row(Some(&mut *tx), AUTHOR_BOOKS, &link, Vec::new())?;
    }
    Ok(())
}
