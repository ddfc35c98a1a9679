//! A small catalogue of authors and books whose registrations publish
//! outbox messages alongside the row writes.

mod entity;
mod error;
mod repository;
mod service;

pub use entity::{Author, Book};
pub use error::LibraryError;
pub use repository::{AuthorRepository, BookRepository};
pub use service::LibraryService;
