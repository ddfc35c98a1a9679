mod database;
mod transaction;

pub use database::HashMapDatabase;
pub use transaction::HashMapTransaction;
