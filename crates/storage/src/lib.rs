//! SQLite persistence for imports, their transactions, the EUR rate table and
//! the category vocabulary.

pub mod db;
pub mod store;

pub use db::{
    create_db, create_memory_db, get_import, get_transactions_for_import,
    load_category_vocabulary, seed_default_categories, DbPool, StorageError,
};
pub use store::SqliteStore;
