//! SQLite storage for Cataklism.
//!
//! Persists snapshots and the alert log in a single database file.

mod backend;
mod schema;

pub use backend::SqliteStore;
