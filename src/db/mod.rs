//! Database module: models and schema for persistent storage.
//!
//! Layout:
//! - `models.rs`: Rust structs mirroring DB rows
//! - `schema.rs`: SQL DDL for initializing the database (SQLite-first)
//! - `sqlite.rs`: the `UserStore` operations over a `sqlx` pool

pub mod models;
pub mod schema;
pub mod sqlite;

pub use models::{DbConversation, DbResult, DbUser};
pub use schema::SQLITE_INIT;
pub use sqlite::{SqlitePool, UserStore};
