//! `SQLite` adapters for task lifecycle persistence.

mod models;
mod schema;
mod store;

pub use store::{SqliteTaskStore, TaskSqlitePool};
