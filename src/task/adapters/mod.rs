//! Persistence adapters for the task store port.
//!
//! - [`memory::InMemoryTaskStore`]: lock-protected in-process storage for
//!   tests and dry runs
//! - [`sqlite::SqliteTaskStore`]: durable storage using Diesel on `SQLite`

pub mod memory;
pub mod sqlite;
