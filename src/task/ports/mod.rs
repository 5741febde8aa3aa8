//! Port contracts for task lifecycle management.
//!
//! Ports define infrastructure-agnostic interfaces used by pipelines and the
//! engine.

pub mod store;

pub use store::{TaskFilter, TaskStore, TaskStoreError, TaskStoreResult};
