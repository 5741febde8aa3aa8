//! Task lifecycle management.
//!
//! Tasks move `pending → queued → waiting_for_activation → active →
//! completed`, with `failed` and `canceled` as alternate terminals. The store
//! keeps in-flight tasks, their append-only event log, the archive of
//! terminal tasks and per-day statistics. The module follows hexagonal
//! architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Caller-facing services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
