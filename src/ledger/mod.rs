//! Ledger capability and the conditions derived from it.
//!
//! The ledger is the external system that holds balances and enforces the
//! block delays between queueing and activating a boost or a drop. The
//! module follows the same hexagonal split as [`crate::task`]:
//!
//! - Domain types in [`domain`]
//! - The client port in [`ports`]
//! - A simulated ledger in [`adapters`]
//! - The condition oracle in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
