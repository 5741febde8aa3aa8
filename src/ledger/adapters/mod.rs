//! Ledger client implementations.

pub mod memory;
