//! Simulated ledger for tests and dry runs.

mod ledger;

pub use ledger::{InMemoryLedger, LedgerSettings};
