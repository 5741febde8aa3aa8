//! Port contract for the ledger client.

mod client;

pub use client::LedgerClient;

#[cfg(test)]
pub use client::MockLedgerClient;
