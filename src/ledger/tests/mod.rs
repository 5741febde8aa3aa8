//! Unit tests for the ledger module.
