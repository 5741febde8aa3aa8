//! Services derived from live ledger reads.

mod oracle;

pub use oracle::ConditionOracle;
