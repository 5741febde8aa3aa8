//! Domain types for ledger reads and submissions.

mod error;
mod operation;
mod queue;

pub use error::{LedgerError, LedgerResult};
pub use operation::{LedgerOperation, Receipt};
pub use queue::{BalanceSnapshot, DelayStatus, QueueEntry};
