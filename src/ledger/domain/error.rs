//! Errors raised by ledger reads and confirmation waits.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::task::domain::TxRef;

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Errors returned by a [`crate::ledger::ports::LedgerClient`].
///
/// Submission failures are not errors: `submit` returns `None` and the caller
/// retries on a later tick.
#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    /// A read against the ledger failed.
    #[error("ledger read `{operation}` failed: {message}")]
    Read {
        /// Name of the read that failed.
        operation: &'static str,
        /// Reason reported by the ledger.
        message: String,
    },

    /// The transaction was mined but reverted.
    #[error("transaction {tx_ref} reverted")]
    Reverted {
        /// The reverted transaction.
        tx_ref: TxRef,
    },

    /// The ledger has no record of the transaction.
    #[error("transaction {tx_ref} is unknown to the ledger")]
    UnknownTransaction {
        /// The missing transaction.
        tx_ref: TxRef,
    },

    /// No receipt arrived before the deadline.
    #[error("no receipt for {tx_ref} within {timeout:?}")]
    ConfirmationTimeout {
        /// The unconfirmed transaction.
        tx_ref: TxRef,
        /// How long the caller waited.
        timeout: Duration,
    },

    /// The connection to the ledger failed.
    #[error("ledger transport error: {0}")]
    Transport(Arc<dyn std::error::Error + Send + Sync>),
}

impl LedgerError {
    /// Wraps a transport error.
    pub fn transport(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Transport(Arc::new(err))
    }

    /// Builds a read failure for the named read.
    pub fn read(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Read {
            operation,
            message: message.into(),
        }
    }
}
