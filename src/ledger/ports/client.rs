//! Ledger client port.

use async_trait::async_trait;
use std::time::Duration;

use crate::ledger::domain::{LedgerOperation, LedgerResult, QueueEntry, Receipt};
use crate::task::domain::{Amount, TxRef};

/// Reads ledger state and submits signed operations for one account and
/// validator.
///
/// `submit` returning `None` means nothing happened on the ledger: execution
/// is disabled, signing failed or the node refused the transaction. Callers
/// treat it as "retry later".
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Total balance held by the account.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::ledger::domain::LedgerError`] when the read fails.
    async fn read_balance(&self) -> LedgerResult<Amount>;

    /// Amount actively boosting the validator.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::ledger::domain::LedgerError`] when the read fails.
    async fn read_boosted(&self) -> LedgerResult<Amount>;

    /// Amount queued for boosting.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::ledger::domain::LedgerError`] when the read fails.
    async fn read_queued(&self) -> LedgerResult<Amount>;

    /// The pending boost queue entry for the validator.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::ledger::domain::LedgerError`] when the read fails.
    async fn read_queue_details(&self) -> LedgerResult<QueueEntry>;

    /// The pending drop queue entry for the validator.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::ledger::domain::LedgerError`] when the read fails.
    async fn read_drop_queue_details(&self) -> LedgerResult<QueueEntry>;

    /// Blocks required between queueing and activating a boost.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::ledger::domain::LedgerError`] when the read fails.
    async fn read_activation_delay(&self) -> LedgerResult<u64>;

    /// Blocks required between queueing and executing a drop.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::ledger::domain::LedgerError`] when the read fails.
    async fn read_drop_delay(&self) -> LedgerResult<u64>;

    /// Rewards earned by the account and not yet claimed.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::ledger::domain::LedgerError`] when the read fails.
    async fn read_earned(&self) -> LedgerResult<Amount>;

    /// Current block height.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::ledger::domain::LedgerError`] when the read fails.
    async fn read_current_block(&self) -> LedgerResult<u64>;

    /// Signs and sends `operation`, returning its transaction reference.
    async fn submit(&self, operation: LedgerOperation) -> Option<TxRef>;

    /// Waits up to `timeout` for the transaction's receipt.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ledger::domain::LedgerError::Reverted`] when the
    /// transaction failed on chain and
    /// [`crate::ledger::domain::LedgerError::ConfirmationTimeout`] when no
    /// receipt arrived in time.
    async fn await_confirmation(&self, tx_ref: &TxRef, timeout: Duration) -> LedgerResult<Receipt>;
}
