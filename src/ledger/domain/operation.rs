//! Operations the engine submits to the ledger.

use serde::Serialize;
use std::fmt;

use crate::task::domain::{Amount, Receiver, TxRef};

/// A signed operation submitted on behalf of the configured account.
///
/// Queue and drop operations act on the account's boost towards the
/// configured validator; the client supplies both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum LedgerOperation {
    /// Queue free balance for boosting.
    QueueBoost {
        /// Amount to queue.
        amount: Amount,
    },
    /// Activate the queued boost once its delay has elapsed.
    ActivateBoost,
    /// Queue part of the active boost for dropping.
    QueueDropBoost {
        /// Amount to queue for the drop.
        amount: Amount,
    },
    /// Execute the queued drop once its delay has elapsed.
    DropBoost,
    /// Redeem free balance to a receiver.
    Redeem {
        /// Payout destination.
        receiver: Receiver,
        /// Amount to redeem.
        amount: Amount,
    },
    /// Claim accrued staking rewards.
    ClaimReward {
        /// Reward destination.
        receiver: Receiver,
    },
}

impl LedgerOperation {
    /// Returns the operation's name as used in logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::QueueBoost { .. } => "queue_boost",
            Self::ActivateBoost => "activate_boost",
            Self::QueueDropBoost { .. } => "queue_drop_boost",
            Self::DropBoost => "drop_boost",
            Self::Redeem { .. } => "redeem",
            Self::ClaimReward { .. } => "claim_reward",
        }
    }
}

impl fmt::Display for LedgerOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Confirmation that a submitted operation was mined successfully.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Receipt {
    /// The confirmed transaction.
    pub tx_ref: TxRef,
    /// Block the transaction was included in.
    pub block_number: u64,
}
