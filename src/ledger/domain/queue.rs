//! Balance and queue views read from the ledger.

use serde::Serialize;

use crate::task::domain::Amount;

/// A pending boost or drop queued on the ledger.
///
/// `block` is the block of the most recent queue call; the ledger restarts
/// the delay each time more is queued. A zero block or amount means nothing
/// is queued.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueEntry {
    /// Block of the last queue call.
    pub block: u64,
    /// Total amount waiting in the queue.
    pub amount: Amount,
}

impl QueueEntry {
    /// Returns `true` when something is waiting in the queue.
    #[must_use]
    pub const fn is_queued(&self) -> bool {
        self.block > 0 && !self.amount.is_zero()
    }
}

/// Account balances as seen by the ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BalanceSnapshot {
    /// Everything the account holds.
    pub total: Amount,
    /// Amount actively boosting a validator.
    pub boosted: Amount,
    /// Amount queued for boosting.
    pub queued: Amount,
    /// `total − boosted − queued`, never below zero.
    pub free: Amount,
}

impl BalanceSnapshot {
    /// Derives the free balance from the three ledger reads.
    #[must_use]
    pub const fn new(total: Amount, boosted: Amount, queued: Amount) -> Self {
        Self {
            total,
            boosted,
            queued,
            free: total.saturating_sub(boosted).saturating_sub(queued),
        }
    }
}

/// Progress of a queued boost or drop towards its activation delay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DelayStatus {
    /// Block of the last queue call, zero when nothing is queued.
    pub queued_block: u64,
    /// Amount waiting in the queue.
    pub amount: Amount,
    /// Blocks the ledger requires between queueing and activation.
    pub delay_blocks: u64,
    /// Blocks elapsed since the queue call.
    pub elapsed_blocks: u64,
    /// Blocks still to wait.
    pub remaining_blocks: u64,
    /// Whether the queued entry can be activated now.
    pub ready: bool,
}

impl DelayStatus {
    /// Evaluates `entry` against `delay_blocks` at `current_block`.
    #[must_use]
    pub const fn evaluate(entry: QueueEntry, delay_blocks: u64, current_block: u64) -> Self {
        if !entry.is_queued() {
            return Self {
                queued_block: entry.block,
                amount: entry.amount,
                delay_blocks,
                elapsed_blocks: 0,
                remaining_blocks: 0,
                ready: false,
            };
        }
        let elapsed_blocks = current_block.saturating_sub(entry.block);
        Self {
            queued_block: entry.block,
            amount: entry.amount,
            delay_blocks,
            elapsed_blocks,
            remaining_blocks: delay_blocks.saturating_sub(elapsed_blocks),
            ready: elapsed_blocks >= delay_blocks,
        }
    }
}
