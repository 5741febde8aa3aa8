//! In-memory simulation of the staking ledger.
//!
//! Balances, the boost and drop queues and the block height live behind one
//! mutex. Operations take effect at submission and are mined into the
//! current block; tests move the chain forward with
//! [`InMemoryLedger::advance_blocks`].

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::ledger::{
    domain::{LedgerError, LedgerOperation, LedgerResult, QueueEntry, Receipt},
    ports::LedgerClient,
};
use crate::task::domain::{Amount, Receiver, TxRef};

/// Initial chain parameters for an [`InMemoryLedger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerSettings {
    /// Block height at start.
    pub start_block: u64,
    /// Blocks between queueing and activating a boost.
    pub activation_delay: u64,
    /// Blocks between queueing and executing a drop.
    pub drop_delay: u64,
    /// Balance held by the account at start.
    pub balance: Amount,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            start_block: 1,
            activation_delay: 8_191,
            drop_delay: 8_191,
            balance: Amount::ZERO,
        }
    }
}

/// Outcome scripted for an upcoming submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScriptedFailure {
    Refuse,
    Revert,
}

#[derive(Debug)]
struct LedgerState {
    block: u64,
    activation_delay: u64,
    drop_delay: u64,
    balance: Amount,
    boosted: Amount,
    boost_queue: QueueEntry,
    drop_queue: QueueEntry,
    execution_enabled: bool,
    reads_failing: bool,
    stall_confirmations: bool,
    scripted: VecDeque<ScriptedFailure>,
    receipts: HashMap<TxRef, Option<u64>>,
    submitted: Vec<LedgerOperation>,
    redeemed: Vec<(Receiver, Amount)>,
    earned: Amount,
    reward_payouts: Vec<(Receiver, Amount)>,
    nonce: u64,
}

/// Thread-safe simulated ledger implementing [`LedgerClient`].
#[derive(Debug, Clone)]
pub struct InMemoryLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new(LedgerSettings::default())
    }
}

impl InMemoryLedger {
    /// Creates a ledger with execution enabled.
    #[must_use]
    pub fn new(settings: LedgerSettings) -> Self {
        Self {
            state: Arc::new(Mutex::new(LedgerState {
                block: settings.start_block,
                activation_delay: settings.activation_delay,
                drop_delay: settings.drop_delay,
                balance: settings.balance,
                boosted: Amount::ZERO,
                boost_queue: QueueEntry::default(),
                drop_queue: QueueEntry::default(),
                execution_enabled: true,
                reads_failing: false,
                stall_confirmations: false,
                scripted: VecDeque::new(),
                receipts: HashMap::new(),
                submitted: Vec::new(),
                redeemed: Vec::new(),
                earned: Amount::ZERO,
                reward_payouts: Vec::new(),
                nonce: 0,
            })),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut LedgerState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    /// Mines `blocks` empty blocks.
    pub fn advance_blocks(&self, blocks: u64) {
        self.with_state(|state| state.block = state.block.saturating_add(blocks));
    }

    /// Adds to the account's balance.
    pub fn deposit(&self, amount: Amount) {
        self.with_state(|state| state.balance = state.balance.saturating_add(amount));
    }

    /// Places `amount` directly into the active boost.
    ///
    /// The amount is added to the balance as well, so free balance is
    /// unchanged.
    pub fn seed_boost(&self, amount: Amount) {
        self.with_state(|state| {
            state.balance = state.balance.saturating_add(amount);
            state.boosted = state.boosted.saturating_add(amount);
        });
    }

    /// Adds to the rewards earned and not yet claimed.
    pub fn accrue_rewards(&self, amount: Amount) {
        self.with_state(|state| state.earned = state.earned.saturating_add(amount));
    }

    /// Enables or disables transaction submission.
    pub fn set_execution_enabled(&self, enabled: bool) {
        self.with_state(|state| state.execution_enabled = enabled);
    }

    /// Makes every read fail until switched off.
    pub fn set_reads_failing(&self, failing: bool) {
        self.with_state(|state| state.reads_failing = failing);
    }

    /// Makes confirmation waits run into their timeout.
    pub fn set_stall_confirmations(&self, stall: bool) {
        self.with_state(|state| state.stall_confirmations = stall);
    }

    /// Refuses the next `count` submissions.
    pub fn refuse_next(&self, count: usize) {
        self.script(ScriptedFailure::Refuse, count);
    }

    /// Accepts but reverts the next `count` submissions.
    pub fn revert_next(&self, count: usize) {
        self.script(ScriptedFailure::Revert, count);
    }

    fn script(&self, failure: ScriptedFailure, count: usize) {
        self.with_state(|state| {
            state
                .scripted
                .extend(std::iter::repeat_n(failure, count));
        });
    }

    /// Current block height.
    #[must_use]
    pub fn block(&self) -> u64 {
        self.with_state(|state| state.block)
    }

    /// Total balance held by the account.
    #[must_use]
    pub fn balance(&self) -> Amount {
        self.with_state(|state| state.balance)
    }

    /// Amount actively boosting.
    #[must_use]
    pub fn boosted(&self) -> Amount {
        self.with_state(|state| state.boosted)
    }

    /// Operations that took effect, in submission order.
    #[must_use]
    pub fn submitted(&self) -> Vec<LedgerOperation> {
        self.with_state(|state| state.submitted.clone())
    }

    /// Redemptions paid out, in submission order.
    #[must_use]
    pub fn redemptions(&self) -> Vec<(Receiver, Amount)> {
        self.with_state(|state| state.redeemed.clone())
    }

    /// Number of successful reward claims.
    #[must_use]
    pub fn rewards_claimed(&self) -> usize {
        self.with_state(|state| state.reward_payouts.len())
    }

    /// Reward claims paid out, in submission order.
    #[must_use]
    pub fn reward_payouts(&self) -> Vec<(Receiver, Amount)> {
        self.with_state(|state| state.reward_payouts.clone())
    }

    fn read<T>(&self, operation: &'static str, f: impl FnOnce(&LedgerState) -> T) -> LedgerResult<T> {
        self.with_state(|state| {
            if state.reads_failing {
                return Err(LedgerError::read(operation, "node unreachable"));
            }
            Ok(f(state))
        })
    }
}

impl LedgerState {
    const fn free(&self) -> Amount {
        self.balance
            .saturating_sub(self.boosted)
            .saturating_sub(self.boost_queue.amount)
    }

    fn next_tx_ref(&mut self, operation: &LedgerOperation) -> TxRef {
        self.nonce = self.nonce.saturating_add(1);
        let mut hasher = Sha256::new();
        hasher.update(format!("{}:{}:{operation:?}", self.nonce, self.block).as_bytes());
        let hex: String = hasher
            .finalize()
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect();
        TxRef::new(format!("0x{hex}"))
    }

    /// Applies `operation`, returning `false` when the ledger would reject
    /// it.
    fn apply(&mut self, operation: &LedgerOperation) -> bool {
        match operation {
            LedgerOperation::QueueBoost { amount } => {
                if amount.is_zero() || *amount > self.free() {
                    return false;
                }
                self.boost_queue = QueueEntry {
                    block: self.block,
                    amount: self.boost_queue.amount.saturating_add(*amount),
                };
            }
            LedgerOperation::ActivateBoost => {
                let elapsed = self.block.saturating_sub(self.boost_queue.block);
                if !self.boost_queue.is_queued() || elapsed < self.activation_delay {
                    return false;
                }
                self.boosted = self.boosted.saturating_add(self.boost_queue.amount);
                self.boost_queue = QueueEntry::default();
            }
            LedgerOperation::QueueDropBoost { amount } => {
                let droppable = self.boosted.saturating_sub(self.drop_queue.amount);
                if amount.is_zero() || *amount > droppable {
                    return false;
                }
                self.drop_queue = QueueEntry {
                    block: self.block,
                    amount: self.drop_queue.amount.saturating_add(*amount),
                };
            }
            LedgerOperation::DropBoost => {
                let elapsed = self.block.saturating_sub(self.drop_queue.block);
                if !self.drop_queue.is_queued() || elapsed < self.drop_delay {
                    return false;
                }
                self.boosted = self.boosted.saturating_sub(self.drop_queue.amount);
                self.drop_queue = QueueEntry::default();
            }
            LedgerOperation::Redeem { receiver, amount } => {
                if amount.is_zero() || *amount > self.free() {
                    return false;
                }
                self.balance = self.balance.saturating_sub(*amount);
                self.redeemed.push((receiver.clone(), *amount));
            }
            LedgerOperation::ClaimReward { receiver } => {
                let paid = std::mem::replace(&mut self.earned, Amount::ZERO);
                self.reward_payouts.push((receiver.clone(), paid));
            }
        }
        true
    }
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn read_balance(&self) -> LedgerResult<Amount> {
        self.read("balance_of", |state| state.balance)
    }

    async fn read_boosted(&self) -> LedgerResult<Amount> {
        self.read("boosts", |state| state.boosted)
    }

    async fn read_queued(&self) -> LedgerResult<Amount> {
        self.read("queued_boost", |state| state.boost_queue.amount)
    }

    async fn read_queue_details(&self) -> LedgerResult<QueueEntry> {
        self.read("boosted_queue", |state| state.boost_queue)
    }

    async fn read_drop_queue_details(&self) -> LedgerResult<QueueEntry> {
        self.read("drop_boost_queue", |state| state.drop_queue)
    }

    async fn read_activation_delay(&self) -> LedgerResult<u64> {
        self.read("activate_boost_delay", |state| state.activation_delay)
    }

    async fn read_drop_delay(&self) -> LedgerResult<u64> {
        self.read("drop_boost_delay", |state| state.drop_delay)
    }

    async fn read_earned(&self) -> LedgerResult<Amount> {
        self.read("earned", |state| state.earned)
    }

    async fn read_current_block(&self) -> LedgerResult<u64> {
        self.read("block_number", |state| state.block)
    }

    async fn submit(&self, operation: LedgerOperation) -> Option<TxRef> {
        self.with_state(|state| {
            if !state.execution_enabled {
                tracing::warn!(operation = %operation, "execution disabled; transaction not sent");
                return None;
            }
            match state.scripted.pop_front() {
                Some(ScriptedFailure::Refuse) => {
                    tracing::warn!(operation = %operation, "simulated ledger refused transaction");
                    None
                }
                Some(ScriptedFailure::Revert) => {
                    let tx_ref = state.next_tx_ref(&operation);
                    state.receipts.insert(tx_ref.clone(), None);
                    Some(tx_ref)
                }
                None => {
                    if !state.apply(&operation) {
                        tracing::warn!(operation = %operation, "simulated ledger rejected transaction");
                        return None;
                    }
                    let tx_ref = state.next_tx_ref(&operation);
                    state.receipts.insert(tx_ref.clone(), Some(state.block));
                    state.submitted.push(operation);
                    Some(tx_ref)
                }
            }
        })
    }

    async fn await_confirmation(&self, tx_ref: &TxRef, timeout: Duration) -> LedgerResult<Receipt> {
        let (stalled, outcome) = self.with_state(|state| {
            (
                state.stall_confirmations,
                state.receipts.get(tx_ref).copied(),
            )
        });
        if stalled {
            tokio::time::sleep(timeout).await;
            return Err(LedgerError::ConfirmationTimeout {
                tx_ref: tx_ref.clone(),
                timeout,
            });
        }
        match outcome {
            Some(Some(block_number)) => Ok(Receipt {
                tx_ref: tx_ref.clone(),
                block_number,
            }),
            Some(None) => Err(LedgerError::Reverted {
                tx_ref: tx_ref.clone(),
            }),
            None => Err(LedgerError::UnknownTransaction {
                tx_ref: tx_ref.clone(),
            }),
        }
    }
}
