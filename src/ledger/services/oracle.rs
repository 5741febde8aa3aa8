//! Delay-gated permissions and balances derived from the ledger.

use std::sync::Arc;

use crate::ledger::{
    domain::{BalanceSnapshot, DelayStatus, LedgerResult},
    ports::LedgerClient,
};
use crate::task::domain::Amount;

/// Answers "may we activate the boost / execute the drop now?" from live
/// ledger state.
///
/// Nothing is cached: every call reads the ledger, so decisions survive a
/// restart without any persisted eligibility.
#[derive(Clone)]
pub struct ConditionOracle {
    ledger: Arc<dyn LedgerClient>,
}

impl std::fmt::Debug for ConditionOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConditionOracle").finish_non_exhaustive()
    }
}

impl ConditionOracle {
    /// Creates an oracle over `ledger`.
    #[must_use]
    pub fn new(ledger: Arc<dyn LedgerClient>) -> Self {
        Self { ledger }
    }

    /// Returns the ledger this oracle reads.
    #[must_use]
    pub const fn ledger(&self) -> &Arc<dyn LedgerClient> {
        &self.ledger
    }

    /// Reads total, boosted and queued balances and derives the free
    /// balance.
    ///
    /// # Errors
    ///
    /// Returns the first failed ledger read.
    pub async fn balances(&self) -> LedgerResult<BalanceSnapshot> {
        let total = self.ledger.read_balance().await?;
        let boosted = self.ledger.read_boosted().await?;
        let queued = self.ledger.read_queued().await?;
        Ok(BalanceSnapshot::new(total, boosted, queued))
    }

    /// Rewards earned and not yet claimed.
    ///
    /// # Errors
    ///
    /// Returns the failed ledger read.
    pub async fn earned(&self) -> LedgerResult<Amount> {
        self.ledger.read_earned().await
    }

    /// Progress of the queued boost towards activation.
    ///
    /// # Errors
    ///
    /// Returns the first failed ledger read.
    pub async fn boost_delay(&self) -> LedgerResult<DelayStatus> {
        let entry = self.ledger.read_queue_details().await?;
        let delay = self.ledger.read_activation_delay().await?;
        let block = self.ledger.read_current_block().await?;
        Ok(DelayStatus::evaluate(entry, delay, block))
    }

    /// Progress of the queued drop towards execution.
    ///
    /// # Errors
    ///
    /// Returns the first failed ledger read.
    pub async fn drop_delay(&self) -> LedgerResult<DelayStatus> {
        let entry = self.ledger.read_drop_queue_details().await?;
        let delay = self.ledger.read_drop_delay().await?;
        let block = self.ledger.read_current_block().await?;
        Ok(DelayStatus::evaluate(entry, delay, block))
    }

    /// Whether the queued boost can be activated now.
    ///
    /// A failed read counts as "not yet".
    pub async fn can_activate_boost(&self) -> bool {
        Self::ready_or_log("activate boost", self.boost_delay().await)
    }

    /// Whether the queued drop can be executed now.
    ///
    /// A failed read counts as "not yet".
    pub async fn can_drop_boost(&self) -> bool {
        Self::ready_or_log("drop boost", self.drop_delay().await)
    }

    fn ready_or_log(condition: &'static str, status: LedgerResult<DelayStatus>) -> bool {
        match status {
            Ok(delay) => {
                if !delay.ready && delay.remaining_blocks > 0 {
                    tracing::debug!(
                        condition,
                        remaining_blocks = delay.remaining_blocks,
                        "delay not yet elapsed"
                    );
                }
                delay.ready
            }
            Err(err) => {
                tracing::warn!(condition, error = %err, "ledger read failed; condition treated as not met");
                false
            }
        }
    }
}
