//! Cached view of ledger state for dashboards and callers.
//!
//! The snapshot is rebuilt by the `status` worker on its own interval and
//! read without touching the ledger. Pipelines never wait on it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::Serialize;
use std::sync::{Mutex, PoisonError};

use crate::clock::SharedClock;
use crate::config::ExecutionMode;
use crate::ledger::domain::{BalanceSnapshot, DelayStatus, LedgerResult};
use crate::ledger::services::ConditionOracle;
use crate::pipeline::{Pipeline, PipelineResult, TickOutcome, TickSummary};

/// Combined ledger state at one moment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    /// Total, boosted, queued and free balances.
    pub balances: BalanceSnapshot,
    /// Boost queue progress towards activation.
    pub boost_queue: DelayStatus,
    /// Drop queue progress towards execution.
    pub drop_queue: DelayStatus,
    /// Ledger block height at refresh time.
    pub block_number: u64,
    /// When the snapshot was taken.
    pub last_update: DateTime<Utc>,
    /// Whether the engine submits operations or only observes.
    pub mode: ExecutionMode,
}

impl StatusSnapshot {
    /// Whether the queued boost can be activated.
    #[must_use]
    pub const fn can_activate(&self) -> bool {
        self.boost_queue.ready
    }

    /// Whether the queued drop can be executed.
    #[must_use]
    pub const fn can_drop(&self) -> bool {
        self.drop_queue.ready
    }
}

/// Holds the last good [`StatusSnapshot`].
pub struct StatusCache {
    oracle: ConditionOracle,
    clock: SharedClock,
    mode: ExecutionMode,
    current: Mutex<Option<StatusSnapshot>>,
}

impl std::fmt::Debug for StatusCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusCache")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl StatusCache {
    /// Worker name used by the scheduler.
    pub const NAME: &'static str = "status";

    /// Creates an empty cache.
    #[must_use]
    pub const fn new(oracle: ConditionOracle, clock: SharedClock, mode: ExecutionMode) -> Self {
        Self {
            oracle,
            clock,
            mode,
            current: Mutex::new(None),
        }
    }

    /// Reads the ledger and replaces the cached snapshot.
    ///
    /// The ledger is read before the cache lock is taken. On failure the
    /// previous snapshot is kept.
    ///
    /// # Errors
    ///
    /// Returns the first failed ledger read.
    pub async fn refresh(&self) -> LedgerResult<StatusSnapshot> {
        let balances = self.oracle.balances().await?;
        let boost_queue = self.oracle.boost_delay().await?;
        let drop_queue = self.oracle.drop_delay().await?;
        let block_number = self.oracle.ledger().read_current_block().await?;
        let snapshot = StatusSnapshot {
            balances,
            boost_queue,
            drop_queue,
            block_number,
            last_update: self.clock.utc(),
            mode: self.mode,
        };
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(snapshot.clone());
        tracing::debug!(block_number, free = %balances.free, "status refreshed");
        Ok(snapshot)
    }

    /// Returns the cached snapshot, refreshing first if none exists yet.
    ///
    /// # Errors
    ///
    /// Returns a ledger error when the first refresh fails.
    pub async fn snapshot(&self) -> LedgerResult<StatusSnapshot> {
        if let Some(snapshot) = self.cached() {
            return Ok(snapshot);
        }
        self.refresh().await
    }

    /// The cached snapshot without any ledger reads.
    #[must_use]
    pub fn cached(&self) -> Option<StatusSnapshot> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Pipeline for StatusCache {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn run_once(&self) -> PipelineResult<TickOutcome> {
        self.refresh().await?;
        Ok(TickOutcome::Completed(TickSummary::default()))
    }
}
