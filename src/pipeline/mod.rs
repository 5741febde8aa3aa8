//! Pipeline drivers that move tasks through their lifecycle.
//!
//! Each driver implements [`Pipeline`]: one call to
//! [`Pipeline::run_once`] is one scheduler tick. Drivers read due tasks from
//! the [`crate::task::ports::TaskStore`], consult the
//! [`crate::ledger::services::ConditionOracle`], submit under the
//! [`crate::txlock::TransactionLock`] and record the result as a typed patch
//! plus an event.

mod boost;
mod context;
mod outcome;
mod redeem;
mod retry;
mod unboost;

pub use boost::BoostPipeline;
pub use context::{PipelineContext, PipelineSettings, RewardClaim};
pub use outcome::{TickOutcome, TickSummary};
pub use redeem::RedeemPipeline;
pub use retry::{FailureTracker, RetryPolicy};
pub use unboost::UnboostPipeline;

use async_trait::async_trait;
use thiserror::Error;

use crate::ledger::domain::LedgerError;
use crate::task::{domain::TaskDomainError, ports::TaskStoreError};

/// Result type for pipeline ticks.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors that end a tick early.
///
/// Submission failures are not errors; they are logged on the task and
/// retried under the [`RetryPolicy`].
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    /// The task store failed.
    #[error(transparent)]
    Store(#[from] TaskStoreError),

    /// A ledger read the tick depends on failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// A task the driver tried to create was invalid.
    #[error(transparent)]
    Domain(#[from] TaskDomainError),
}

/// One unit of periodic work driven by the scheduler.
#[async_trait]
pub trait Pipeline: Send + Sync {
    /// Worker name used for toggling and in tick reports.
    fn name(&self) -> &'static str;

    /// Runs one pass.
    ///
    /// # Errors
    ///
    /// Returns a [`PipelineError`] when the pass could not run; the
    /// scheduler reports it and tries again on the next tick.
    async fn run_once(&self) -> PipelineResult<TickOutcome>;
}

#[cfg(test)]
mod tests;
