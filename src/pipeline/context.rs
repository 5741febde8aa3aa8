//! Services and settings shared by every pipeline driver.

use mockable::Clock;
use serde_json::{Value, json};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};

use super::{FailureTracker, PipelineResult, RetryPolicy};
use crate::clock::SharedClock;
use crate::ledger::{
    domain::{LedgerError, LedgerOperation},
    services::ConditionOracle,
};
use crate::task::{
    domain::{EventType, Receiver, Task, TaskId, TaskStatus, TxRef},
    ports::TaskStore,
};
use crate::txlock::{AcquireMode, TransactionLock, TxLockGuard};

/// Knobs shared by the pipeline drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    /// When `false` drivers only report what they would do.
    pub execution_enabled: bool,
    /// How drivers wait for the transaction lock.
    pub lock_mode: AcquireMode,
    /// Whether a step waits for its receipt before advancing the task.
    pub await_confirmations: bool,
    /// Upper bound on one confirmation wait.
    pub confirmation_timeout: Duration,
    /// Retry policy for failed steps.
    pub retry: RetryPolicy,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            execution_enabled: true,
            lock_mode: AcquireMode::NonBlocking,
            await_confirmations: true,
            confirmation_timeout: Duration::from_secs(120),
            retry: RetryPolicy::default(),
        }
    }
}

/// Handles a driver needs to advance tasks.
pub struct PipelineContext {
    store: Arc<dyn TaskStore>,
    oracle: ConditionOracle,
    lock: Arc<TransactionLock>,
    clock: SharedClock,
    settings: PipelineSettings,
    failures: FailureTracker,
    pass: Mutex<()>,
}

impl std::fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineContext")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Result of submitting one ledger operation under the lock.
pub(super) enum Submission {
    /// Mined successfully; the guard keeps the lock until the task is
    /// updated.
    Confirmed { tx_ref: TxRef, guard: TxLockGuard },
    /// Someone else holds the lock; try again next tick.
    LockBusy,
    /// The task moved on or left the store while this pass waited.
    Stale,
    /// Nothing durable happened.
    Failed(StepFailure),
}

/// Outcome of an on-demand reward claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewardClaim {
    /// The claim was mined.
    Claimed(TxRef),
    /// Another owner holds the transaction lock.
    LockBusy,
    /// The claim was not submitted or not confirmed.
    Failed(String),
}

/// Why a submission did not produce a confirmed transaction.
pub(super) enum StepFailure {
    NotSubmitted,
    Unconfirmed { tx_ref: TxRef, error: LedgerError },
}

impl StepFailure {
    fn details(&self, operation: &str) -> Value {
        match self {
            Self::NotSubmitted => json!({
                "operation": operation,
                "error": format!("failed to submit {operation}"),
            }),
            Self::Unconfirmed { tx_ref, error } => json!({
                "operation": operation,
                "tx_ref": tx_ref,
                "error": error.to_string(),
            }),
        }
    }
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotSubmitted => f.write_str("transaction not submitted"),
            Self::Unconfirmed { tx_ref, error } => {
                write!(f, "transaction {tx_ref} not confirmed: {error}")
            }
        }
    }
}

impl PipelineContext {
    /// Bundles the services a driver uses.
    #[must_use]
    pub fn new(
        store: Arc<dyn TaskStore>,
        oracle: ConditionOracle,
        lock: Arc<TransactionLock>,
        clock: SharedClock,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            oracle,
            lock,
            clock,
            failures: FailureTracker::new(settings.retry),
            settings,
            pass: Mutex::new(()),
        }
    }

    /// The task store.
    #[must_use]
    pub fn store(&self) -> &dyn TaskStore {
        self.store.as_ref()
    }

    /// The condition oracle.
    #[must_use]
    pub const fn oracle(&self) -> &ConditionOracle {
        &self.oracle
    }

    /// The driver settings.
    #[must_use]
    pub const fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Consecutive failures recorded for a task.
    #[must_use]
    pub fn failure_count(&self, task_id: &TaskId) -> u32 {
        self.failures.count(task_id)
    }

    pub(super) fn is_backing_off(&self, task: &Task) -> bool {
        !self.failures.is_ready(task.id(), self.clock.utc())
    }

    pub(super) fn succeeded(&self, task: &Task) {
        self.failures.clear(task.id());
    }

    /// Waits for any other pass of this driver to finish.
    ///
    /// Hold the guard for the whole pass.
    pub(super) async fn begin_pass(&self) -> MutexGuard<'_, ()> {
        self.pass.lock().await
    }

    /// Takes the transaction lock in the configured mode.
    pub(super) async fn lock(&self, owner: &str) -> Option<TxLockGuard> {
        self.lock.lock(owner, self.settings.lock_mode).await
    }

    /// Re-reads `task`, returning the stored copy only while it is still in
    /// flight with one of `statuses`.
    pub(super) async fn reload(
        &self,
        task: &Task,
        statuses: &[TaskStatus],
    ) -> PipelineResult<Option<Task>> {
        match self.store.get(task.id()).await? {
            Some(current) if statuses.contains(&current.status()) => Ok(Some(current)),
            other => {
                tracing::info!(
                    task_id = %task.id(),
                    seen = %task.status(),
                    found = ?other.as_ref().map(Task::status),
                    "task changed before submission; skipping"
                );
                Ok(None)
            }
        }
    }

    /// Takes the lock, checks that `task` is unchanged, then submits
    /// `operation` and waits for its receipt.
    pub(super) async fn submit(
        &self,
        owner: &str,
        task: &Task,
        operation: LedgerOperation,
    ) -> PipelineResult<Submission> {
        let Some(guard) = self.lock(owner).await else {
            return Ok(Submission::LockBusy);
        };
        if self.reload(task, &[task.status()]).await?.is_none() {
            return Ok(Submission::Stale);
        }
        Ok(match self.send(guard, owner, operation).await {
            Ok((tx_ref, guard)) => Submission::Confirmed { tx_ref, guard },
            Err(failure) => Submission::Failed(failure),
        })
    }

    /// Submits `operation` while `guard` is held and waits for its receipt.
    pub(super) async fn send(
        &self,
        guard: TxLockGuard,
        owner: &str,
        operation: LedgerOperation,
    ) -> Result<(TxRef, TxLockGuard), StepFailure> {
        let name = operation.name();
        let ledger = self.oracle.ledger();
        let Some(tx_ref) = ledger.submit(operation).await else {
            tracing::warn!(owner, operation = name, "ledger operation not submitted");
            return Err(StepFailure::NotSubmitted);
        };
        if self.settings.await_confirmations {
            let confirmation = ledger
                .await_confirmation(&tx_ref, self.settings.confirmation_timeout)
                .await;
            if let Err(error) = confirmation {
                tracing::warn!(owner, operation = name, tx_ref = %tx_ref, error = %error, "ledger operation not confirmed");
                return Err(StepFailure::Unconfirmed { tx_ref, error });
            }
        }
        tracing::info!(owner, operation = name, tx_ref = %tx_ref, "ledger operation confirmed");
        Ok((tx_ref, guard))
    }

    /// Claims accrued rewards for `receiver` under the transaction lock.
    ///
    /// The lock is released before this returns.
    pub async fn claim_reward(&self, owner: &str, receiver: Receiver) -> RewardClaim {
        let Some(guard) = self.lock(owner).await else {
            tracing::info!(owner, "transaction lock busy; reward claim deferred");
            return RewardClaim::LockBusy;
        };
        match self
            .send(guard, owner, LedgerOperation::ClaimReward { receiver })
            .await
        {
            Ok((tx_ref, _guard)) => RewardClaim::Claimed(tx_ref),
            Err(failure) => RewardClaim::Failed(failure.to_string()),
        }
    }

    /// Logs a failed step and applies the retry policy.
    ///
    /// Returns `true` when the task hit the attempt limit and was completed
    /// as failed.
    pub(super) async fn fail_step(
        &self,
        task: &Task,
        operation: &str,
        failure_event: EventType,
        failure: &StepFailure,
    ) -> PipelineResult<bool> {
        if let StepFailure::Unconfirmed { tx_ref, error } = failure {
            self.store
                .log_event(
                    task.id(),
                    EventType::ConfirmationFailed,
                    json!({ "tx_ref": tx_ref, "error": error.to_string() }),
                )
                .await;
        }
        self.store
            .log_event(task.id(), failure_event, failure.details(operation))
            .await;

        let attempts = self.failures.record(task.id(), self.clock.utc());
        if !self.failures.policy().is_exhausted(attempts) {
            return Ok(false);
        }
        tracing::warn!(task_id = %task.id(), attempts, operation, "retry limit reached; failing task");
        self.store
            .log_event(
                task.id(),
                EventType::RetryLimitExceeded,
                json!({ "attempts": attempts, "last_failure": failure_event.as_str() }),
            )
            .await;
        self.store.complete(task.id(), TaskStatus::Failed).await?;
        self.failures.clear(task.id());
        Ok(true)
    }

    /// Logs a waiting notice unless one was already logged since the task
    /// last changed.
    pub(super) async fn log_waiting(
        &self,
        task: &Task,
        event_type: EventType,
        details: Value,
    ) -> PipelineResult<bool> {
        let last = self.store.last_event_of_type(task.id(), event_type).await?;
        if last.is_some_and(|event| event.timestamp() >= task.updated_at()) {
            return Ok(false);
        }
        self.store.log_event(task.id(), event_type, details).await;
        Ok(true)
    }
}
