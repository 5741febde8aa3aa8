//! Boost driver: stake free balance through queue and activate.

use async_trait::async_trait;
use serde_json::json;

use super::context::{PipelineContext, RewardClaim, Submission};
use super::{Pipeline, PipelineResult, TickOutcome, TickSummary};
use crate::ledger::domain::{BalanceSnapshot, LedgerOperation};
use crate::task::{
    domain::{Amount, EventType, NewTask, Receiver, Task, TaskMetadata, TaskPatch, TaskStatus, TaskType},
    ports::TaskFilter,
};

/// Boosts the account's free balance towards the validator.
///
/// At most one BOOST task is in flight. A new one is created under the
/// transaction lock for the free balance not reserved by unboost tasks that
/// are about to redeem, and only when the ledger has no boost queued
/// already. Activation completes the
/// task and is followed by a best-effort reward claim.
#[derive(Debug)]
pub struct BoostPipeline {
    context: PipelineContext,
    account: Receiver,
}

impl BoostPipeline {
    /// Worker name.
    pub const NAME: &'static str = "boost";

    /// Creates the driver boosting on behalf of `account`.
    #[must_use]
    pub const fn new(context: PipelineContext, account: Receiver) -> Self {
        Self { context, account }
    }

    /// The driver's shared services.
    #[must_use]
    pub const fn context(&self) -> &PipelineContext {
        &self.context
    }

    /// Free balance minus what ACTIVE and WAITING_FOR_ACTIVATION unboost
    /// tasks will redeem.
    ///
    /// # Errors
    ///
    /// Returns an error when the task store cannot be read.
    pub async fn boostable(&self, balances: &BalanceSnapshot) -> PipelineResult<Amount> {
        let reserved: Amount = self
            .context
            .store()
            .list_pending(TaskFilter {
                task_type: Some(TaskType::Unboost),
                status: None,
            })
            .await?
            .iter()
            .filter(|task| {
                matches!(
                    task.status(),
                    TaskStatus::Active | TaskStatus::WaitingForActivation
                )
            })
            .map(Task::amount)
            .sum();
        Ok(balances.free.saturating_sub(reserved))
    }

    async fn in_flight(&self) -> PipelineResult<Option<Task>> {
        Ok(self
            .context
            .store()
            .list_pending(TaskFilter {
                task_type: Some(TaskType::Boost),
                status: None,
            })
            .await?
            .into_iter()
            .next())
    }

    async fn start_boost(&self, summary: &mut TickSummary) -> PipelineResult<Option<Task>> {
        let Some(_guard) = self.context.lock(Self::NAME).await else {
            summary.lock_busy = true;
            return Ok(None);
        };
        if let Some(existing) = self.in_flight().await? {
            tracing::info!(task_id = %existing.id(), "boost task created elsewhere; resuming it");
            summary.examined += 1;
            return Ok(Some(existing));
        }
        let balances = self.context.oracle().balances().await?;
        if !balances.queued.is_zero() {
            tracing::debug!(queued = %balances.queued, "boost already queued on the ledger");
            return Ok(None);
        }
        let amount = self.boostable(&balances).await?;
        if amount.is_zero() {
            return Ok(None);
        }
        let new_task = NewTask::new(
            TaskType::Boost,
            amount,
            self.account.clone(),
            TaskMetadata::new()
                .with("origin", "boost_worker")
                .with("description", format!("boosting {amount} of free balance")),
        )?;
        let task = self.context.store().create(new_task).await?;
        summary.examined += 1;
        tracing::info!(task_id = %task.id(), amount = %amount, "boost task created");
        Ok(Some(task))
    }

    async fn queue(&self, task: &Task, summary: &mut TickSummary) -> PipelineResult<()> {
        let operation = LedgerOperation::QueueBoost {
            amount: task.amount(),
        };
        match self.context.submit(Self::NAME, task, operation).await? {
            Submission::LockBusy => summary.lock_busy = true,
            Submission::Stale => summary.stale += 1,
            Submission::Failed(failure) => {
                summary.failed += 1;
                if self
                    .context
                    .fail_step(task, "queue_boost", EventType::QueueBoostFailed, &failure)
                    .await?
                {
                    summary.escalated += 1;
                }
            }
            Submission::Confirmed { tx_ref, guard } => {
                let store = self.context.store();
                store
                    .update(task.id(), TaskPatch::queued(tx_ref.clone()))
                    .await?;
                store
                    .log_event(
                        task.id(),
                        EventType::QueueBoostSuccess,
                        json!({ "tx_ref": tx_ref, "amount": task.amount() }),
                    )
                    .await;
                drop(guard);
                self.context.succeeded(task);
                summary.advanced += 1;
            }
        }
        Ok(())
    }

    async fn activate(&self, task: &Task, summary: &mut TickSummary) -> PipelineResult<()> {
        let store = self.context.store();
        if !self.context.oracle().can_activate_boost().await {
            summary.waiting += 1;
            let remaining = self
                .context
                .oracle()
                .boost_delay()
                .await
                .map_or(0, |delay| delay.remaining_blocks);
            self.context
                .log_waiting(
                    task,
                    EventType::ActivateBoostWaiting,
                    json!({
                        "message": format!("waiting {remaining} blocks to activate queued boost"),
                        "remaining_blocks": remaining,
                    }),
                )
                .await?;
            return Ok(());
        }
        let Some(guard) = self.context.lock(Self::NAME).await else {
            summary.lock_busy = true;
            return Ok(());
        };
        let statuses = [TaskStatus::Queued, TaskStatus::WaitingForActivation];
        let Some(current) = self.context.reload(task, &statuses).await? else {
            summary.stale += 1;
            return Ok(());
        };
        if current.status() == TaskStatus::Queued {
            store
                .update(task.id(), TaskPatch::status(TaskStatus::WaitingForActivation))
                .await?;
        }
        match self
            .context
            .send(guard, Self::NAME, LedgerOperation::ActivateBoost)
            .await
        {
            Err(failure) => {
                summary.failed += 1;
                if self
                    .context
                    .fail_step(
                        task,
                        "activate_boost",
                        EventType::ActivateBoostFailed,
                        &failure,
                    )
                    .await?
                {
                    summary.escalated += 1;
                }
            }
            Ok((tx_ref, guard)) => {
                store
                    .update(task.id(), TaskPatch::activated(tx_ref.clone()))
                    .await?;
                store
                    .log_event(
                        task.id(),
                        EventType::ActivateBoostSuccess,
                        json!({ "tx_ref": tx_ref }),
                    )
                    .await;
                store.complete(task.id(), TaskStatus::Completed).await?;
                drop(guard);
                self.context.succeeded(task);
                summary.advanced += 1;
                tracing::info!(task_id = %task.id(), tx_ref = %tx_ref, "boost activated");
                self.claim_reward(task).await;
            }
        }
        Ok(())
    }

    async fn claim_reward(&self, task: &Task) {
        let claim = self
            .context
            .claim_reward(Self::NAME, self.account.clone())
            .await;
        let (event_type, details) = match claim {
            RewardClaim::Claimed(tx_ref) => {
                (EventType::ClaimRewardSuccess, json!({ "tx_ref": tx_ref }))
            }
            RewardClaim::LockBusy => (
                EventType::ClaimRewardFailed,
                json!({ "error": "transaction lock busy" }),
            ),
            RewardClaim::Failed(error) => (EventType::ClaimRewardFailed, json!({ "error": error })),
        };
        self.context
            .store()
            .log_event(task.id(), event_type, details)
            .await;
    }

    async fn observe(&self) -> PipelineResult<TickOutcome> {
        let balances = self.context.oracle().balances().await?;
        let boostable = self.boostable(&balances).await?;
        let can_activate = self.context.oracle().can_activate_boost().await;
        tracing::info!(
            free = %balances.free,
            boostable = %boostable,
            queued = %balances.queued,
            can_activate,
            "observation mode: boost not submitted"
        );
        Ok(TickOutcome::Skipped(format!(
            "observation mode: boostable {boostable}, activation ready: {can_activate}"
        )))
    }
}

#[async_trait]
impl Pipeline for BoostPipeline {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn run_once(&self) -> PipelineResult<TickOutcome> {
        if !self.context.settings().execution_enabled {
            return self.observe().await;
        }
        let _pass = self.context.begin_pass().await;
        let mut summary = TickSummary::default();
        let current = match self.in_flight().await? {
            Some(task) => {
                summary.examined += 1;
                task
            }
            None => match self.start_boost(&mut summary).await? {
                Some(task) => task,
                None => return Ok(TickOutcome::Completed(summary)),
            },
        };
        if self.context.is_backing_off(&current) {
            summary.backing_off += 1;
            return Ok(TickOutcome::Completed(summary));
        }

        match current.status() {
            TaskStatus::Pending => self.queue(&current, &mut summary).await?,
            TaskStatus::Queued | TaskStatus::WaitingForActivation => {
                self.activate(&current, &mut summary).await?;
            }
            TaskStatus::Active => {
                // Activated but not archived before a restart.
                self.context
                    .store()
                    .complete(current.id(), TaskStatus::Completed)
                    .await?;
                summary.advanced += 1;
            }
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Canceled => {}
        }
        Ok(TickOutcome::Completed(summary))
    }
}
