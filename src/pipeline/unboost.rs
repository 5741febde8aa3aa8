//! Unboost driver: queue the drop, then execute it once its delay elapses.

use async_trait::async_trait;
use serde_json::json;

use super::context::{PipelineContext, Submission};
use super::{Pipeline, PipelineResult, TickOutcome, TickSummary};
use crate::ledger::domain::LedgerOperation;
use crate::task::{
    domain::{EventType, Task, TaskPatch, TaskStatus, TaskType},
    ports::TaskFilter,
};

/// Moves UNBOOST tasks from PENDING to ACTIVE.
///
/// The ledger keeps a single drop queue per validator, so one `DropBoost`
/// executes every queued drop at once. When the delay has elapsed the driver
/// submits one `DropBoost` and activates every QUEUED and
/// WAITING_FOR_ACTIVATION task with its reference.
#[derive(Debug)]
pub struct UnboostPipeline {
    context: PipelineContext,
}

impl UnboostPipeline {
    /// Worker name.
    pub const NAME: &'static str = "unboost";

    /// Creates the driver.
    #[must_use]
    pub const fn new(context: PipelineContext) -> Self {
        Self { context }
    }

    /// The driver's shared services.
    #[must_use]
    pub const fn context(&self) -> &PipelineContext {
        &self.context
    }

    async fn queue_pending(&self, summary: &mut TickSummary) -> PipelineResult<()> {
        let store = self.context.store();
        let pending = store
            .list_pending(TaskFilter::of(TaskType::Unboost, TaskStatus::Pending))
            .await?;
        for task in pending {
            summary.examined += 1;
            if self.context.is_backing_off(&task) {
                summary.backing_off += 1;
                continue;
            }
            let operation = LedgerOperation::QueueDropBoost {
                amount: task.amount(),
            };
            match self.context.submit(Self::NAME, &task, operation).await? {
                Submission::LockBusy => {
                    summary.lock_busy = true;
                    return Ok(());
                }
                Submission::Stale => summary.stale += 1,
                Submission::Failed(failure) => {
                    summary.failed += 1;
                    let escalated = self
                        .context
                        .fail_step(
                            &task,
                            "queue_drop_boost",
                            EventType::QueueDropBoostFailed,
                            &failure,
                        )
                        .await?;
                    if escalated {
                        summary.escalated += 1;
                    }
                }
                Submission::Confirmed { tx_ref, guard } => {
                    store
                        .update(task.id(), TaskPatch::queued(tx_ref.clone()))
                        .await?;
                    store
                        .log_event(
                            task.id(),
                            EventType::QueueDropBoostSuccess,
                            json!({ "tx_ref": tx_ref, "amount": task.amount() }),
                        )
                        .await;
                    drop(guard);
                    self.context.succeeded(&task);
                    summary.advanced += 1;
                    tracing::info!(task_id = %task.id(), tx_ref = %tx_ref, "drop boost queued");
                }
            }
        }
        Ok(())
    }

    async fn queued(&self) -> PipelineResult<Vec<Task>> {
        Ok(self
            .context
            .store()
            .list_pending(TaskFilter {
                task_type: Some(TaskType::Unboost),
                status: None,
            })
            .await?
            .into_iter()
            .filter(|task| {
                matches!(
                    task.status(),
                    TaskStatus::Queued | TaskStatus::WaitingForActivation
                )
            })
            .collect())
    }

    async fn drop_queued(&self, summary: &mut TickSummary) -> PipelineResult<()> {
        let queued = self.queued().await?;
        if queued.is_empty() {
            return Ok(());
        }
        summary.examined += queued.len();

        if !self.context.oracle().can_drop_boost().await {
            let remaining = self
                .context
                .oracle()
                .drop_delay()
                .await
                .map_or(0, |delay| delay.remaining_blocks);
            let message = if remaining > 0 {
                format!("waiting {remaining} blocks for drop boost conditions to be met")
            } else {
                "waiting for drop boost conditions to be met".to_owned()
            };
            for task in &queued {
                summary.waiting += 1;
                self.context
                    .log_waiting(
                        task,
                        EventType::DropBoostWaiting,
                        json!({ "message": message, "remaining_blocks": remaining }),
                    )
                    .await?;
            }
            return Ok(());
        }

        // One DropBoost covers every queued drop, so the batch backs off as
        // a whole.
        if queued.iter().any(|task| self.context.is_backing_off(task)) {
            summary.backing_off += queued.len();
            return Ok(());
        }

        let Some(guard) = self.context.lock(Self::NAME).await else {
            summary.lock_busy = true;
            return Ok(());
        };
        // The batch must be exactly what the delay check saw.
        let batch = self.queued().await?;
        let unchanged = batch.len() == queued.len()
            && batch
                .iter()
                .zip(&queued)
                .all(|(current, seen)| current.id() == seen.id());
        if !unchanged {
            tracing::info!(
                seen = queued.len(),
                found = batch.len(),
                "drop queue changed before submission; skipping"
            );
            summary.stale += queued.len();
            return Ok(());
        }
        let store = self.context.store();
        for task in batch.iter().filter(|task| task.status() == TaskStatus::Queued) {
            store
                .update(
                    task.id(),
                    TaskPatch::status(TaskStatus::WaitingForActivation),
                )
                .await?;
        }
        let Some(oldest) = batch.first() else {
            return Ok(());
        };
        tracing::info!(task_id = %oldest.id(), batch = batch.len(), "executing drop boost");

        match self.context.send(guard, Self::NAME, LedgerOperation::DropBoost).await {
            Err(failure) => {
                for task in &batch {
                    summary.failed += 1;
                    let escalated = self
                        .context
                        .fail_step(task, "drop_boost", EventType::DropBoostFailed, &failure)
                        .await?;
                    if escalated {
                        summary.escalated += 1;
                    }
                }
            }
            Ok((tx_ref, guard)) => {
                for task in &batch {
                    store
                        .update(task.id(), TaskPatch::activated(tx_ref.clone()))
                        .await?;
                    store
                        .log_event(
                            task.id(),
                            EventType::DropBoostSuccess,
                            json!({ "tx_ref": tx_ref }),
                        )
                        .await;
                    self.context.succeeded(task);
                    summary.advanced += 1;
                }
                drop(guard);
                tracing::info!(tx_ref = %tx_ref, activated = batch.len(), "drop boost executed");
            }
        }
        Ok(())
    }

    async fn observe(&self) -> PipelineResult<TickOutcome> {
        let tasks = self
            .context
            .store()
            .list_pending(TaskFilter {
                task_type: Some(TaskType::Unboost),
                status: None,
            })
            .await?;
        let count = |status: TaskStatus| tasks.iter().filter(|task| task.status() == status).count();
        let pending = count(TaskStatus::Pending);
        let queued = count(TaskStatus::Queued) + count(TaskStatus::WaitingForActivation);
        let drop_ready = queued > 0 && self.context.oracle().can_drop_boost().await;
        tracing::info!(pending, queued, drop_ready, "observation mode: unboost tasks not advanced");
        Ok(TickOutcome::Skipped(format!(
            "observation mode: {pending} pending, {queued} queued, drop ready: {drop_ready}"
        )))
    }
}

#[async_trait]
impl Pipeline for UnboostPipeline {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn run_once(&self) -> PipelineResult<TickOutcome> {
        if !self.context.settings().execution_enabled {
            return self.observe().await;
        }
        let _pass = self.context.begin_pass().await;
        let mut summary = TickSummary::default();
        self.queue_pending(&mut summary).await?;
        if !summary.lock_busy {
            self.drop_queued(&mut summary).await?;
        }
        Ok(TickOutcome::Completed(summary))
    }
}

