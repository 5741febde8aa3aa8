//! Redemption driver: pays out ACTIVE unboost tasks oldest first.

use async_trait::async_trait;
use serde_json::json;

use super::context::{PipelineContext, Submission};
use super::{Pipeline, PipelineResult, TickOutcome, TickSummary};
use crate::ledger::domain::LedgerOperation;
use crate::task::{
    domain::{EventType, TaskPatch, TaskStatus, TaskType},
    ports::TaskFilter,
};

/// Redeems ACTIVE UNBOOST tasks and completes them.
///
/// The free balance is read once per pass and drawn down locally as tasks
/// are paid; a task that does not fit waits without consuming balance, so a
/// smaller later task may still be paid in the same pass. Passes of one
/// driver never overlap, and each task is re-read under the transaction lock
/// so a task completed elsewhere is never paid twice.
#[derive(Debug)]
pub struct RedeemPipeline {
    context: PipelineContext,
}

impl RedeemPipeline {
    /// Worker name.
    pub const NAME: &'static str = "redeem";

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
}

#[async_trait]
impl Pipeline for RedeemPipeline {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn run_once(&self) -> PipelineResult<TickOutcome> {
        let _pass = self.context.begin_pass().await;
        let store = self.context.store();
        let active = store
            .list_pending(TaskFilter::of(TaskType::Unboost, TaskStatus::Active))
            .await?;
        let mut summary = TickSummary::default();
        if active.is_empty() {
            return Ok(TickOutcome::Completed(summary));
        }
        if !self.context.settings().execution_enabled {
            tracing::info!(active = active.len(), "observation mode: redemptions not submitted");
            return Ok(TickOutcome::Skipped(format!(
                "observation mode: {} active tasks ready for redeem",
                active.len()
            )));
        }

        let mut available = self.context.oracle().balances().await?.free;
        for task in active {
            summary.examined += 1;
            if self.context.is_backing_off(&task) {
                summary.backing_off += 1;
                continue;
            }
            if available < task.amount() {
                summary.waiting += 1;
                store
                    .log_event(
                        task.id(),
                        EventType::RedeemWaiting,
                        json!({
                            "message": format!(
                                "waiting for enough free balance; available {available}, required {}",
                                task.amount()
                            ),
                            "available": available,
                            "required": task.amount(),
                        }),
                    )
                    .await;
                continue;
            }

            let operation = LedgerOperation::Redeem {
                receiver: task.receiver().clone(),
                amount: task.amount(),
            };
            match self.context.submit(Self::NAME, &task, operation).await? {
                Submission::LockBusy => {
                    summary.lock_busy = true;
                    break;
                }
                Submission::Stale => summary.stale += 1,
                Submission::Failed(failure) => {
                    summary.failed += 1;
                    let escalated = self
                        .context
                        .fail_step(&task, "redeem", EventType::RedeemFailed, &failure)
                        .await?;
                    if escalated {
                        summary.escalated += 1;
                    }
                }
                Submission::Confirmed { tx_ref, guard } => {
                    available = available.saturating_sub(task.amount());
                    store
                        .update(task.id(), TaskPatch::redeemed(tx_ref.clone()))
                        .await?;
                    store
                        .log_event(
                            task.id(),
                            EventType::RedeemSuccess,
                            json!({
                                "tx_ref": tx_ref,
                                "amount": task.amount(),
                                "receiver": task.receiver(),
                            }),
                        )
                        .await;
                    store.complete(task.id(), TaskStatus::Completed).await?;
                    drop(guard);
                    self.context.succeeded(&task);
                    summary.advanced += 1;
                    tracing::info!(
                        task_id = %task.id(),
                        tx_ref = %tx_ref,
                        amount = %task.amount(),
                        "task redeemed and completed"
                    );
                }
            }
        }
        Ok(TickOutcome::Completed(summary))
    }
}
