//! End-to-end task flows through the engine facade.

use chrono::Duration;
use eyre::{ensure, eyre};
use rstest::rstest;
use stakeflow::{
    ledger::{domain::LedgerOperation, ports::LedgerClient},
    pipeline::TickOutcome,
    task::{
        domain::{Amount, EventType, TaskMetadata, TaskStatus},
        services::HistoryRequest,
    },
};

use super::helpers::{DROP_DELAY, TestEngine, executing};

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unboost_of_100_runs_from_request_to_archive(
    executing: eyre::Result<TestEngine>,
) -> eyre::Result<()> {
    let harness = executing?;
    harness.ledger.seed_boost(Amount::from_whole(100));
    let task = harness
        .engine
        .create_unboost_task("100", "0xpayee", TaskMetadata::new().with("origin", "api"))
        .await?;

    harness.engine.run_worker_once("unboost").await?;
    let queued = harness
        .engine
        .get_task(task.id())
        .await?
        .ok_or_else(|| eyre!("task disappeared"))?;
    ensure!(queued.task().status() == TaskStatus::Queued);
    ensure!(queued.task().queue_tx_ref().is_some());

    harness.clock.advance(Duration::seconds(30));
    harness.engine.run_worker_once("unboost").await?;
    ensure!(harness.status(task.id()).await? == TaskStatus::Queued);
    ensure!(
        harness
            .events_of(task.id(), EventType::DropBoostWaiting)
            .await?
            .len()
            == 1
    );

    harness.ledger.advance_blocks(DROP_DELAY);
    harness.clock.advance(Duration::seconds(30));
    harness.engine.run_worker_once("unboost").await?;
    ensure!(harness.status(task.id()).await? == TaskStatus::Active);
    ensure!(
        harness
            .events_of(task.id(), EventType::DropBoostSuccess)
            .await?
            .len()
            == 1
    );

    harness.engine.run_worker_once("redeem").await?;

    ensure!(harness.status(task.id()).await? == TaskStatus::Completed);
    ensure!(harness.is_archived(task.id()).await?);
    ensure!(harness.engine.list_active_tasks().await?.is_empty());
    let history = harness
        .engine
        .list_history(HistoryRequest::default())
        .await?;
    ensure!(history.total == 1);
    let statistics = harness.engine.get_statistics(None, None).await?;
    ensure!(statistics.summary.total_unboosted == Amount::from_whole(100));
    ensure!(harness.ledger.redemptions().len() == 1);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn redemption_is_first_in_first_out(executing: eyre::Result<TestEngine>) -> eyre::Result<()> {
    let harness = executing?;
    harness.ledger.seed_boost(Amount::from_whole(20));
    let first = harness
        .engine
        .create_unboost_task("10", "0xfirst", TaskMetadata::new())
        .await?;
    harness.clock.advance(Duration::seconds(1));
    let second = harness
        .engine
        .create_unboost_task("10", "0xsecond", TaskMetadata::new())
        .await?;
    harness.engine.run_worker_once("unboost").await?;
    harness.ledger.advance_blocks(DROP_DELAY);
    harness.engine.run_worker_once("unboost").await?;
    ensure!(harness.status(first.id()).await? == TaskStatus::Active);
    ensure!(harness.status(second.id()).await? == TaskStatus::Active);

    // Leave 15 of the 20 released tokens free.
    harness
        .ledger
        .submit(LedgerOperation::QueueBoost {
            amount: Amount::from_whole(5),
        })
        .await
        .ok_or_else(|| eyre!("queue boost refused"))?;

    harness.engine.run_worker_once("redeem").await?;

    ensure!(harness.status(first.id()).await? == TaskStatus::Completed);
    ensure!(harness.status(second.id()).await? == TaskStatus::Active);
    ensure!(
        harness
            .events_of(second.id(), EventType::RedeemWaiting)
            .await?
            .len()
            == 1
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn refused_queue_is_retried_on_the_next_tick(
    executing: eyre::Result<TestEngine>,
) -> eyre::Result<()> {
    let harness = executing?;
    harness.ledger.seed_boost(Amount::from_whole(8));
    let task = harness
        .engine
        .create_unboost_task("8", "0xpayee", TaskMetadata::new())
        .await?;
    harness.ledger.refuse_next(1);

    let refused = harness.engine.run_worker_once("unboost").await?;
    ensure!(matches!(refused, TickOutcome::Completed(summary) if summary.failed == 1));
    ensure!(harness.status(task.id()).await? == TaskStatus::Pending);

    harness.engine.run_worker_once("unboost").await?;

    ensure!(harness.status(task.id()).await? == TaskStatus::Queued);
    ensure!(
        harness
            .events_of(task.id(), EventType::QueueDropBoostFailed)
            .await?
            .len()
            == 1
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn boost_and_unboost_share_one_statistics_row(
    executing: eyre::Result<TestEngine>,
) -> eyre::Result<()> {
    let harness = executing?;
    harness.ledger.deposit(Amount::from_whole(5));

    harness.engine.run_worker_once("boost").await?;
    harness.ledger.advance_blocks(15);
    harness.engine.run_worker_once("boost").await?;
    ensure!(harness.ledger.boosted() == Amount::from_whole(5));

    let unboost = harness
        .engine
        .create_unboost_task("3", "0xpayee", TaskMetadata::new())
        .await?;
    harness.engine.run_worker_once("unboost").await?;
    harness.ledger.advance_blocks(DROP_DELAY);
    harness.engine.run_worker_once("unboost").await?;
    harness.engine.run_worker_once("redeem").await?;
    ensure!(harness.status(unboost.id()).await? == TaskStatus::Completed);

    let report = harness.engine.get_statistics(None, None).await?;

    ensure!(report.statistics.len() == 1);
    ensure!(report.summary.total_boosted == Amount::from_whole(5));
    ensure!(report.summary.total_unboosted == Amount::from_whole(3));
    Ok(())
}
