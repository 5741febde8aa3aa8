//! Caller operations exposed by the engine.

use eyre::ensure;
use rstest::rstest;
use stakeflow::{
    config::{EngineConfig, ExecutionMode},
    engine::EngineError,
    pipeline::TickOutcome,
    task::{
        domain::{Amount, TaskId, TaskMetadata, TaskType},
        services::{HistoryRequest, TaskLifecycleError},
    },
};

use super::helpers::{DROP_DELAY, TestEngine, execution_config, executing};

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn observation_mode_refuses_requests_and_only_reports() -> eyre::Result<()> {
    let harness = TestEngine::build(EngineConfig {
        mode: ExecutionMode::Observation,
        ..execution_config()
    })?;
    harness.ledger.seed_boost(Amount::from_whole(10));

    let refused = harness
        .engine
        .create_unboost_task("10", "0xpayee", TaskMetadata::new())
        .await;
    let unboost = harness.engine.run_worker_once("unboost").await?;
    let redeem = harness.engine.run_worker_once("redeem").await?;

    ensure!(matches!(refused, Err(EngineError::ObservationMode)));
    ensure!(matches!(unboost, TickOutcome::Skipped(_)));
    ensure!(matches!(redeem, TickOutcome::Completed(summary) if summary.is_idle()));
    ensure!(harness.ledger.submitted().is_empty());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn empty_receiver_never_reaches_the_store(
    executing: eyre::Result<TestEngine>,
) -> eyre::Result<()> {
    let harness = executing?;

    let result = harness
        .engine
        .create_unboost_task("5", "   ", TaskMetadata::new())
        .await;

    ensure!(matches!(
        result,
        Err(EngineError::Tasks(TaskLifecycleError::Domain(_)))
    ));
    ensure!(harness.engine.list_active_tasks().await?.is_empty());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unknown_task_lookup_is_none(executing: eyre::Result<TestEngine>) -> eyre::Result<()> {
    let harness = executing?;
    let missing = TaskId::from_string("unboost_0_1_deadbeef");

    ensure!(harness.engine.get_task(&missing).await?.is_none());
    ensure!(harness.engine.get_events(&missing).await?.is_empty());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn history_pages_report_real_totals(executing: eyre::Result<TestEngine>) -> eyre::Result<()> {
    let harness = executing?;
    harness.ledger.seed_boost(Amount::from_whole(3));
    for receiver in ["0xa", "0xb", "0xc"] {
        harness
            .engine
            .create_unboost_task("1", receiver, TaskMetadata::new())
            .await?;
        harness.clock.advance(chrono::Duration::seconds(1));
    }
    harness.engine.run_worker_once("unboost").await?;
    harness.ledger.advance_blocks(DROP_DELAY);
    harness.engine.run_worker_once("unboost").await?;
    harness.engine.run_worker_once("redeem").await?;

    let page = harness
        .engine
        .list_history(HistoryRequest {
            task_type: Some(TaskType::Unboost),
            page: 2,
            limit: 2,
            ..HistoryRequest::default()
        })
        .await?;
    let invalid = harness
        .engine
        .list_history(HistoryRequest {
            page: 0,
            ..HistoryRequest::default()
        })
        .await;

    ensure!(page.total == 3);
    ensure!(page.pages == 2);
    ensure!(page.records.len() == 1);
    ensure!(matches!(
        invalid,
        Err(EngineError::Tasks(TaskLifecycleError::InvalidPaging { .. }))
    ));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn status_snapshot_reflects_the_ledger(
    executing: eyre::Result<TestEngine>,
) -> eyre::Result<()> {
    let harness = executing?;
    harness.ledger.deposit(Amount::from_whole(7));

    let snapshot = harness.engine.get_status_snapshot().await?;

    ensure!(snapshot.balances.free == Amount::from_whole(7));
    ensure!(snapshot.block_number == harness.ledger.block());
    ensure!(snapshot.mode == ExecutionMode::Execution);
    Ok(())
}
