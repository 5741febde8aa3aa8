//! Completion, archival atomicity and statistics on `SQLite`.

use std::sync::Arc;

use chrono::Duration;
use eyre::{ensure, eyre};
use mockable::Clock;
use rstest::rstest;
use stakeflow::task::{
    adapters::sqlite::SqliteTaskStore,
    domain::{Amount, EventType, HistoryQuery, TaskStatus, TaskType},
    ports::{TaskFilter, TaskStore},
};

use super::helpers::{StoreHarness, database_file, fixed_clock, sqlite_harness};

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn completion_moves_the_task_exactly_once(
    sqlite_harness: eyre::Result<StoreHarness>,
) -> eyre::Result<()> {
    let harness = sqlite_harness?;
    let task = harness.create(TaskType::Unboost, "100").await?;
    harness.activate(&task).await?;
    harness.clock.advance(Duration::minutes(5));

    let first = harness.store.complete(task.id(), TaskStatus::Completed).await?;
    let second = harness.store.complete(task.id(), TaskStatus::Completed).await?;

    let record = first.ok_or_else(|| eyre!("first completion should archive"))?;
    ensure!(second.is_none());
    ensure!(record.final_status() == TaskStatus::Completed);
    ensure!(record.completed_at() == task.created_at() + Duration::minutes(5));
    ensure!(harness.store.get(task.id()).await?.is_none());
    let archived = harness
        .store
        .history_record(task.id())
        .await?
        .ok_or_else(|| eyre!("history row missing"))?;
    ensure!(archived == record);
    ensure!(archived.task().activate_tx_ref().is_some());

    let statistics = harness.store.statistics(None, None).await?;
    ensure!(statistics.len() == 1);
    ensure!(
        statistics
            .first()
            .is_some_and(|row| row.total_unboosted == Amount::from_whole(100))
    );
    let completions = harness
        .store
        .events(task.id())
        .await?
        .iter()
        .filter(|event| event.event_type() == EventType::TaskCompleted)
        .count();
    ensure!(completions == 1);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failed_and_canceled_tasks_are_not_counted(
    sqlite_harness: eyre::Result<StoreHarness>,
) -> eyre::Result<()> {
    let harness = sqlite_harness?;
    let failed = harness.create(TaskType::Unboost, "9").await?;
    let canceled = harness.create(TaskType::Boost, "4").await?;

    harness.store.complete(failed.id(), TaskStatus::Failed).await?;
    harness.store.complete(canceled.id(), TaskStatus::Canceled).await?;

    ensure!(harness.store.statistics(None, None).await?.is_empty());
    ensure!(harness.store.list_pending(TaskFilter::all()).await?.is_empty());
    ensure!(harness.store.count_history(HistoryQuery::default()).await? == 2);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn statistics_accumulate_per_completion_date(
    sqlite_harness: eyre::Result<StoreHarness>,
) -> eyre::Result<()> {
    let harness = sqlite_harness?;
    let boost = harness.create(TaskType::Boost, "5").await?;
    let unboost = harness.create(TaskType::Unboost, "3").await?;
    harness.activate(&boost).await?;
    harness.activate(&unboost).await?;
    harness.store.complete(boost.id(), TaskStatus::Completed).await?;
    harness.store.complete(unboost.id(), TaskStatus::Completed).await?;

    harness.clock.advance(Duration::days(1));
    let next_day = harness.create(TaskType::Unboost, "2").await?;
    harness.activate(&next_day).await?;
    harness.store.complete(next_day.id(), TaskStatus::Completed).await?;

    let all = harness.store.statistics(None, None).await?;
    let today = harness.clock.utc().date_naive();
    let latest = harness.store.statistics(Some(today), Some(today)).await?;

    ensure!(all.len() == 2);
    let first_day = all
        .iter()
        .find(|row| row.total_boosted == Amount::from_whole(5))
        .ok_or_else(|| eyre!("first day row missing"))?;
    ensure!(first_day.total_unboosted == Amount::from_whole(3));
    ensure!(latest.len() == 1);
    ensure!(
        latest
            .first()
            .is_some_and(|row| row.total_unboosted == Amount::from_whole(2))
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn history_is_newest_first_and_filtered(
    sqlite_harness: eyre::Result<StoreHarness>,
) -> eyre::Result<()> {
    let harness = sqlite_harness?;
    let mut ids = Vec::new();
    for amount in ["1", "2", "3"] {
        let task = harness.create(TaskType::Unboost, amount).await?;
        harness.store.complete(task.id(), TaskStatus::Canceled).await?;
        ids.push(task.id().clone());
        harness.clock.advance(Duration::seconds(1));
    }
    let boost = harness.create(TaskType::Boost, "4").await?;
    harness.store.complete(boost.id(), TaskStatus::Canceled).await?;

    let query = HistoryQuery {
        task_type: Some(TaskType::Unboost),
        offset: 0,
        limit: Some(2),
        ..HistoryQuery::default()
    };
    let page = harness.store.list_history(query).await?;
    let total = harness.store.count_history(query).await?;

    ensure!(total == 3);
    let listed: Vec<_> = page.iter().map(|record| record.task().id().clone()).collect();
    let expected: Vec<_> = ids.iter().rev().take(2).cloned().collect();
    ensure!(listed == expected);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn reopened_database_keeps_in_flight_tasks() -> eyre::Result<()> {
    let (_dir, path) = database_file()?;
    let clock = fixed_clock()?;
    let task = {
        let store = SqliteTaskStore::connect(path.as_str(), Arc::new(clock.clone()))?;
        let harness = StoreHarness {
            clock: clock.clone(),
            store,
        };
        let created = harness.create(TaskType::Unboost, "11").await?;
        harness.activate(&created).await?;
        created
    };

    let reopened = SqliteTaskStore::connect(path.as_str(), Arc::new(clock))?;
    let restored = reopened
        .get(task.id())
        .await?
        .ok_or_else(|| eyre!("task lost across reopen"))?;

    ensure!(restored.status() == TaskStatus::Active);
    ensure!(restored.activate_tx_ref().is_some());
    ensure!(reopened.events(task.id()).await?.len() == 1);
    Ok(())
}
