//! Behavioural tests for the in-memory task store.

use std::sync::Arc;

use crate::clock::ManualClock;
use crate::task::{
    adapters::memory::InMemoryTaskStore,
    domain::{
        Amount, EventType, HistoryQuery, NewTask, Task, TaskMetadata, TaskPatch, TaskStatus,
        TaskType, TxRef,
    },
    ports::{TaskFilter, TaskStore, TaskStoreError},
};
use chrono::{Duration, TimeZone, Utc};
use eyre::{ensure, eyre};
use rstest::{fixture, rstest};
use serde_json::json;

#[fixture]
fn clock() -> ManualClock {
    let start = Utc
        .with_ymd_and_hms(2026, 3, 1, 12, 0, 0)
        .single()
        .unwrap_or_else(Utc::now);
    ManualClock::new(start)
}

fn store_with(clock: &ManualClock) -> InMemoryTaskStore {
    InMemoryTaskStore::new(Arc::new(clock.clone()))
}

async fn create(store: &InMemoryTaskStore, task_type: TaskType, amount: &str) -> eyre::Result<Task> {
    let new_task = NewTask::parse(task_type, amount, "0xreceiver", TaskMetadata::new())?;
    Ok(store.create(new_task).await?)
}

async fn activate(store: &InMemoryTaskStore, task: &Task) -> eyre::Result<()> {
    store
        .update(task.id(), TaskPatch::queued(TxRef::new("0xq")))
        .await?;
    store
        .update(task.id(), TaskPatch::status(TaskStatus::WaitingForActivation))
        .await?;
    store
        .update(task.id(), TaskPatch::activated(TxRef::new("0xa")))
        .await?;
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn create_logs_task_created_event(clock: ManualClock) -> eyre::Result<()> {
    let store = store_with(&clock);
    let task = create(&store, TaskType::Unboost, "100").await?;

    let events = store.events(task.id()).await?;

    ensure!(events.len() == 1);
    let created = events.first().ok_or_else(|| eyre!("missing event"))?;
    ensure!(created.event_type() == EventType::TaskCreated);
    ensure!(created.details().get("amount") == Some(&json!("100")));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn list_pending_is_fifo_and_filtered(clock: ManualClock) -> eyre::Result<()> {
    let store = store_with(&clock);
    let first = create(&store, TaskType::Unboost, "1").await?;
    clock.advance(Duration::seconds(1));
    let boost = create(&store, TaskType::Boost, "2").await?;
    let second = create(&store, TaskType::Unboost, "3").await?;

    let unboosts = store
        .list_pending(TaskFilter::of(TaskType::Unboost, TaskStatus::Pending))
        .await?;
    let everything = store.list_pending(TaskFilter::all()).await?;

    let unboost_ids: Vec<_> = unboosts.iter().map(|task| task.id().clone()).collect();
    ensure!(unboost_ids == vec![first.id().clone(), second.id().clone()]);
    ensure!(everything.len() == 3);
    ensure!(everything.iter().any(|task| task.id() == boost.id()));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn update_unknown_task_returns_false(clock: ManualClock) -> eyre::Result<()> {
    let store = store_with(&clock);
    let task = create(&store, TaskType::Unboost, "5").await?;
    store.complete(task.id(), TaskStatus::Canceled).await?;

    let updated = store
        .update(task.id(), TaskPatch::status(TaskStatus::Queued))
        .await?;

    ensure!(!updated);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn update_bumps_updated_at(clock: ManualClock) -> eyre::Result<()> {
    let store = store_with(&clock);
    let task = create(&store, TaskType::Unboost, "5").await?;
    clock.advance(Duration::seconds(30));

    store
        .update(task.id(), TaskPatch::queued(TxRef::new("0xq")))
        .await?;
    let stored = store
        .get(task.id())
        .await?
        .ok_or_else(|| eyre!("task missing"))?;

    ensure!(stored.updated_at() == task.created_at() + Duration::seconds(30));
    ensure!(stored.created_at() == task.created_at());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn update_rejects_illegal_transition(clock: ManualClock) -> eyre::Result<()> {
    let store = store_with(&clock);
    let task = create(&store, TaskType::Unboost, "5").await?;

    let result = store
        .update(task.id(), TaskPatch::status(TaskStatus::Active))
        .await;

    ensure!(matches!(result, Err(TaskStoreError::Domain(_))));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn complete_archives_counts_and_is_idempotent(clock: ManualClock) -> eyre::Result<()> {
    let store = store_with(&clock);
    let task = create(&store, TaskType::Unboost, "100").await?;
    activate(&store, &task).await?;

    let first = store.complete(task.id(), TaskStatus::Completed).await?;
    let second = store.complete(task.id(), TaskStatus::Completed).await?;

    ensure!(first.is_some());
    ensure!(second.is_none());
    ensure!(store.get(task.id()).await?.is_none());
    ensure!(store.history_record(task.id()).await?.is_some());
    let stats = store.statistics(None, None).await?;
    ensure!(stats.len() == 1);
    let day = stats.first().ok_or_else(|| eyre!("missing statistics row"))?;
    ensure!(day.total_unboosted == Amount::from_whole(100));
    let completions = store
        .events(task.id())
        .await?
        .into_iter()
        .filter(|event| event.event_type() == EventType::TaskCompleted)
        .count();
    ensure!(completions == 1);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn statistics_share_one_row_per_day(clock: ManualClock) -> eyre::Result<()> {
    let store = store_with(&clock);
    let boost = create(&store, TaskType::Boost, "5").await?;
    let unboost = create(&store, TaskType::Unboost, "3").await?;
    activate(&store, &boost).await?;
    activate(&store, &unboost).await?;

    store.complete(boost.id(), TaskStatus::Completed).await?;
    store.complete(unboost.id(), TaskStatus::Completed).await?;

    let stats = store.statistics(None, None).await?;
    ensure!(stats.len() == 1);
    let day = stats.first().ok_or_else(|| eyre!("missing statistics row"))?;
    ensure!(day.total_boosted == Amount::from_whole(5));
    ensure!(day.total_unboosted == Amount::from_whole(3));
    ensure!(day.total_redeemed == Amount::ZERO);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failed_completion_is_archived_but_not_counted(clock: ManualClock) -> eyre::Result<()> {
    let store = store_with(&clock);
    let task = create(&store, TaskType::Unboost, "9").await?;

    let record = store
        .complete(task.id(), TaskStatus::Failed)
        .await?
        .ok_or_else(|| eyre!("task should archive"))?;

    ensure!(record.final_status() == TaskStatus::Failed);
    ensure!(store.statistics(None, None).await?.is_empty());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn last_event_of_type_returns_newest(clock: ManualClock) -> eyre::Result<()> {
    let store = store_with(&clock);
    let task = create(&store, TaskType::Unboost, "1").await?;
    store
        .log_event(task.id(), EventType::DropBoostWaiting, json!({ "n": 1 }))
        .await;
    clock.advance(Duration::seconds(5));
    store
        .log_event(task.id(), EventType::DropBoostWaiting, json!({ "n": 2 }))
        .await;

    let last = store
        .last_event_of_type(task.id(), EventType::DropBoostWaiting)
        .await?
        .ok_or_else(|| eyre!("missing event"))?;
    let absent = store
        .last_event_of_type(task.id(), EventType::RedeemWaiting)
        .await?;

    ensure!(last.details() == &json!({ "n": 2 }));
    ensure!(absent.is_none());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn history_lists_newest_first_with_paging(clock: ManualClock) -> eyre::Result<()> {
    let store = store_with(&clock);
    let mut ids = Vec::new();
    for amount in ["1", "2", "3"] {
        let task = create(&store, TaskType::Unboost, amount).await?;
        store.complete(task.id(), TaskStatus::Canceled).await?;
        ids.push(task.id().clone());
        clock.advance(Duration::seconds(1));
    }
    let boost = create(&store, TaskType::Boost, "4").await?;
    store.complete(boost.id(), TaskStatus::Canceled).await?;

    let query = HistoryQuery {
        task_type: Some(TaskType::Unboost),
        offset: 1,
        limit: Some(1),
        ..HistoryQuery::default()
    };
    let page = store.list_history(query).await?;
    let total = store.count_history(query).await?;

    ensure!(total == 3);
    ensure!(page.len() == 1);
    let middle = page.first().ok_or_else(|| eyre!("missing record"))?;
    ensure!(Some(middle.task().id()) == ids.get(1));
    Ok(())
}
