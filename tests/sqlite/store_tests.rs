//! Create, update, listing and event operations on `SQLite`.

use chrono::Duration;
use eyre::{ensure, eyre};
use rstest::rstest;
use serde_json::json;
use stakeflow::task::{
    domain::{EventType, TaskPatch, TaskStatus, TaskType, TxRef},
    ports::{TaskFilter, TaskStore, TaskStoreError},
};

use super::helpers::{StoreHarness, sqlite_harness};

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn created_task_round_trips(sqlite_harness: eyre::Result<StoreHarness>) -> eyre::Result<()> {
    let harness = sqlite_harness?;
    let created = harness.create(TaskType::Unboost, "1234.000000000000000001").await?;

    let fetched = harness
        .store
        .get(created.id())
        .await?
        .ok_or_else(|| eyre!("task missing"))?;
    let events = harness.store.events(created.id()).await?;

    ensure!(fetched == created);
    ensure!(fetched.amount().to_string() == "1234.000000000000000001");
    ensure!(fetched.status() == TaskStatus::Pending);
    ensure!(events.len() == 1);
    ensure!(
        events
            .first()
            .is_some_and(|event| event.event_type() == EventType::TaskCreated)
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn pending_listing_is_fifo_with_filters(
    sqlite_harness: eyre::Result<StoreHarness>,
) -> eyre::Result<()> {
    let harness = sqlite_harness?;
    let first = harness.create(TaskType::Unboost, "1").await?;
    harness.clock.advance(Duration::seconds(1));
    let boost = harness.create(TaskType::Boost, "2").await?;
    let second = harness.create(TaskType::Unboost, "3").await?;
    harness
        .store
        .update(second.id(), TaskPatch::queued(TxRef::new("0xq")))
        .await?;

    let unboosts = harness
        .store
        .list_pending(TaskFilter {
            task_type: Some(TaskType::Unboost),
            status: None,
        })
        .await?;
    let queued = harness
        .store
        .list_pending(TaskFilter::of(TaskType::Unboost, TaskStatus::Queued))
        .await?;
    let everything = harness.store.list_pending(TaskFilter::all()).await?;

    let ids: Vec<_> = unboosts.iter().map(|task| task.id().clone()).collect();
    ensure!(ids == vec![first.id().clone(), second.id().clone()]);
    ensure!(queued.len() == 1);
    ensure!(everything.len() == 3);
    ensure!(everything.iter().any(|task| task.id() == boost.id()));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn updates_persist_refs_and_timestamps(
    sqlite_harness: eyre::Result<StoreHarness>,
) -> eyre::Result<()> {
    let harness = sqlite_harness?;
    let task = harness.create(TaskType::Unboost, "5").await?;
    harness.clock.advance(Duration::minutes(2));

    let updated = harness
        .store
        .update(task.id(), TaskPatch::queued(TxRef::new("0xqueue")))
        .await?;
    let stored = harness
        .store
        .get(task.id())
        .await?
        .ok_or_else(|| eyre!("task missing"))?;

    ensure!(updated);
    ensure!(stored.status() == TaskStatus::Queued);
    ensure!(stored.queue_tx_ref() == Some(&TxRef::new("0xqueue")));
    ensure!(stored.updated_at() == task.created_at() + Duration::minutes(2));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn illegal_updates_are_rejected(sqlite_harness: eyre::Result<StoreHarness>) -> eyre::Result<()> {
    let harness = sqlite_harness?;
    let task = harness.create(TaskType::Unboost, "5").await?;

    let skipped = harness
        .store
        .update(task.id(), TaskPatch::activated(TxRef::new("0xdrop")))
        .await;
    let terminal = harness
        .store
        .update(task.id(), TaskPatch::status(TaskStatus::Completed))
        .await;

    ensure!(matches!(skipped, Err(TaskStoreError::Domain(_))));
    ensure!(matches!(terminal, Err(TaskStoreError::Domain(_))));
    let stored = harness
        .store
        .get(task.id())
        .await?
        .ok_or_else(|| eyre!("task missing"))?;
    ensure!(stored.status() == TaskStatus::Pending);
    ensure!(stored.activate_tx_ref().is_none());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn updating_an_unknown_task_returns_false(
    sqlite_harness: eyre::Result<StoreHarness>,
) -> eyre::Result<()> {
    let harness = sqlite_harness?;
    let task = harness.create(TaskType::Redeem, "5").await?;
    harness.store.complete(task.id(), TaskStatus::Canceled).await?;

    let updated = harness
        .store
        .update(task.id(), TaskPatch::status(TaskStatus::Queued))
        .await?;

    ensure!(!updated);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn events_keep_insertion_order_and_newest_lookup(
    sqlite_harness: eyre::Result<StoreHarness>,
) -> eyre::Result<()> {
    let harness = sqlite_harness?;
    let task = harness.create(TaskType::Unboost, "1").await?;
    for attempt in 1..=3 {
        harness
            .store
            .log_event(
                task.id(),
                EventType::QueueDropBoostFailed,
                json!({ "attempt": attempt }),
            )
            .await;
    }

    let events = harness.store.events(task.id()).await?;
    let last = harness
        .store
        .last_event_of_type(task.id(), EventType::QueueDropBoostFailed)
        .await?
        .ok_or_else(|| eyre!("missing event"))?;
    let absent = harness
        .store
        .last_event_of_type(task.id(), EventType::RedeemWaiting)
        .await?;

    let attempts: Vec<_> = events
        .iter()
        .filter_map(|event| event.details().get("attempt").cloned())
        .collect();
    ensure!(attempts == vec![json!(1), json!(2), json!(3)]);
    ensure!(last.details() == &json!({ "attempt": 3 }));
    ensure!(absent.is_none());
    Ok(())
}
