//! Tests for the transaction lock.

use std::sync::Arc;
use std::time::Duration;

use crate::clock::ManualClock;
use crate::txlock::{AcquireMode, DEFAULT_MAX_HOLD, TransactionLock};
use chrono::{TimeDelta, Utc};
use eyre::ensure;
use mockable::DefaultClock;
use rstest::{fixture, rstest};

struct Harness {
    clock: ManualClock,
    lock: Arc<TransactionLock>,
}

#[fixture]
fn harness() -> Harness {
    let clock = ManualClock::new(Utc::now());
    let lock = Arc::new(TransactionLock::new(
        "ledger",
        DEFAULT_MAX_HOLD,
        Arc::new(clock.clone()),
    ));
    Harness { clock, lock }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn acquire_then_release_frees_the_lock(harness: Harness) -> eyre::Result<()> {
    ensure!(harness.lock.acquire("unboost", AcquireMode::NonBlocking).await);
    ensure!(harness.lock.holder().as_deref() == Some("unboost"));

    harness.lock.release("unboost");

    ensure!(!harness.lock.is_locked());
    ensure!(harness.lock.acquire("redeem", AcquireMode::NonBlocking).await);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn non_blocking_contender_defers(harness: Harness) -> eyre::Result<()> {
    ensure!(harness.lock.acquire("unboost", AcquireMode::NonBlocking).await);

    ensure!(!harness.lock.acquire("redeem", AcquireMode::NonBlocking).await);
    ensure!(!harness.lock.acquire("unboost", AcquireMode::NonBlocking).await);
    ensure!(harness.lock.holder().as_deref() == Some("unboost"));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn release_by_other_owner_is_ignored(harness: Harness) -> eyre::Result<()> {
    harness.lock.release("nobody");
    ensure!(harness.lock.acquire("unboost", AcquireMode::NonBlocking).await);

    harness.lock.release("redeem");

    ensure!(harness.lock.holder().as_deref() == Some("unboost"));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn holder_is_forced_out_only_after_max_hold(harness: Harness) -> eyre::Result<()> {
    ensure!(harness.lock.acquire("stuck", AcquireMode::NonBlocking).await);

    harness.clock.advance(TimeDelta::seconds(300));
    ensure!(!harness.lock.acquire("redeem", AcquireMode::NonBlocking).await);
    ensure!(harness.lock.force_release_count() == 0);

    harness.clock.advance(TimeDelta::seconds(1));
    ensure!(harness.lock.acquire("redeem", AcquireMode::NonBlocking).await);
    ensure!(harness.lock.force_release_count() == 1);
    ensure!(harness.lock.holder().as_deref() == Some("redeem"));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn guard_releases_on_drop(harness: Harness) -> eyre::Result<()> {
    {
        let guard = harness.lock.lock("unboost", AcquireMode::NonBlocking).await;
        ensure!(guard.is_some_and(|held| held.owner() == "unboost"));
    }
    ensure!(!harness.lock.is_locked());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn stale_guard_does_not_release_new_holder(harness: Harness) -> eyre::Result<()> {
    let stale = harness
        .lock
        .lock("unboost", AcquireMode::NonBlocking)
        .await;
    ensure!(stale.is_some());
    harness.clock.advance(TimeDelta::seconds(301));
    ensure!(harness.lock.acquire("unboost", AcquireMode::NonBlocking).await);

    drop(stale);

    ensure!(harness.lock.holder().as_deref() == Some("unboost"));
    ensure!(harness.lock.force_release_count() == 1);
    Ok(())
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn waiter_acquires_once_released(harness: Harness) -> eyre::Result<()> {
    ensure!(harness.lock.acquire("boost", AcquireMode::NonBlocking).await);
    let holder = Arc::clone(&harness.lock);
    let releaser = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        holder.release("boost");
    });

    let acquired = harness
        .lock
        .acquire("redeem", AcquireMode::Wait(Duration::from_secs(5)))
        .await;

    releaser.await?;
    ensure!(acquired);
    ensure!(harness.lock.holder().as_deref() == Some("redeem"));
    Ok(())
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn waiter_gives_up_at_timeout(harness: Harness) -> eyre::Result<()> {
    ensure!(harness.lock.acquire("boost", AcquireMode::NonBlocking).await);

    let acquired = harness
        .lock
        .acquire("redeem", AcquireMode::Wait(Duration::from_millis(100)))
        .await;

    ensure!(!acquired);
    ensure!(harness.lock.holder().as_deref() == Some("boost"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn waiter_wakes_when_holder_expires() -> eyre::Result<()> {
    let lock = TransactionLock::new(
        "ledger",
        Duration::from_millis(50),
        Arc::new(DefaultClock),
    );
    ensure!(lock.acquire("stuck", AcquireMode::NonBlocking).await);

    let acquired = tokio::time::timeout(
        Duration::from_secs(5),
        lock.acquire("redeem", AcquireMode::WaitForever),
    )
    .await?;

    ensure!(acquired);
    ensure!(lock.force_release_count() == 1);
    Ok(())
}
