//! Tests for engine wiring and the caller facade.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use eyre::{bail, ensure};
use rstest::{fixture, rstest};

use super::{Engine, EngineError};
use crate::clock::ManualClock;
use crate::config::{EngineConfig, ExecutionMode};
use crate::ledger::adapters::memory::InMemoryLedger;
use crate::pipeline::TickOutcome;
use crate::task::{
    adapters::memory::InMemoryTaskStore,
    domain::{Amount, Receiver, TaskMetadata, TaskStatus},
    services::{TaskLifecycleError, TaskLookup},
};
use crate::txlock::AcquireMode;

struct Parts {
    clock: ManualClock,
    ledger: InMemoryLedger,
}

#[fixture]
fn parts() -> Parts {
    let start = Utc
        .with_ymd_and_hms(2026, 7, 1, 0, 0, 0)
        .single()
        .unwrap_or_else(Utc::now);
    Parts {
        clock: ManualClock::new(start),
        ledger: InMemoryLedger::default(),
    }
}

fn execution_config() -> EngineConfig {
    EngineConfig {
        account: "0xaccount".to_owned(),
        mode: ExecutionMode::Execution,
        signer_configured: true,
        ..EngineConfig::default()
    }
}

fn engine(parts: &Parts, config: EngineConfig) -> Result<Engine, EngineError> {
    let store = InMemoryTaskStore::new(Arc::new(parts.clock.clone()));
    Engine::new(
        config,
        Arc::new(store),
        Arc::new(parts.ledger.clone()),
        Arc::new(parts.clock.clone()),
    )
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn observation_mode_refuses_new_tasks(parts: Parts) -> eyre::Result<()> {
    let engine = engine(&parts, EngineConfig::default())?;

    let result = engine
        .create_unboost_task("10", "0xreceiver", TaskMetadata::new())
        .await;

    ensure!(engine.mode() == ExecutionMode::Observation);
    ensure!(matches!(result, Err(EngineError::ObservationMode)));
    ensure!(engine.list_active_tasks().await?.is_empty());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn missing_signer_forces_observation(parts: Parts) -> eyre::Result<()> {
    let config = EngineConfig {
        signer_configured: false,
        ..execution_config()
    };
    let engine = engine(&parts, config)?;

    let snapshot = engine.get_status_snapshot().await?;

    ensure!(engine.mode() == ExecutionMode::Observation);
    ensure!(snapshot.mode == ExecutionMode::Observation);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn created_task_is_visible_through_the_facade(parts: Parts) -> eyre::Result<()> {
    let engine = engine(&parts, execution_config())?;

    let task = engine
        .create_unboost_task("12.5", "0xreceiver", TaskMetadata::new().with("origin", "api"))
        .await?;
    let lookup = engine.get_task(task.id()).await?;
    let events = engine.get_events(task.id()).await?;

    ensure!(task.status() == TaskStatus::Pending);
    ensure!(task.amount() == "12.5".parse::<Amount>()?);
    ensure!(lookup == Some(TaskLookup::Active { task: task.clone() }));
    ensure!(events.len() == 1);
    Ok(())
}

#[rstest]
#[case("0")]
#[case("twelve")]
#[tokio::test(flavor = "multi_thread")]
async fn invalid_amount_is_a_validation_error(
    parts: Parts,
    #[case] amount: &str,
) -> eyre::Result<()> {
    let engine = engine(&parts, execution_config())?;

    let result = engine
        .create_unboost_task(amount, "0xreceiver", TaskMetadata::new())
        .await;

    ensure!(matches!(
        result,
        Err(EngineError::Tasks(TaskLifecycleError::Domain(_)))
    ));
    Ok(())
}

#[rstest]
fn invalid_config_is_rejected_at_wiring(parts: Parts) {
    let mut config = execution_config();
    config.transactions.lock_max_hold_secs = 0;

    let result = engine(&parts, config);

    assert!(matches!(result, Err(EngineError::Config(_))));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn manual_pass_runs_the_named_driver(parts: Parts) -> eyre::Result<()> {
    parts.ledger.seed_boost(Amount::from_whole(50));
    let engine = engine(&parts, execution_config())?;
    let task = engine
        .create_unboost_task("20", "0xreceiver", TaskMetadata::new())
        .await?;

    let outcome = engine.run_worker_once("unboost").await?;
    let unknown = engine.run_worker_once("rebalance").await;

    ensure!(matches!(outcome, TickOutcome::Completed(summary) if summary.advanced == 1));
    let lookup = engine.get_task(task.id()).await?;
    ensure!(lookup.is_some_and(|found| found.task().status() == TaskStatus::Queued));
    ensure!(matches!(unknown, Err(EngineError::UnknownWorker(name)) if name == "rebalance"));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn boost_driver_needs_an_account(parts: Parts) -> eyre::Result<()> {
    let config = EngineConfig {
        account: String::new(),
        ..execution_config()
    };
    let engine = engine(&parts, config)?;

    let result = engine.run_worker_once("boost").await;

    ensure!(matches!(result, Err(EngineError::UnknownWorker(_))));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn scheduler_lifecycle_through_the_facade(parts: Parts) -> eyre::Result<()> {
    let engine = engine(&parts, execution_config())?;
    ensure!(matches!(engine.toggle_worker("redeem"), Err(EngineError::NotRunning)));

    let _reports = engine.start()?;
    ensure!(engine.is_running());
    ensure!(matches!(engine.start(), Err(EngineError::AlreadyRunning)));
    ensure!(!engine.toggle_worker("redeem")?);
    ensure!(engine.toggle_worker("boost")?);
    match engine.toggle_worker("rebalance") {
        Err(EngineError::UnknownWorker(name)) => ensure!(name == "rebalance"),
        other => bail!("expected an unknown worker error, got {other:?}"),
    }

    let summary = engine.shutdown().await?;

    ensure!(summary.stopped + summary.aborted == 4);
    ensure!(!engine.is_running());
    ensure!(matches!(engine.shutdown().await, Err(EngineError::NotRunning)));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn claim_pays_earned_rewards_to_the_account(parts: Parts) -> eyre::Result<()> {
    let engine = engine(&parts, execution_config())?;
    parts.ledger.accrue_rewards(Amount::from_whole(7));
    ensure!(engine.get_earned_rewards().await? == Amount::from_whole(7));

    let tx_ref = engine.claim_rewards(None).await?;

    ensure!(tx_ref.as_str().starts_with("0x"));
    ensure!(engine.get_earned_rewards().await? == Amount::ZERO);
    ensure!(
        parts.ledger.reward_payouts() == vec![(Receiver::new("0xaccount")?, Amount::from_whole(7))]
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn claim_honours_an_explicit_recipient(parts: Parts) -> eyre::Result<()> {
    let engine = engine(
        &parts,
        EngineConfig {
            account: String::new(),
            ..execution_config()
        },
    )?;

    let missing = engine.claim_rewards(None).await;
    ensure!(matches!(missing, Err(EngineError::NoAccount)));

    engine.claim_rewards(Some("0xtreasury")).await?;
    let payouts = parts.ledger.reward_payouts();
    ensure!(payouts.len() == 1);
    ensure!(payouts.first().map(|(to, _)| to.as_str()) == Some("0xtreasury"));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn claim_is_refused_in_observation_mode(parts: Parts) -> eyre::Result<()> {
    let engine = engine(
        &parts,
        EngineConfig {
            account: "0xaccount".to_owned(),
            ..EngineConfig::default()
        },
    )?;

    let result = engine.claim_rewards(None).await;

    ensure!(matches!(result, Err(EngineError::ObservationMode)));
    ensure!(parts.ledger.reward_payouts().is_empty());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn claim_waits_its_turn_for_the_transaction_lock(parts: Parts) -> eyre::Result<()> {
    let engine = engine(&parts, execution_config())?;
    ensure!(
        engine
            .transaction_lock()
            .acquire("redeem", AcquireMode::NonBlocking)
            .await
    );

    let busy = engine.claim_rewards(None).await;
    ensure!(matches!(busy, Err(EngineError::LockBusy)));
    ensure!(parts.ledger.reward_payouts().is_empty());

    engine.transaction_lock().release("redeem");
    parts.ledger.refuse_next(1);
    let refused = engine.claim_rewards(None).await;
    ensure!(matches!(refused, Err(EngineError::RewardClaim(_))));
    Ok(())
}
