//! Engine flows persisted in a database file.

use std::sync::Arc;

use eyre::{ensure, eyre};
use rstest::rstest;
use stakeflow::{
    config::{EngineConfig, ExecutionMode},
    engine::Engine,
    ledger::adapters::memory::{InMemoryLedger, LedgerSettings},
    task::{
        adapters::sqlite::SqliteTaskStore,
        domain::{Amount, EventType, TaskMetadata, TaskStatus},
        services::TaskLookup,
    },
};

use super::helpers::{database_file, fixed_clock};

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unboost_survives_a_restart_between_ticks() -> eyre::Result<()> {
    let (_dir, path) = database_file()?;
    let clock = fixed_clock()?;
    let ledger = InMemoryLedger::new(LedgerSettings {
        drop_delay: 12,
        ..LedgerSettings::default()
    });
    ledger.seed_boost(Amount::from_whole(100));
    let config = EngineConfig {
        mode: ExecutionMode::Execution,
        signer_configured: true,
        database_url: path.to_string(),
        ..EngineConfig::default()
    };
    let open_engine = || -> eyre::Result<Engine> {
        let store = SqliteTaskStore::connect(&config.database_url, Arc::new(clock.clone()))?;
        Ok(Engine::new(
            config.clone(),
            Arc::new(store),
            Arc::new(ledger.clone()),
            Arc::new(clock.clone()),
        )?)
    };

    let task = {
        let engine = open_engine()?;
        let created = engine
            .create_unboost_task("100", "0xpayee", TaskMetadata::new())
            .await?;
        engine.run_worker_once("unboost").await?;
        created
    };
    ledger.advance_blocks(12);

    let engine = open_engine()?;
    engine.run_worker_once("unboost").await?;
    engine.run_worker_once("redeem").await?;

    let lookup = engine
        .get_task(task.id())
        .await?
        .ok_or_else(|| eyre!("task missing"))?;
    ensure!(matches!(lookup, TaskLookup::Archived { .. }));
    ensure!(lookup.task().status() == TaskStatus::Completed);
    let events = engine.get_events(task.id()).await?;
    let waiting = events
        .iter()
        .filter(|event| event.event_type() == EventType::DropBoostWaiting)
        .count();
    ensure!(waiting == 1);
    let statistics = engine.get_statistics(None, None).await?;
    ensure!(statistics.summary.total_unboosted == Amount::from_whole(100));
    Ok(())
}
