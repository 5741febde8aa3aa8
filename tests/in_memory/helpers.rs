//! Shared fixtures for in-memory engine tests.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use eyre::eyre;
use rstest::fixture;
use stakeflow::{
    clock::ManualClock,
    config::{EngineConfig, ExecutionMode},
    engine::Engine,
    ledger::adapters::memory::{InMemoryLedger, LedgerSettings},
    task::{
        adapters::memory::InMemoryTaskStore,
        domain::{EventType, TaskEvent, TaskId, TaskStatus},
        services::TaskLookup,
    },
};

/// Blocks between queueing a drop and executing it.
pub const DROP_DELAY: u64 = 30;

/// A wired engine with handles on its simulated collaborators.
pub struct TestEngine {
    pub clock: ManualClock,
    pub ledger: InMemoryLedger,
    pub engine: Engine,
}

impl TestEngine {
    /// Builds an engine over fresh in-memory collaborators.
    ///
    /// # Errors
    ///
    /// Returns an error when wiring fails.
    pub fn build(config: EngineConfig) -> eyre::Result<Self> {
        let start = Utc
            .with_ymd_and_hms(2026, 8, 20, 14, 0, 0)
            .single()
            .ok_or_else(|| eyre!("invalid start time"))?;
        let clock = ManualClock::new(start);
        let ledger = InMemoryLedger::new(LedgerSettings {
            start_block: 1_000,
            activation_delay: 15,
            drop_delay: DROP_DELAY,
            ..LedgerSettings::default()
        });
        let store = InMemoryTaskStore::new(Arc::new(clock.clone()));
        let engine = Engine::new(
            config,
            Arc::new(store),
            Arc::new(ledger.clone()),
            Arc::new(clock.clone()),
        )?;
        Ok(Self {
            clock,
            ledger,
            engine,
        })
    }

    /// Current status of a task, wherever it lives.
    ///
    /// # Errors
    ///
    /// Returns an error when the task is unknown or the lookup fails.
    pub async fn status(&self, task_id: &TaskId) -> eyre::Result<TaskStatus> {
        let lookup = self
            .engine
            .get_task(task_id)
            .await?
            .ok_or_else(|| eyre!("task {task_id} not found"))?;
        Ok(lookup.task().status())
    }

    /// Whether the task has moved to the archive.
    ///
    /// # Errors
    ///
    /// Returns an error when the lookup fails.
    pub async fn is_archived(&self, task_id: &TaskId) -> eyre::Result<bool> {
        Ok(matches!(
            self.engine.get_task(task_id).await?,
            Some(TaskLookup::Archived { .. })
        ))
    }

    /// Events of one type logged for a task.
    ///
    /// # Errors
    ///
    /// Returns an error when the read fails.
    pub async fn events_of(
        &self,
        task_id: &TaskId,
        event_type: EventType,
    ) -> eyre::Result<Vec<TaskEvent>> {
        Ok(self
            .engine
            .get_events(task_id)
            .await?
            .into_iter()
            .filter(|event| event.event_type() == event_type)
            .collect())
    }
}

/// Configuration that submits operations.
#[must_use]
pub fn execution_config() -> EngineConfig {
    EngineConfig {
        account: "0xstaker".to_owned(),
        mode: ExecutionMode::Execution,
        signer_configured: true,
        ..EngineConfig::default()
    }
}

#[fixture]
pub fn executing() -> eyre::Result<TestEngine> {
    TestEngine::build(execution_config())
}
