//! Shared fixtures for `SQLite` store tests.

use std::sync::Arc;

use camino::Utf8PathBuf;
use chrono::{TimeZone, Utc};
use eyre::eyre;
use rstest::fixture;
use stakeflow::{
    clock::ManualClock,
    task::{
        adapters::sqlite::SqliteTaskStore,
        domain::{NewTask, Task, TaskMetadata, TaskPatch, TaskStatus, TaskType, TxRef},
        ports::TaskStore,
    },
};

/// A store on a private in-memory database with a controllable clock.
pub struct StoreHarness {
    pub clock: ManualClock,
    pub store: SqliteTaskStore,
}

impl StoreHarness {
    /// Creates and persists a task.
    ///
    /// # Errors
    ///
    /// Returns an error when validation or persistence fails.
    pub async fn create(&self, task_type: TaskType, amount: &str) -> eyre::Result<Task> {
        let new_task = NewTask::parse(task_type, amount, "0xreceiver", TaskMetadata::new())?;
        Ok(self.store.create(new_task).await?)
    }

    /// Walks a pending task to ACTIVE.
    ///
    /// # Errors
    ///
    /// Returns an error when an update fails.
    pub async fn activate(&self, task: &Task) -> eyre::Result<()> {
        let id = task.id();
        self.store
            .update(id, TaskPatch::queued(TxRef::new("0xqueue")))
            .await?;
        self.store
            .update(id, TaskPatch::status(TaskStatus::WaitingForActivation))
            .await?;
        self.store
            .update(id, TaskPatch::activated(TxRef::new("0xdrop")))
            .await?;
        Ok(())
    }
}

/// A clock frozen at a fixed instant.
///
/// # Errors
///
/// Returns an error if the fixed instant is invalid.
pub fn fixed_clock() -> eyre::Result<ManualClock> {
    let start = Utc
        .with_ymd_and_hms(2026, 9, 14, 10, 0, 0)
        .single()
        .ok_or_else(|| eyre!("invalid start time"))?;
    Ok(ManualClock::new(start))
}

/// A database file path inside a fresh temporary directory.
///
/// # Errors
///
/// Returns an error when the directory cannot be created or the path is
/// not UTF-8.
pub fn database_file() -> eyre::Result<(tempfile::TempDir, Utf8PathBuf)> {
    let dir = tempfile::tempdir()?;
    let path = Utf8PathBuf::from_path_buf(dir.path().join("stakeflow.db"))
        .map_err(|path| eyre!("non UTF-8 temp path {}", path.display()))?;
    Ok((dir, path))
}

#[fixture]
pub fn sqlite_harness() -> eyre::Result<StoreHarness> {
    let clock = fixed_clock()?;
    let store = SqliteTaskStore::connect(":memory:", Arc::new(clock.clone()))?;
    Ok(StoreHarness { clock, store })
}
