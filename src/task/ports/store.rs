//! Store port for task persistence, events, archive and statistics.

use crate::task::domain::{
    DailyStatistic, EventType, HistoryQuery, HistoryRecord, NewTask, Task, TaskDomainError,
    TaskEvent, TaskId, TaskPatch, TaskStatus, TaskType,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Result type for task store operations.
pub type TaskStoreResult<T> = Result<T, TaskStoreError>;

/// Optional filters for [`TaskStore::list_pending`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskFilter {
    /// Restrict to one task type.
    pub task_type: Option<TaskType>,
    /// Restrict to one status.
    pub status: Option<TaskStatus>,
}

impl TaskFilter {
    /// Filter matching every in-flight task.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            task_type: None,
            status: None,
        }
    }

    /// Filter matching one type in one status.
    #[must_use]
    pub const fn of(task_type: TaskType, status: TaskStatus) -> Self {
        Self {
            task_type: Some(task_type),
            status: Some(status),
        }
    }

    /// Returns `true` when `task` passes the filter.
    #[must_use]
    pub fn matches(&self, task: &Task) -> bool {
        self.task_type.is_none_or(|kind| task.task_type() == kind)
            && self.status.is_none_or(|status| task.status() == status)
    }
}

/// Durable record of in-flight tasks, their events, the archive and the
/// daily statistics.
///
/// Implementations must keep a task in exactly one of the active table and
/// the archive, and must archive, count and log a completion as one unit.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Inserts a new pending task and its `TASK_CREATED` event.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::DuplicateTask`] when the generated
    /// identifier already exists.
    async fn create(&self, new_task: NewTask) -> TaskStoreResult<Task>;

    /// Applies a typed patch and bumps `updated_at`.
    ///
    /// Returns `false` when the task is not in the active table.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::Domain`] when the patch is rejected by the
    /// lifecycle rules.
    async fn update(&self, task_id: &TaskId, patch: TaskPatch) -> TaskStoreResult<bool>;

    /// Lists in-flight tasks oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::Persistence`] on storage failure.
    async fn list_pending(&self, filter: TaskFilter) -> TaskStoreResult<Vec<Task>>;

    /// Archives a task with a terminal status.
    ///
    /// Returns `None` when the task is no longer active, so repeated calls
    /// never double count.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::Domain`] when `final_status` is not a
    /// reachable terminal status.
    async fn complete(
        &self,
        task_id: &TaskId,
        final_status: TaskStatus,
    ) -> TaskStoreResult<Option<HistoryRecord>>;

    /// Appends an event to a task's log.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::Persistence`] on storage failure.
    async fn append_event(
        &self,
        task_id: &TaskId,
        event_type: EventType,
        details: Value,
    ) -> TaskStoreResult<TaskEvent>;

    /// Appends an event, logging and swallowing any failure.
    async fn log_event(&self, task_id: &TaskId, event_type: EventType, details: Value) {
        if let Err(err) = self.append_event(task_id, event_type, details).await {
            tracing::warn!(
                task_id = %task_id,
                event_type = %event_type,
                error = %err,
                "failed to append task event"
            );
        }
    }

    /// Returns the newest event of `event_type` for a task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::Persistence`] on storage failure.
    async fn last_event_of_type(
        &self,
        task_id: &TaskId,
        event_type: EventType,
    ) -> TaskStoreResult<Option<TaskEvent>>;

    /// Looks up an in-flight task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::Persistence`] on storage failure.
    async fn get(&self, task_id: &TaskId) -> TaskStoreResult<Option<Task>>;

    /// Looks up an archived task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::Persistence`] on storage failure.
    async fn history_record(&self, task_id: &TaskId) -> TaskStoreResult<Option<HistoryRecord>>;

    /// Returns a task's events oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::Persistence`] on storage failure.
    async fn events(&self, task_id: &TaskId) -> TaskStoreResult<Vec<TaskEvent>>;

    /// Lists archived tasks newest first, honouring the query's paging.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::Persistence`] on storage failure.
    async fn list_history(&self, query: HistoryQuery) -> TaskStoreResult<Vec<HistoryRecord>>;

    /// Counts archived tasks matching the query's filters, ignoring paging.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::Persistence`] on storage failure.
    async fn count_history(&self, query: HistoryQuery) -> TaskStoreResult<usize>;

    /// Returns daily statistics in the inclusive date range, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::Persistence`] on storage failure.
    async fn statistics(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> TaskStoreResult<Vec<DailyStatistic>>;
}

/// Errors returned by task store implementations.
#[derive(Debug, Clone, Error)]
pub enum TaskStoreError {
    /// A task with the same identifier already exists.
    #[error("duplicate task identifier: {0}")]
    DuplicateTask(TaskId),

    /// The lifecycle rules rejected a change.
    #[error(transparent)]
    Domain(#[from] TaskDomainError),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl TaskStoreError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
