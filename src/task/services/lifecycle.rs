//! Service layer for task creation and caller-facing reads.

use crate::task::{
    domain::{
        Amount, DailyStatistic, HistoryQuery, HistoryRecord, NewTask, Task, TaskDomainError,
        TaskEvent, TaskId, TaskMetadata, TaskType,
    },
    ports::{TaskFilter, TaskStore, TaskStoreError},
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

/// Default number of archived tasks per page.
pub const DEFAULT_PAGE_LIMIT: usize = 10;

/// Request for creating a task from raw caller input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTaskRequest {
    task_type: TaskType,
    amount: String,
    receiver: String,
    metadata: TaskMetadata,
}

impl CreateTaskRequest {
    /// Creates a request with required fields.
    #[must_use]
    pub fn new(task_type: TaskType, amount: impl Into<String>, receiver: impl Into<String>) -> Self {
        Self {
            task_type,
            amount: amount.into(),
            receiver: receiver.into(),
            metadata: TaskMetadata::new(),
        }
    }

    /// Sets creation metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: TaskMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Filter and paging for archive listings as callers express them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryRequest {
    /// Restrict to one task type.
    pub task_type: Option<TaskType>,
    /// Inclusive lower bound on creation time.
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on creation time.
    pub to: Option<DateTime<Utc>>,
    /// One-based page number.
    pub page: usize,
    /// Records per page.
    pub limit: usize,
}

impl Default for HistoryRequest {
    fn default() -> Self {
        Self {
            task_type: None,
            from: None,
            to: None,
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

/// One page of archived tasks with real totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryPage {
    /// Records on this page, newest first.
    pub records: Vec<HistoryRecord>,
    /// Matching records across all pages.
    pub total: usize,
    /// One-based page number.
    pub page: usize,
    /// Records per page.
    pub limit: usize,
    /// Number of pages.
    pub pages: usize,
}

/// Sums across the returned statistic rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatisticsSummary {
    /// Boosted total.
    pub total_boosted: Amount,
    /// Unboosted total.
    pub total_unboosted: Amount,
    /// Redeemed total.
    pub total_redeemed: Amount,
}

/// Daily statistic rows and their summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatisticsReport {
    /// Rows, newest date first.
    pub statistics: Vec<DailyStatistic>,
    /// Sums across `statistics`.
    pub summary: StatisticsSummary,
}

/// Where a looked-up task currently lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "location", rename_all = "snake_case")]
pub enum TaskLookup {
    /// The task is still in flight.
    Active {
        /// The live task.
        task: Task,
    },
    /// The task has been archived.
    Archived {
        /// The archived copy.
        record: HistoryRecord,
    },
}

impl TaskLookup {
    /// Returns the task regardless of location.
    #[must_use]
    pub const fn task(&self) -> &Task {
        match self {
            Self::Active { task } => task,
            Self::Archived { record } => record.task(),
        }
    }
}

/// Service-level errors for task operations.
#[derive(Debug, Error)]
pub enum TaskLifecycleError {
    /// Domain validation failed.
    #[error(transparent)]
    Domain(#[from] TaskDomainError),

    /// Store operation failed.
    #[error(transparent)]
    Store(#[from] TaskStoreError),

    /// Page numbers start at one and limits must be positive.
    #[error("invalid paging: page {page}, limit {limit}")]
    InvalidPaging {
        /// Requested page.
        page: usize,
        /// Requested limit.
        limit: usize,
    },
}

/// Result type for task lifecycle service operations.
pub type TaskLifecycleResult<T> = Result<T, TaskLifecycleError>;

/// Task creation and read service.
#[derive(Clone)]
pub struct TaskLifecycleService {
    store: Arc<dyn TaskStore>,
}

impl TaskLifecycleService {
    /// Creates a new task lifecycle service.
    #[must_use]
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    /// Validates input and creates a pending task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::Domain`] for invalid input or a task
    /// type no pipeline drives, neither of which reaches the store, or
    /// [`TaskLifecycleError::Store`] when persistence fails.
    pub async fn create(&self, request: CreateTaskRequest) -> TaskLifecycleResult<Task> {
        if !request.task_type.has_driver() {
            return Err(TaskDomainError::UndrivenTaskType(request.task_type).into());
        }
        let new_task = NewTask::parse(
            request.task_type,
            &request.amount,
            &request.receiver,
            request.metadata,
        )?;
        let task = self.store.create(new_task).await?;
        tracing::info!(
            task_id = %task.id(),
            task_type = %task.task_type(),
            amount = %task.amount(),
            "task created"
        );
        Ok(task)
    }

    /// Finds a task in the active table or the archive.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::Store`] when a lookup fails.
    pub async fn lookup(&self, task_id: &TaskId) -> TaskLifecycleResult<Option<TaskLookup>> {
        if let Some(task) = self.store.get(task_id).await? {
            return Ok(Some(TaskLookup::Active { task }));
        }
        Ok(self
            .store
            .history_record(task_id)
            .await?
            .map(|record| TaskLookup::Archived { record }))
    }

    /// Returns a task's events oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::Store`] when the read fails.
    pub async fn events(&self, task_id: &TaskId) -> TaskLifecycleResult<Vec<TaskEvent>> {
        Ok(self.store.events(task_id).await?)
    }

    /// Lists every in-flight task oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::Store`] when the read fails.
    pub async fn active(&self) -> TaskLifecycleResult<Vec<Task>> {
        Ok(self.store.list_pending(TaskFilter::all()).await?)
    }

    /// Returns one page of archived tasks.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::InvalidPaging`] for a zero page or
    /// limit, or [`TaskLifecycleError::Store`] when a read fails.
    pub async fn history(&self, request: HistoryRequest) -> TaskLifecycleResult<HistoryPage> {
        let HistoryRequest {
            task_type,
            from,
            to,
            page,
            limit,
        } = request;
        if page == 0 || limit == 0 {
            return Err(TaskLifecycleError::InvalidPaging { page, limit });
        }
        let query = HistoryQuery {
            task_type,
            created_from: from,
            created_to: to,
            offset: (page - 1).saturating_mul(limit),
            limit: Some(limit),
        };
        let records = self.store.list_history(query).await?;
        let total = self.store.count_history(query).await?;
        Ok(HistoryPage {
            records,
            total,
            page,
            limit,
            pages: total.div_ceil(limit),
        })
    }

    /// Returns daily statistics in the inclusive range with their sums.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::Store`] when the read fails.
    pub async fn statistics(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> TaskLifecycleResult<StatisticsReport> {
        let statistics = self.store.statistics(from, to).await?;
        let summary = StatisticsSummary {
            total_boosted: statistics.iter().map(|row| row.total_boosted).sum(),
            total_unboosted: statistics.iter().map(|row| row.total_unboosted).sum(),
            total_redeemed: statistics.iter().map(|row| row.total_redeemed).sum(),
        };
        Ok(StatisticsReport {
            statistics,
            summary,
        })
    }
}

impl std::fmt::Debug for TaskLifecycleService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskLifecycleService").finish_non_exhaustive()
    }
}
