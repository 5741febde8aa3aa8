//! Archived terminal copies of tasks.

use super::{Task, TaskStatus, TaskType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A task that reached a terminal status, together with its archival time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    task: Task,
    completed_at: DateTime<Utc>,
}

impl HistoryRecord {
    /// Wraps an archived task.
    #[must_use]
    pub const fn new(task: Task, completed_at: DateTime<Utc>) -> Self {
        Self { task, completed_at }
    }

    /// Returns the archived task; its status is terminal.
    #[must_use]
    pub const fn task(&self) -> &Task {
        &self.task
    }

    /// Returns the terminal status.
    #[must_use]
    pub const fn final_status(&self) -> TaskStatus {
        self.task.status()
    }

    /// Returns when the task was archived.
    #[must_use]
    pub const fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }
}

/// Filter and paging for archive listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryQuery {
    /// Restrict to one task type.
    pub task_type: Option<TaskType>,
    /// Inclusive lower bound on task creation time.
    pub created_from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on task creation time.
    pub created_to: Option<DateTime<Utc>>,
    /// Number of newest-first records to skip.
    pub offset: usize,
    /// Maximum number of records; `None` returns everything.
    pub limit: Option<usize>,
}

impl HistoryQuery {
    /// Returns `true` when `record` passes the type and date filters.
    #[must_use]
    pub fn matches(&self, record: &HistoryRecord) -> bool {
        let task = record.task();
        self.task_type.is_none_or(|kind| task.task_type() == kind)
            && self
                .created_from
                .is_none_or(|from| task.created_at() >= from)
            && self.created_to.is_none_or(|to| task.created_at() <= to)
    }
}
