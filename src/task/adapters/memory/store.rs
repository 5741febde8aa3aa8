//! In-memory task store for tests and dry runs.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::clock::SharedClock;
use crate::task::{
    domain::{
        DailyStatistic, EventType, HistoryQuery, HistoryRecord, NewTask, Task, TaskEvent, TaskId,
        TaskPatch, TaskStatus,
    },
    ports::{TaskFilter, TaskStore, TaskStoreError, TaskStoreResult},
};

/// Thread-safe in-memory task store.
///
/// Writers are serialized by a single `RwLock`; every operation that touches
/// more than one collection does so under one write guard.
#[derive(Clone)]
pub struct InMemoryTaskStore {
    state: Arc<RwLock<InMemoryTaskState>>,
    clock: SharedClock,
}

#[derive(Debug, Default)]
struct InMemoryTaskState {
    tasks: Vec<Task>,
    history: Vec<HistoryRecord>,
    events: Vec<TaskEvent>,
    statistics: BTreeMap<NaiveDate, DailyStatistic>,
}

impl InMemoryTaskStore {
    /// Creates an empty store reading time from `clock`.
    #[must_use]
    pub fn new(clock: SharedClock) -> Self {
        Self {
            state: Arc::new(RwLock::new(InMemoryTaskState::default())),
            clock,
        }
    }

    fn event(&self, task_id: &TaskId, event_type: EventType, details: Value) -> TaskEvent {
        TaskEvent::new(task_id.clone(), event_type, self.clock.utc(), details)
    }
}

impl std::fmt::Debug for InMemoryTaskStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryTaskStore").finish_non_exhaustive()
    }
}

fn poisoned<T>(err: PoisonError<T>) -> TaskStoreError {
    TaskStoreError::persistence(std::io::Error::other(err.to_string()))
}

fn sorted_history(state: &InMemoryTaskState, query: &HistoryQuery) -> Vec<HistoryRecord> {
    // Newest first; later archival wins ties on creation time.
    let mut matching: Vec<(usize, &HistoryRecord)> = state
        .history
        .iter()
        .enumerate()
        .filter(|(_, record)| query.matches(record))
        .collect();
    matching.sort_by(|(left_idx, left), (right_idx, right)| {
        right
            .task()
            .created_at()
            .cmp(&left.task().created_at())
            .then(right_idx.cmp(left_idx))
    });
    matching.into_iter().map(|(_, record)| record.clone()).collect()
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create(&self, new_task: NewTask) -> TaskStoreResult<Task> {
        let task = Task::create(new_task, &*self.clock);
        let created = self.event(
            task.id(),
            EventType::TaskCreated,
            json!({
                "task_type": task.task_type().as_str(),
                "amount": task.amount().to_string(),
                "receiver": task.receiver().as_str(),
            }),
        );

        let mut state = self.state.write().map_err(poisoned)?;
        let exists = state.tasks.iter().any(|existing| existing.id() == task.id())
            || state.history.iter().any(|record| record.task().id() == task.id());
        if exists {
            return Err(TaskStoreError::DuplicateTask(task.id().clone()));
        }
        state.tasks.push(task.clone());
        state.events.push(created);
        Ok(task)
    }

    async fn update(&self, task_id: &TaskId, patch: TaskPatch) -> TaskStoreResult<bool> {
        let mut state = self.state.write().map_err(poisoned)?;
        let Some(task) = state.tasks.iter_mut().find(|task| task.id() == task_id) else {
            tracing::warn!(task_id = %task_id, "update requested for unknown task");
            return Ok(false);
        };
        task.apply(patch, &*self.clock)?;
        Ok(true)
    }

    async fn list_pending(&self, filter: TaskFilter) -> TaskStoreResult<Vec<Task>> {
        let state = self.state.read().map_err(poisoned)?;
        let mut tasks: Vec<Task> = state
            .tasks
            .iter()
            .filter(|task| filter.matches(task))
            .cloned()
            .collect();
        // Stable sort keeps insertion order for equal timestamps.
        tasks.sort_by_key(Task::created_at);
        Ok(tasks)
    }

    async fn complete(
        &self,
        task_id: &TaskId,
        final_status: TaskStatus,
    ) -> TaskStoreResult<Option<HistoryRecord>> {
        let mut state = self.state.write().map_err(poisoned)?;
        let Some(position) = state.tasks.iter().position(|task| task.id() == task_id) else {
            tracing::info!(task_id = %task_id, "task already archived or unknown; nothing to complete");
            return Ok(None);
        };
        let archived = state
            .tasks
            .get(position)
            .map(|task| task.archive(final_status, &*self.clock))
            .transpose()?;
        let Some(record) = archived else {
            return Ok(None);
        };

        state.tasks.remove(position);
        if final_status == TaskStatus::Completed {
            let completed_at = record.completed_at();
            state
                .statistics
                .entry(completed_at.date_naive())
                .or_insert_with(|| DailyStatistic::empty(completed_at.date_naive(), completed_at))
                .add(record.task().task_type(), record.task().amount(), completed_at);
        }
        let completed = self.event(
            task_id,
            EventType::TaskCompleted,
            json!({ "final_status": final_status.as_str() }),
        );
        state.events.push(completed);
        state.history.push(record.clone());
        Ok(Some(record))
    }

    async fn append_event(
        &self,
        task_id: &TaskId,
        event_type: EventType,
        details: Value,
    ) -> TaskStoreResult<TaskEvent> {
        let event = self.event(task_id, event_type, details);
        let mut state = self.state.write().map_err(poisoned)?;
        state.events.push(event.clone());
        Ok(event)
    }

    async fn last_event_of_type(
        &self,
        task_id: &TaskId,
        event_type: EventType,
    ) -> TaskStoreResult<Option<TaskEvent>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state
            .events
            .iter()
            .rev()
            .find(|event| event.task_id() == task_id && event.event_type() == event_type)
            .cloned())
    }

    async fn get(&self, task_id: &TaskId) -> TaskStoreResult<Option<Task>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.tasks.iter().find(|task| task.id() == task_id).cloned())
    }

    async fn history_record(&self, task_id: &TaskId) -> TaskStoreResult<Option<HistoryRecord>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state
            .history
            .iter()
            .find(|record| record.task().id() == task_id)
            .cloned())
    }

    async fn events(&self, task_id: &TaskId) -> TaskStoreResult<Vec<TaskEvent>> {
        let state = self.state.read().map_err(poisoned)?;
        let mut events: Vec<TaskEvent> = state
            .events
            .iter()
            .filter(|event| event.task_id() == task_id)
            .cloned()
            .collect();
        events.sort_by_key(TaskEvent::timestamp);
        Ok(events)
    }

    async fn list_history(&self, query: HistoryQuery) -> TaskStoreResult<Vec<HistoryRecord>> {
        let state = self.state.read().map_err(poisoned)?;
        let records = sorted_history(&state, &query)
            .into_iter()
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .collect();
        Ok(records)
    }

    async fn count_history(&self, query: HistoryQuery) -> TaskStoreResult<usize> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state
            .history
            .iter()
            .filter(|record| query.matches(record))
            .count())
    }

    async fn statistics(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> TaskStoreResult<Vec<DailyStatistic>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state
            .statistics
            .values()
            .rev()
            .filter(|row| from.is_none_or(|start| row.stat_date >= start))
            .filter(|row| to.is_none_or(|end| row.stat_date <= end))
            .cloned()
            .collect())
    }
}
