//! `SQLite` task store backed by Diesel and an r2d2 pool.

use super::{
    models::{
        EventRow, HistoryRow, NewEventRow, NewHistoryRow, NewTaskRow, StatisticRow,
        StatisticValues, TaskChangeset, TaskRow, stat_date_key,
    },
    schema::{events, history, statistics, tasks},
};
use crate::clock::SharedClock;
use crate::task::{
    domain::{
        DailyStatistic, EventType, HistoryQuery, HistoryRecord, NewTask, Task, TaskEvent, TaskId,
        TaskPatch, TaskStatus,
    },
    ports::{TaskFilter, TaskStore, TaskStoreError, TaskStoreResult},
};
use async_trait::async_trait;
use chrono::NaiveDate;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sqlite::{Sqlite, SqliteConnection};
use serde_json::{Value, json};

/// `SQLite` connection pool type used by the task store.
pub type TaskSqlitePool = Pool<ConnectionManager<SqliteConnection>>;

const SCHEMA_SQL: &str =
    include_str!("../../../../migrations/2026-10-01-000000_create_task_tables/up.sql");

const IN_MEMORY_URL: &str = ":memory:";

/// Per-connection pragmas applied when the pool hands out a connection.
#[derive(Debug, Clone, Copy)]
struct ConnectionPragmas;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionPragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute("PRAGMA busy_timeout = 5000; PRAGMA foreign_keys = ON;")
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

impl From<DieselError> for TaskStoreError {
    fn from(err: DieselError) -> Self {
        Self::persistence(err)
    }
}

/// `SQLite`-backed task store.
#[derive(Clone)]
pub struct SqliteTaskStore {
    pool: TaskSqlitePool,
    clock: SharedClock,
}

impl std::fmt::Debug for SqliteTaskStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteTaskStore").finish_non_exhaustive()
    }
}

impl SqliteTaskStore {
    /// Creates a store from an existing pool. The schema must already exist.
    #[must_use]
    pub fn new(pool: TaskSqlitePool, clock: SharedClock) -> Self {
        Self { pool, clock }
    }

    /// Opens (or creates) the database at `database_url` and applies the
    /// schema.
    ///
    /// `":memory:"` yields a single-connection pool so every caller sees the
    /// same database.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::Persistence`] when the pool cannot be built
    /// or the schema cannot be applied.
    pub fn connect(database_url: &str, clock: SharedClock) -> TaskStoreResult<Self> {
        let max_size = if database_url == IN_MEMORY_URL { 1 } else { 4 };
        let pool = Pool::builder()
            .max_size(max_size)
            .idle_timeout(None)
            .max_lifetime(None)
            .connection_customizer(Box::new(ConnectionPragmas))
            .build(ConnectionManager::<SqliteConnection>::new(database_url))
            .map_err(TaskStoreError::persistence)?;
        let mut connection = pool.get().map_err(TaskStoreError::persistence)?;
        connection.batch_execute(SCHEMA_SQL)?;
        drop(connection);
        tracing::debug!(database_url, max_size, "task store schema applied");
        Ok(Self::new(pool, clock))
    }

    async fn run_blocking<F, T>(&self, f: F) -> TaskStoreResult<T>
    where
        F: FnOnce(&mut SqliteConnection) -> TaskStoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(TaskStoreError::persistence)?;
            f(&mut connection)
        })
        .await
        .map_err(TaskStoreError::persistence)?
    }
}

fn insert_event(connection: &mut SqliteConnection, event: &TaskEvent) -> TaskStoreResult<()> {
    diesel::insert_into(events::table)
        .values(&NewEventRow::from_event(event)?)
        .execute(connection)?;
    Ok(())
}

fn find_task(connection: &mut SqliteConnection, task_id: &str) -> TaskStoreResult<Option<Task>> {
    tasks::table
        .filter(tasks::task_id.eq(task_id))
        .select(TaskRow::as_select())
        .first::<TaskRow>(connection)
        .optional()?
        .map(TaskRow::into_task)
        .transpose()
}

fn add_to_statistics(
    connection: &mut SqliteConnection,
    record: &HistoryRecord,
) -> TaskStoreResult<()> {
    let completed_at = record.completed_at();
    let date = completed_at.date_naive();
    let key = stat_date_key(date);
    let existing = statistics::table
        .filter(statistics::stat_date.eq(&key))
        .select(StatisticRow::as_select())
        .first::<StatisticRow>(connection)
        .optional()?
        .map(StatisticRow::into_statistic)
        .transpose()?;

    let is_new = existing.is_none();
    let mut row = existing.unwrap_or_else(|| DailyStatistic::empty(date, completed_at));
    row.add(record.task().task_type(), record.task().amount(), completed_at);
    let values = StatisticValues::from_statistic(&row);

    if is_new {
        diesel::insert_into(statistics::table)
            .values(&values)
            .execute(connection)?;
    } else {
        diesel::update(statistics::table.filter(statistics::stat_date.eq(&key)))
            .set(&values)
            .execute(connection)?;
    }
    Ok(())
}

fn history_filter(query: &HistoryQuery) -> history::BoxedQuery<'static, Sqlite> {
    let mut statement = history::table.into_boxed::<Sqlite>();
    if let Some(kind) = query.task_type {
        statement = statement.filter(history::task_type.eq(kind.as_str()));
    }
    if let Some(from) = query.created_from {
        statement = statement.filter(history::created_at.ge(from.timestamp_millis()));
    }
    if let Some(to) = query.created_to {
        statement = statement.filter(history::created_at.le(to.timestamp_millis()));
    }
    statement
}

fn to_i64(value: usize) -> TaskStoreResult<i64> {
    i64::try_from(value).map_err(TaskStoreError::persistence)
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn create(&self, new_task: NewTask) -> TaskStoreResult<Task> {
        let task = Task::create(new_task, &*self.clock);
        let row = NewTaskRow::from_task(&task)?;
        let created = TaskEvent::new(
            task.id().clone(),
            EventType::TaskCreated,
            task.created_at(),
            json!({
                "task_type": task.task_type().as_str(),
                "amount": task.amount().to_string(),
                "receiver": task.receiver().as_str(),
            }),
        );
        let task_id = task.id().clone();

        self.run_blocking(move |connection| {
            connection.immediate_transaction::<_, TaskStoreError, _>(|tx| {
                diesel::insert_into(tasks::table)
                    .values(&row)
                    .execute(tx)
                    .map_err(|err| match err {
                        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                            TaskStoreError::DuplicateTask(task_id.clone())
                        }
                        other => TaskStoreError::from(other),
                    })?;
                insert_event(tx, &created)
            })
        })
        .await?;
        Ok(task)
    }

    async fn update(&self, task_id: &TaskId, patch: TaskPatch) -> TaskStoreResult<bool> {
        let lookup = task_id.clone();
        let clock = self.clock.clone();
        let updated = self
            .run_blocking(move |connection| {
                connection.immediate_transaction::<_, TaskStoreError, _>(|tx| {
                    let Some(mut task) = find_task(tx, lookup.as_str())? else {
                        return Ok(false);
                    };
                    task.apply(patch, &*clock)?;
                    diesel::update(tasks::table.filter(tasks::task_id.eq(lookup.as_str())))
                        .set(&TaskChangeset::from_task(&task))
                        .execute(tx)?;
                    Ok(true)
                })
            })
            .await?;
        if !updated {
            tracing::warn!(task_id = %task_id, "update requested for unknown task");
        }
        Ok(updated)
    }

    async fn list_pending(&self, filter: TaskFilter) -> TaskStoreResult<Vec<Task>> {
        self.run_blocking(move |connection| {
            let mut statement = tasks::table.into_boxed::<Sqlite>();
            if let Some(kind) = filter.task_type {
                statement = statement.filter(tasks::task_type.eq(kind.as_str()));
            }
            if let Some(status) = filter.status {
                statement = statement.filter(tasks::status.eq(status.as_str()));
            }
            statement
                .order((tasks::created_at.asc(), tasks::id.asc()))
                .select(TaskRow::as_select())
                .load::<TaskRow>(connection)?
                .into_iter()
                .map(TaskRow::into_task)
                .collect()
        })
        .await
    }

    async fn complete(
        &self,
        task_id: &TaskId,
        final_status: TaskStatus,
    ) -> TaskStoreResult<Option<HistoryRecord>> {
        let lookup = task_id.clone();
        let clock = self.clock.clone();
        let archived = self
            .run_blocking(move |connection| {
                connection.immediate_transaction::<_, TaskStoreError, _>(|tx| {
                    let Some(task) = find_task(tx, lookup.as_str())? else {
                        return Ok(None);
                    };
                    let record = task.archive(final_status, &*clock)?;
                    diesel::insert_into(history::table)
                        .values(&NewHistoryRow::from_record(&record)?)
                        .execute(tx)?;
                    diesel::delete(tasks::table.filter(tasks::task_id.eq(lookup.as_str())))
                        .execute(tx)?;
                    if final_status == TaskStatus::Completed {
                        add_to_statistics(tx, &record)?;
                    }
                    let completed = TaskEvent::new(
                        lookup.clone(),
                        EventType::TaskCompleted,
                        record.completed_at(),
                        json!({ "final_status": final_status.as_str() }),
                    );
                    insert_event(tx, &completed)?;
                    Ok(Some(record))
                })
            })
            .await?;
        if archived.is_none() {
            tracing::info!(task_id = %task_id, "task already archived or unknown; nothing to complete");
        }
        Ok(archived)
    }

    async fn append_event(
        &self,
        task_id: &TaskId,
        event_type: EventType,
        details: Value,
    ) -> TaskStoreResult<TaskEvent> {
        let event = TaskEvent::new(task_id.clone(), event_type, self.clock.utc(), details);
        let stored = event.clone();
        self.run_blocking(move |connection| insert_event(connection, &stored))
            .await?;
        Ok(event)
    }

    async fn last_event_of_type(
        &self,
        task_id: &TaskId,
        event_type: EventType,
    ) -> TaskStoreResult<Option<TaskEvent>> {
        let lookup = task_id.clone();
        self.run_blocking(move |connection| {
            events::table
                .filter(events::task_id.eq(lookup.as_str()))
                .filter(events::event_type.eq(event_type.as_str()))
                .order((events::timestamp.desc(), events::id.desc()))
                .select(EventRow::as_select())
                .first::<EventRow>(connection)
                .optional()?
                .map(EventRow::into_event)
                .transpose()
        })
        .await
    }

    async fn get(&self, task_id: &TaskId) -> TaskStoreResult<Option<Task>> {
        let lookup = task_id.clone();
        self.run_blocking(move |connection| find_task(connection, lookup.as_str()))
            .await
    }

    async fn history_record(&self, task_id: &TaskId) -> TaskStoreResult<Option<HistoryRecord>> {
        let lookup = task_id.clone();
        self.run_blocking(move |connection| {
            history::table
                .filter(history::task_id.eq(lookup.as_str()))
                .select(HistoryRow::as_select())
                .first::<HistoryRow>(connection)
                .optional()?
                .map(HistoryRow::into_record)
                .transpose()
        })
        .await
    }

    async fn events(&self, task_id: &TaskId) -> TaskStoreResult<Vec<TaskEvent>> {
        let lookup = task_id.clone();
        self.run_blocking(move |connection| {
            events::table
                .filter(events::task_id.eq(lookup.as_str()))
                .order((events::timestamp.asc(), events::id.asc()))
                .select(EventRow::as_select())
                .load::<EventRow>(connection)?
                .into_iter()
                .map(EventRow::into_event)
                .collect()
        })
        .await
    }

    async fn list_history(&self, query: HistoryQuery) -> TaskStoreResult<Vec<HistoryRecord>> {
        let offset = to_i64(query.offset)?;
        let limit = query.limit.map(to_i64).transpose()?;
        self.run_blocking(move |connection| {
            let mut statement = history_filter(&query)
                .order((history::created_at.desc(), history::id.desc()))
                .offset(offset);
            if let Some(max_rows) = limit {
                statement = statement.limit(max_rows);
            }
            statement
                .select(HistoryRow::as_select())
                .load::<HistoryRow>(connection)?
                .into_iter()
                .map(HistoryRow::into_record)
                .collect()
        })
        .await
    }

    async fn count_history(&self, query: HistoryQuery) -> TaskStoreResult<usize> {
        self.run_blocking(move |connection| {
            let total = history_filter(&query).count().get_result::<i64>(connection)?;
            usize::try_from(total).map_err(TaskStoreError::persistence)
        })
        .await
    }

    async fn statistics(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> TaskStoreResult<Vec<DailyStatistic>> {
        self.run_blocking(move |connection| {
            // ISO dates compare correctly as text.
            let mut statement = statistics::table.into_boxed::<Sqlite>();
            if let Some(start) = from {
                statement = statement.filter(statistics::stat_date.ge(stat_date_key(start)));
            }
            if let Some(end) = to {
                statement = statement.filter(statistics::stat_date.le(stat_date_key(end)));
            }
            statement
                .order(statistics::stat_date.desc())
                .select(StatisticRow::as_select())
                .load::<StatisticRow>(connection)?
                .into_iter()
                .map(StatisticRow::into_statistic)
                .collect()
        })
        .await
    }
}
