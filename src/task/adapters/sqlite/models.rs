//! Diesel row models and their conversions to domain values.

use super::schema::{events, history, statistics, tasks};
use crate::task::domain::{
    Amount, DailyStatistic, EventType, HistoryRecord, PersistedTaskData, Receiver, Task, TaskEvent,
    TaskId, TaskMetadata, TaskStatus, TaskType, TxRef,
};
use crate::task::ports::{TaskStoreError, TaskStoreResult};
use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde_json::Value;
use thiserror::Error;

const STAT_DATE_FORMAT: &str = "%Y-%m-%d";

/// A stored value that no longer decodes into its domain type.
#[derive(Debug, Error)]
pub enum RowDecodeError {
    /// A millisecond timestamp is outside chrono's range.
    #[error("timestamp {0} is out of range")]
    Timestamp(i64),

    /// A base-unit amount is not an unsigned integer.
    #[error("stored amount '{0}' is not a base-unit integer")]
    Amount(String),
}

/// Query result row for in-flight tasks.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = tasks)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct TaskRow {
    /// Public task identifier.
    pub task_id: String,
    /// Lowercase task type.
    pub task_type: String,
    /// Amount in base units.
    pub amount: String,
    /// Payout destination.
    pub receiver: String,
    /// Lifecycle status.
    pub status: String,
    /// Creation time in unix milliseconds.
    pub created_at: i64,
    /// Last mutation time in unix milliseconds.
    pub updated_at: i64,
    /// Queue operation reference.
    pub queue_tx_ref: Option<String>,
    /// Activating operation reference.
    pub activate_tx_ref: Option<String>,
    /// Redemption reference.
    pub redeem_tx_ref: Option<String>,
    /// JSON metadata.
    pub metadata: String,
}

/// Insert model for in-flight tasks.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = tasks)]
pub struct NewTaskRow {
    /// Public task identifier.
    pub task_id: String,
    /// Lowercase task type.
    pub task_type: String,
    /// Amount in base units.
    pub amount: String,
    /// Payout destination.
    pub receiver: String,
    /// Lifecycle status.
    pub status: String,
    /// Creation time in unix milliseconds.
    pub created_at: i64,
    /// Last mutation time in unix milliseconds.
    pub updated_at: i64,
    /// Queue operation reference.
    pub queue_tx_ref: Option<String>,
    /// Activating operation reference.
    pub activate_tx_ref: Option<String>,
    /// Redemption reference.
    pub redeem_tx_ref: Option<String>,
    /// JSON metadata.
    pub metadata: String,
}

/// Mutable columns written back after a patch.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = tasks)]
pub struct TaskChangeset {
    /// Lifecycle status.
    pub status: String,
    /// Last mutation time in unix milliseconds.
    pub updated_at: i64,
    /// Queue operation reference.
    pub queue_tx_ref: Option<String>,
    /// Activating operation reference.
    pub activate_tx_ref: Option<String>,
    /// Redemption reference.
    pub redeem_tx_ref: Option<String>,
}

/// Query result row for archived tasks.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = history)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct HistoryRow {
    /// Public task identifier.
    pub task_id: String,
    /// Lowercase task type.
    pub task_type: String,
    /// Amount in base units.
    pub amount: String,
    /// Payout destination.
    pub receiver: String,
    /// Terminal status.
    pub status: String,
    /// Creation time in unix milliseconds.
    pub created_at: i64,
    /// Last mutation time in unix milliseconds.
    pub updated_at: i64,
    /// Queue operation reference.
    pub queue_tx_ref: Option<String>,
    /// Activating operation reference.
    pub activate_tx_ref: Option<String>,
    /// Redemption reference.
    pub redeem_tx_ref: Option<String>,
    /// JSON metadata.
    pub metadata: String,
    /// Archival time in unix milliseconds.
    pub completed_at: i64,
}

/// Insert model for archived tasks.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = history)]
pub struct NewHistoryRow {
    /// Public task identifier.
    pub task_id: String,
    /// Lowercase task type.
    pub task_type: String,
    /// Amount in base units.
    pub amount: String,
    /// Payout destination.
    pub receiver: String,
    /// Terminal status.
    pub status: String,
    /// Creation time in unix milliseconds.
    pub created_at: i64,
    /// Last mutation time in unix milliseconds.
    pub updated_at: i64,
    /// Queue operation reference.
    pub queue_tx_ref: Option<String>,
    /// Activating operation reference.
    pub activate_tx_ref: Option<String>,
    /// Redemption reference.
    pub redeem_tx_ref: Option<String>,
    /// JSON metadata.
    pub metadata: String,
    /// Archival time in unix milliseconds.
    pub completed_at: i64,
}

/// Query result row for events.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = events)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct EventRow {
    /// Owning task.
    pub task_id: String,
    /// Uppercase event tag.
    pub event_type: String,
    /// Append time in unix milliseconds.
    pub timestamp: i64,
    /// JSON details.
    pub details: String,
}

/// Insert model for events.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = events)]
pub struct NewEventRow {
    /// Owning task.
    pub task_id: String,
    /// Uppercase event tag.
    pub event_type: String,
    /// Append time in unix milliseconds.
    pub timestamp: i64,
    /// JSON details.
    pub details: String,
}

/// Query result row for daily statistics.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = statistics)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct StatisticRow {
    /// `YYYY-MM-DD`.
    pub stat_date: String,
    /// Boosted total in base units.
    pub total_boosted: String,
    /// Unboosted total in base units.
    pub total_unboosted: String,
    /// Redeemed total in base units.
    pub total_redeemed: String,
    /// Last change in unix milliseconds.
    pub updated_at: i64,
}

/// Insert and update model for daily statistics.
#[derive(Debug, Clone, Insertable, AsChangeset)]
#[diesel(table_name = statistics)]
pub struct StatisticValues {
    /// `YYYY-MM-DD`.
    pub stat_date: String,
    /// Boosted total in base units.
    pub total_boosted: String,
    /// Unboosted total in base units.
    pub total_unboosted: String,
    /// Redeemed total in base units.
    pub total_redeemed: String,
    /// Last change in unix milliseconds.
    pub updated_at: i64,
}

pub(super) fn stat_date_key(date: NaiveDate) -> String {
    date.format(STAT_DATE_FORMAT).to_string()
}

fn decode_err(err: impl std::error::Error + Send + Sync + 'static) -> TaskStoreError {
    TaskStoreError::persistence(err)
}

fn timestamp(millis: i64) -> TaskStoreResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| decode_err(RowDecodeError::Timestamp(millis)))
}

fn amount(units: &str) -> TaskStoreResult<Amount> {
    units
        .parse::<u128>()
        .map(Amount::from_base_units)
        .map_err(|_| decode_err(RowDecodeError::Amount(units.to_owned())))
}

fn metadata(raw: &str) -> TaskStoreResult<TaskMetadata> {
    let value = serde_json::from_str::<Value>(raw).map_err(decode_err)?;
    TaskMetadata::try_from(value).map_err(decode_err)
}

fn encode_metadata(task: &Task) -> TaskStoreResult<String> {
    serde_json::to_string(&task.metadata().to_value()).map_err(decode_err)
}

/// Columns shared by the active table and the archive.
struct TaskColumns {
    task_id: String,
    task_type: String,
    amount: String,
    receiver: String,
    status: String,
    created_at: i64,
    updated_at: i64,
    queue_tx_ref: Option<String>,
    activate_tx_ref: Option<String>,
    redeem_tx_ref: Option<String>,
    metadata: String,
}

impl TaskColumns {
    fn into_task(self) -> TaskStoreResult<Task> {
        let data = PersistedTaskData {
            task_id: TaskId::from_string(self.task_id),
            task_type: TaskType::try_from(self.task_type.as_str()).map_err(decode_err)?,
            amount: amount(&self.amount)?,
            receiver: Receiver::new(self.receiver).map_err(decode_err)?,
            status: TaskStatus::try_from(self.status.as_str()).map_err(decode_err)?,
            created_at: timestamp(self.created_at)?,
            updated_at: timestamp(self.updated_at)?,
            queue_tx_ref: self.queue_tx_ref.map(TxRef::new),
            activate_tx_ref: self.activate_tx_ref.map(TxRef::new),
            redeem_tx_ref: self.redeem_tx_ref.map(TxRef::new),
            metadata: metadata(&self.metadata)?,
        };
        Ok(Task::from_persisted(data))
    }

    fn from_task(task: &Task) -> TaskStoreResult<Self> {
        Ok(Self {
            task_id: task.id().as_str().to_owned(),
            task_type: task.task_type().as_str().to_owned(),
            amount: task.amount().base_units().to_string(),
            receiver: task.receiver().as_str().to_owned(),
            status: task.status().as_str().to_owned(),
            created_at: task.created_at().timestamp_millis(),
            updated_at: task.updated_at().timestamp_millis(),
            queue_tx_ref: task.queue_tx_ref().map(|tx| tx.as_str().to_owned()),
            activate_tx_ref: task.activate_tx_ref().map(|tx| tx.as_str().to_owned()),
            redeem_tx_ref: task.redeem_tx_ref().map(|tx| tx.as_str().to_owned()),
            metadata: encode_metadata(task)?,
        })
    }
}

impl TaskRow {
    /// Decodes the row into a task.
    pub fn into_task(self) -> TaskStoreResult<Task> {
        TaskColumns {
            task_id: self.task_id,
            task_type: self.task_type,
            amount: self.amount,
            receiver: self.receiver,
            status: self.status,
            created_at: self.created_at,
            updated_at: self.updated_at,
            queue_tx_ref: self.queue_tx_ref,
            activate_tx_ref: self.activate_tx_ref,
            redeem_tx_ref: self.redeem_tx_ref,
            metadata: self.metadata,
        }
        .into_task()
    }
}

impl NewTaskRow {
    /// Encodes a task for insertion.
    pub fn from_task(task: &Task) -> TaskStoreResult<Self> {
        let columns = TaskColumns::from_task(task)?;
        Ok(Self {
            task_id: columns.task_id,
            task_type: columns.task_type,
            amount: columns.amount,
            receiver: columns.receiver,
            status: columns.status,
            created_at: columns.created_at,
            updated_at: columns.updated_at,
            queue_tx_ref: columns.queue_tx_ref,
            activate_tx_ref: columns.activate_tx_ref,
            redeem_tx_ref: columns.redeem_tx_ref,
            metadata: columns.metadata,
        })
    }
}

impl TaskChangeset {
    /// Captures the mutable columns of a patched task.
    #[must_use]
    pub fn from_task(task: &Task) -> Self {
        Self {
            status: task.status().as_str().to_owned(),
            updated_at: task.updated_at().timestamp_millis(),
            queue_tx_ref: task.queue_tx_ref().map(|tx| tx.as_str().to_owned()),
            activate_tx_ref: task.activate_tx_ref().map(|tx| tx.as_str().to_owned()),
            redeem_tx_ref: task.redeem_tx_ref().map(|tx| tx.as_str().to_owned()),
        }
    }
}

impl HistoryRow {
    /// Decodes the row into an archive record.
    pub fn into_record(self) -> TaskStoreResult<HistoryRecord> {
        let completed_at = timestamp(self.completed_at)?;
        let task = TaskColumns {
            task_id: self.task_id,
            task_type: self.task_type,
            amount: self.amount,
            receiver: self.receiver,
            status: self.status,
            created_at: self.created_at,
            updated_at: self.updated_at,
            queue_tx_ref: self.queue_tx_ref,
            activate_tx_ref: self.activate_tx_ref,
            redeem_tx_ref: self.redeem_tx_ref,
            metadata: self.metadata,
        }
        .into_task()?;
        Ok(HistoryRecord::new(task, completed_at))
    }
}

impl NewHistoryRow {
    /// Encodes an archive record for insertion.
    pub fn from_record(record: &HistoryRecord) -> TaskStoreResult<Self> {
        let columns = TaskColumns::from_task(record.task())?;
        Ok(Self {
            task_id: columns.task_id,
            task_type: columns.task_type,
            amount: columns.amount,
            receiver: columns.receiver,
            status: columns.status,
            created_at: columns.created_at,
            updated_at: columns.updated_at,
            queue_tx_ref: columns.queue_tx_ref,
            activate_tx_ref: columns.activate_tx_ref,
            redeem_tx_ref: columns.redeem_tx_ref,
            metadata: columns.metadata,
            completed_at: record.completed_at().timestamp_millis(),
        })
    }
}

impl EventRow {
    /// Decodes the row into an event.
    pub fn into_event(self) -> TaskStoreResult<TaskEvent> {
        let event_type = EventType::try_from(self.event_type.as_str()).map_err(decode_err)?;
        let details = serde_json::from_str::<Value>(&self.details).map_err(decode_err)?;
        Ok(TaskEvent::new(
            TaskId::from_string(self.task_id),
            event_type,
            timestamp(self.timestamp)?,
            details,
        ))
    }
}

impl NewEventRow {
    /// Encodes an event for insertion.
    pub fn from_event(event: &TaskEvent) -> TaskStoreResult<Self> {
        Ok(Self {
            task_id: event.task_id().as_str().to_owned(),
            event_type: event.event_type().as_str().to_owned(),
            timestamp: event.timestamp().timestamp_millis(),
            details: serde_json::to_string(event.details()).map_err(decode_err)?,
        })
    }
}

impl StatisticRow {
    /// Decodes the row into a daily statistic.
    pub fn into_statistic(self) -> TaskStoreResult<DailyStatistic> {
        Ok(DailyStatistic {
            stat_date: NaiveDate::parse_from_str(&self.stat_date, STAT_DATE_FORMAT)
                .map_err(decode_err)?,
            total_boosted: amount(&self.total_boosted)?,
            total_unboosted: amount(&self.total_unboosted)?,
            total_redeemed: amount(&self.total_redeemed)?,
            updated_at: timestamp(self.updated_at)?,
        })
    }
}

impl StatisticValues {
    /// Encodes a daily statistic.
    #[must_use]
    pub fn from_statistic(statistic: &DailyStatistic) -> Self {
        Self {
            stat_date: stat_date_key(statistic.stat_date),
            total_boosted: statistic.total_boosted.base_units().to_string(),
            total_unboosted: statistic.total_unboosted.base_units().to_string(),
            total_redeemed: statistic.total_redeemed.base_units().to_string(),
            updated_at: statistic.updated_at.timestamp_millis(),
        }
    }
}
