//! Append-only task event log entries.

use super::{ParseEventTypeError, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Typed tag carried by every task event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// The task was created.
    TaskCreated,
    /// The task was archived.
    TaskCompleted,
    /// The drop queue operation landed.
    QueueDropBoostSuccess,
    /// The drop queue operation failed.
    QueueDropBoostFailed,
    /// The drop delay has not elapsed yet.
    DropBoostWaiting,
    /// The drop operation landed.
    DropBoostSuccess,
    /// The drop operation failed.
    DropBoostFailed,
    /// Not enough free balance to redeem.
    RedeemWaiting,
    /// The redemption landed.
    RedeemSuccess,
    /// The redemption failed.
    RedeemFailed,
    /// The boost queue operation landed.
    QueueBoostSuccess,
    /// The boost queue operation failed.
    QueueBoostFailed,
    /// The activation delay has not elapsed yet.
    ActivateBoostWaiting,
    /// The activation landed.
    ActivateBoostSuccess,
    /// The activation failed.
    ActivateBoostFailed,
    /// Rewards were claimed after a boost.
    ClaimRewardSuccess,
    /// Claiming rewards failed.
    ClaimRewardFailed,
    /// A submitted operation did not confirm.
    ConfirmationFailed,
    /// The task exhausted its retry budget.
    RetryLimitExceeded,
}

impl EventType {
    /// Every event type, in declaration order.
    pub const ALL: [Self; 19] = [
        Self::TaskCreated,
        Self::TaskCompleted,
        Self::QueueDropBoostSuccess,
        Self::QueueDropBoostFailed,
        Self::DropBoostWaiting,
        Self::DropBoostSuccess,
        Self::DropBoostFailed,
        Self::RedeemWaiting,
        Self::RedeemSuccess,
        Self::RedeemFailed,
        Self::QueueBoostSuccess,
        Self::QueueBoostFailed,
        Self::ActivateBoostWaiting,
        Self::ActivateBoostSuccess,
        Self::ActivateBoostFailed,
        Self::ClaimRewardSuccess,
        Self::ClaimRewardFailed,
        Self::ConfirmationFailed,
        Self::RetryLimitExceeded,
    ];

    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TaskCreated => "TASK_CREATED",
            Self::TaskCompleted => "TASK_COMPLETED",
            Self::QueueDropBoostSuccess => "QUEUE_DROP_BOOST_SUCCESS",
            Self::QueueDropBoostFailed => "QUEUE_DROP_BOOST_FAILED",
            Self::DropBoostWaiting => "DROP_BOOST_WAITING",
            Self::DropBoostSuccess => "DROP_BOOST_SUCCESS",
            Self::DropBoostFailed => "DROP_BOOST_FAILED",
            Self::RedeemWaiting => "REDEEM_WAITING",
            Self::RedeemSuccess => "REDEEM_SUCCESS",
            Self::RedeemFailed => "REDEEM_FAILED",
            Self::QueueBoostSuccess => "QUEUE_BOOST_SUCCESS",
            Self::QueueBoostFailed => "QUEUE_BOOST_FAILED",
            Self::ActivateBoostWaiting => "ACTIVATE_BOOST_WAITING",
            Self::ActivateBoostSuccess => "ACTIVATE_BOOST_SUCCESS",
            Self::ActivateBoostFailed => "ACTIVATE_BOOST_FAILED",
            Self::ClaimRewardSuccess => "CLAIM_REWARD_SUCCESS",
            Self::ClaimRewardFailed => "CLAIM_REWARD_FAILED",
            Self::ConfirmationFailed => "CONFIRMATION_FAILED",
            Self::RetryLimitExceeded => "RETRY_LIMIT_EXCEEDED",
        }
    }

    /// Returns `true` for the deduplicated "still waiting" notices.
    #[must_use]
    pub const fn is_waiting_notice(self) -> bool {
        matches!(
            self,
            Self::DropBoostWaiting | Self::ActivateBoostWaiting | Self::RedeemWaiting
        )
    }
}

impl TryFrom<&str> for EventType {
    type Error = ParseEventTypeError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|event_type| event_type.as_str() == normalized)
            .ok_or_else(|| ParseEventTypeError(value.to_owned()))
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a task's event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEvent {
    task_id: TaskId,
    event_type: EventType,
    timestamp: DateTime<Utc>,
    details: Value,
}

impl TaskEvent {
    /// Creates an event.
    #[must_use]
    pub const fn new(
        task_id: TaskId,
        event_type: EventType,
        timestamp: DateTime<Utc>,
        details: Value,
    ) -> Self {
        Self {
            task_id,
            event_type,
            timestamp,
            details,
        }
    }

    /// Returns the owning task.
    #[must_use]
    pub const fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// Returns the event tag.
    #[must_use]
    pub const fn event_type(&self) -> EventType {
        self.event_type
    }

    /// Returns when the event was appended.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Returns the structured details.
    #[must_use]
    pub const fn details(&self) -> &Value {
        &self.details
    }
}
