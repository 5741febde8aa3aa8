//! Identifier and validated scalar types for the task domain.

use super::{Amount, TaskDomainError, TaskType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a task record.
///
/// Generated identifiers read `<type>_<unix-millis>_<amount>_<suffix>`; the
/// random suffix keeps two tasks created in the same millisecond for the
/// same amount distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Generates a new identifier for a task of the given shape.
    #[must_use]
    pub fn generate(task_type: TaskType, created_at: DateTime<Utc>, amount: Amount) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        let short = suffix.get(..8).unwrap_or(&suffix);
        Self(format!(
            "{}_{}_{}_{short}",
            task_type.as_str(),
            created_at.timestamp_millis(),
            amount
        ))
    }

    /// Wraps an existing identifier, e.g. one read back from storage.
    #[must_use]
    pub fn from_string(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference to a transaction submitted to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxRef(String);

impl TxRef {
    /// Wraps a transaction hash or other ledger-issued reference.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the reference as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Destination identity for a task's eventual payout.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Receiver(String);

impl Receiver {
    /// Creates a validated receiver.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::EmptyReceiver`] when the value is blank.
    pub fn new(value: impl Into<String>) -> Result<Self, TaskDomainError> {
        let raw = value.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(TaskDomainError::EmptyReceiver);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the receiver as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Receiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
