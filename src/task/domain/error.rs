//! Error types for task domain validation and parsing.

use super::{AmountParseError, TaskId, TaskStatus, TaskType};
use thiserror::Error;

/// Errors returned while constructing or mutating domain task values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskDomainError {
    /// The amount could not be parsed.
    #[error(transparent)]
    InvalidAmount(#[from] AmountParseError),

    /// The amount is zero.
    #[error("amount must be greater than zero")]
    NonPositiveAmount,

    /// The receiver is empty after trimming.
    #[error("receiver must not be empty")]
    EmptyReceiver,

    /// No pipeline drives tasks of this type, so they may not be created.
    #[error("{0} tasks cannot be created directly")]
    UndrivenTaskType(TaskType),

    /// Task metadata must be a JSON object.
    #[error("task metadata must be a JSON object")]
    InvalidMetadata,

    /// The requested status change is not an edge of the lifecycle graph.
    #[error("task {task_id} cannot transition from {from} to {to}")]
    InvalidStateTransition {
        /// Task being transitioned.
        task_id: TaskId,
        /// Current state.
        from: TaskStatus,
        /// Requested state.
        to: TaskStatus,
    },

    /// Terminal statuses are only reachable through completion.
    #[error("task {task_id} must be completed to reach terminal status {status}")]
    TerminalStatusRequiresCompletion {
        /// Task being transitioned.
        task_id: TaskId,
        /// Requested terminal state.
        status: TaskStatus,
    },

    /// A transaction reference may only be recorded once.
    #[error("task {task_id} already has a {kind} transaction reference")]
    TxRefAlreadySet {
        /// Task being updated.
        task_id: TaskId,
        /// Which reference slot was already filled.
        kind: &'static str,
    },
}

/// Error returned while parsing task statuses from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown task status: {0}")]
pub struct ParseTaskStatusError(pub String);

/// Error returned while parsing task types from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown task type: {0}")]
pub struct ParseTaskTypeError(pub String);

/// Error returned while parsing event types from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown event type: {0}")]
pub struct ParseEventTypeError(pub String);
