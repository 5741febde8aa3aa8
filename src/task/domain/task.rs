//! Task aggregate root and related task lifecycle types.

use super::{
    Amount, HistoryRecord, ParseTaskStatusError, ParseTaskTypeError, Receiver, TaskDomainError,
    TaskId, TxRef,
};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Kind of workflow a task drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Stake free balance towards the configured validator.
    Boost,
    /// Unstake a boosted amount and redeem it to a receiver.
    Unboost,
    /// Redeem an already free amount.
    Redeem,
}

impl TaskType {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Boost => "boost",
            Self::Unboost => "unboost",
            Self::Redeem => "redeem",
        }
    }

    /// Whether a pipeline drives tasks of this type from PENDING.
    ///
    /// REDEEM remains a storage and statistics category; redemption itself
    /// is the last step of an UNBOOST task.
    #[must_use]
    pub const fn has_driver(self) -> bool {
        matches!(self, Self::Boost | Self::Unboost)
    }
}

impl TryFrom<&str> for TaskType {
    type Error = ParseTaskTypeError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "boost" => Ok(Self::Boost),
            "unboost" => Ok(Self::Unboost),
            "redeem" => Ok(Self::Redeem),
            _ => Err(ParseTaskTypeError(value.to_owned())),
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created, nothing submitted yet.
    Pending,
    /// The queue operation was submitted; the ledger delay is running.
    Queued,
    /// The delay elapsed and the activating operation is being submitted.
    WaitingForActivation,
    /// The activating operation landed.
    Active,
    /// Finished successfully.
    Completed,
    /// Abandoned after an unrecoverable failure.
    Failed,
    /// Canceled by an operator.
    Canceled,
}

impl TaskStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Queued => "queued",
            Self::WaitingForActivation => "waiting_for_activation",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }

    /// Returns `true` for statuses that archive the task.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Canceled)
    }

    /// Returns whether `target` is a legal next status.
    ///
    /// The forward path is `Pending → Queued → WaitingForActivation →
    /// Active → Completed`; `Failed` and `Canceled` are reachable from any
    /// non-terminal status.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        match target {
            Self::Failed | Self::Canceled => true,
            Self::Queued => matches!(self, Self::Pending),
            Self::WaitingForActivation => matches!(self, Self::Queued),
            Self::Active => matches!(self, Self::WaitingForActivation),
            Self::Completed => matches!(self, Self::Active),
            Self::Pending => false,
        }
    }
}

impl TryFrom<&str> for TaskStatus {
    type Error = ParseTaskStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "queued" => Ok(Self::Queued),
            "waiting_for_activation" => Ok(Self::WaitingForActivation),
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "canceled" => Ok(Self::Canceled),
            _ => Err(ParseTaskStatusError(value.to_owned())),
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Free-form attributes captured when a task is created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskMetadata(Map<String, Value>);

impl TaskMetadata {
    /// Creates empty metadata.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an attribute.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Returns an attribute value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns the metadata as a JSON value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

impl TryFrom<Value> for TaskMetadata {
    type Error = TaskDomainError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Ok(Self::default()),
            _ => Err(TaskDomainError::InvalidMetadata),
        }
    }
}

/// Validated input for creating a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    task_type: TaskType,
    amount: Amount,
    receiver: Receiver,
    metadata: TaskMetadata,
}

impl NewTask {
    /// Validates task creation input.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::NonPositiveAmount`] when `amount` is zero.
    pub fn new(
        task_type: TaskType,
        amount: Amount,
        receiver: Receiver,
        metadata: TaskMetadata,
    ) -> Result<Self, TaskDomainError> {
        if amount.is_zero() {
            return Err(TaskDomainError::NonPositiveAmount);
        }
        Ok(Self {
            task_type,
            amount,
            receiver,
            metadata,
        })
    }

    /// Parses and validates raw caller input.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError`] when the amount does not parse or is zero,
    /// or when the receiver is blank.
    pub fn parse(
        task_type: TaskType,
        amount: &str,
        receiver: &str,
        metadata: TaskMetadata,
    ) -> Result<Self, TaskDomainError> {
        let parsed_amount = amount.parse::<Amount>()?;
        let parsed_receiver = Receiver::new(receiver)?;
        Self::new(task_type, parsed_amount, parsed_receiver, metadata)
    }

    /// Returns the task type.
    #[must_use]
    pub const fn task_type(&self) -> TaskType {
        self.task_type
    }

    /// Returns the amount.
    #[must_use]
    pub const fn amount(&self) -> Amount {
        self.amount
    }

    /// Returns the receiver.
    #[must_use]
    pub const fn receiver(&self) -> &Receiver {
        &self.receiver
    }
}

/// Typed set of fields a driver may change on an in-flight task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    /// New non-terminal status.
    pub status: Option<TaskStatus>,
    /// Reference of the queue operation.
    pub queue_tx_ref: Option<TxRef>,
    /// Reference of the activating (or dropping) operation.
    pub activate_tx_ref: Option<TxRef>,
    /// Reference of the redemption.
    pub redeem_tx_ref: Option<TxRef>,
}

impl TaskPatch {
    /// Patch that only changes the status.
    #[must_use]
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Patch recording a successful queue operation.
    #[must_use]
    pub fn queued(tx_ref: TxRef) -> Self {
        Self {
            status: Some(TaskStatus::Queued),
            queue_tx_ref: Some(tx_ref),
            ..Self::default()
        }
    }

    /// Patch recording a successful activating operation.
    #[must_use]
    pub fn activated(tx_ref: TxRef) -> Self {
        Self {
            status: Some(TaskStatus::Active),
            activate_tx_ref: Some(tx_ref),
            ..Self::default()
        }
    }

    /// Patch recording a redemption reference.
    #[must_use]
    pub fn redeemed(tx_ref: TxRef) -> Self {
        Self {
            redeem_tx_ref: Some(tx_ref),
            ..Self::default()
        }
    }
}

/// Task aggregate root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    task_id: TaskId,
    task_type: TaskType,
    amount: Amount,
    receiver: Receiver,
    status: TaskStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    queue_tx_ref: Option<TxRef>,
    activate_tx_ref: Option<TxRef>,
    redeem_tx_ref: Option<TxRef>,
    metadata: TaskMetadata,
}

/// Parameter object for reconstructing a persisted task aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedTaskData {
    /// Persisted task identifier.
    pub task_id: TaskId,
    /// Persisted task type.
    pub task_type: TaskType,
    /// Persisted amount.
    pub amount: Amount,
    /// Persisted receiver.
    pub receiver: Receiver,
    /// Persisted lifecycle status.
    pub status: TaskStatus,
    /// Persisted creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Persisted latest mutation timestamp.
    pub updated_at: DateTime<Utc>,
    /// Persisted queue reference.
    pub queue_tx_ref: Option<TxRef>,
    /// Persisted activation reference.
    pub activate_tx_ref: Option<TxRef>,
    /// Persisted redemption reference.
    pub redeem_tx_ref: Option<TxRef>,
    /// Persisted metadata.
    pub metadata: TaskMetadata,
}

impl Task {
    /// Creates a pending task from validated input.
    #[must_use]
    pub fn create(new_task: NewTask, clock: &(impl Clock + ?Sized)) -> Self {
        let timestamp = clock.utc();
        let NewTask {
            task_type,
            amount,
            receiver,
            metadata,
        } = new_task;

        Self {
            task_id: TaskId::generate(task_type, timestamp, amount),
            task_type,
            amount,
            receiver,
            status: TaskStatus::Pending,
            created_at: timestamp,
            updated_at: timestamp,
            queue_tx_ref: None,
            activate_tx_ref: None,
            redeem_tx_ref: None,
            metadata,
        }
    }

    /// Reconstructs a task from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedTaskData) -> Self {
        Self {
            task_id: data.task_id,
            task_type: data.task_type,
            amount: data.amount,
            receiver: data.receiver,
            status: data.status,
            created_at: data.created_at,
            updated_at: data.updated_at,
            queue_tx_ref: data.queue_tx_ref,
            activate_tx_ref: data.activate_tx_ref,
            redeem_tx_ref: data.redeem_tx_ref,
            metadata: data.metadata,
        }
    }

    /// Returns the task identifier.
    #[must_use]
    pub const fn id(&self) -> &TaskId {
        &self.task_id
    }

    /// Returns the task type.
    #[must_use]
    pub const fn task_type(&self) -> TaskType {
        self.task_type
    }

    /// Returns the amount.
    #[must_use]
    pub const fn amount(&self) -> Amount {
        self.amount
    }

    /// Returns the receiver.
    #[must_use]
    pub const fn receiver(&self) -> &Receiver {
        &self.receiver
    }

    /// Returns the lifecycle status.
    #[must_use]
    pub const fn status(&self) -> TaskStatus {
        self.status
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the latest mutation timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns the queue operation reference, if any.
    #[must_use]
    pub const fn queue_tx_ref(&self) -> Option<&TxRef> {
        self.queue_tx_ref.as_ref()
    }

    /// Returns the activating operation reference, if any.
    #[must_use]
    pub const fn activate_tx_ref(&self) -> Option<&TxRef> {
        self.activate_tx_ref.as_ref()
    }

    /// Returns the redemption reference, if any.
    #[must_use]
    pub const fn redeem_tx_ref(&self) -> Option<&TxRef> {
        self.redeem_tx_ref.as_ref()
    }

    /// Returns the creation metadata.
    #[must_use]
    pub const fn metadata(&self) -> &TaskMetadata {
        &self.metadata
    }

    /// Applies a patch, validating it completely before mutating anything.
    ///
    /// A patch whose status equals the current status leaves the status
    /// untouched. Re-recording an identical reference is accepted.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::TerminalStatusRequiresCompletion`] for
    /// terminal statuses, [`TaskDomainError::InvalidStateTransition`] for
    /// edges outside the lifecycle graph and
    /// [`TaskDomainError::TxRefAlreadySet`] when a reference slot already
    /// holds a different value.
    pub fn apply(&mut self, patch: TaskPatch, clock: &(impl Clock + ?Sized)) -> Result<(), TaskDomainError> {
        if let Some(target) = patch.status.filter(|status| *status != self.status) {
            if target.is_terminal() {
                return Err(TaskDomainError::TerminalStatusRequiresCompletion {
                    task_id: self.task_id.clone(),
                    status: target,
                });
            }
            self.ensure_transition(target)?;
        }
        self.ensure_ref_free(self.queue_tx_ref.as_ref(), patch.queue_tx_ref.as_ref(), "queue")?;
        self.ensure_ref_free(
            self.activate_tx_ref.as_ref(),
            patch.activate_tx_ref.as_ref(),
            "activate",
        )?;
        self.ensure_ref_free(self.redeem_tx_ref.as_ref(), patch.redeem_tx_ref.as_ref(), "redeem")?;

        let TaskPatch {
            status,
            queue_tx_ref,
            activate_tx_ref,
            redeem_tx_ref,
        } = patch;
        if let Some(target) = status {
            self.status = target;
        }
        self.queue_tx_ref = self.queue_tx_ref.take().or(queue_tx_ref);
        self.activate_tx_ref = self.activate_tx_ref.take().or(activate_tx_ref);
        self.redeem_tx_ref = self.redeem_tx_ref.take().or(redeem_tx_ref);
        self.touch(clock);
        Ok(())
    }

    /// Produces the archived form of this task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidStateTransition`] when
    /// `final_status` is not terminal or not reachable from the current
    /// status.
    pub fn archive(
        &self,
        final_status: TaskStatus,
        clock: &(impl Clock + ?Sized),
    ) -> Result<HistoryRecord, TaskDomainError> {
        if !final_status.is_terminal() {
            return Err(self.transition_error(final_status));
        }
        self.ensure_transition(final_status)?;
        let mut archived = self.clone();
        archived.status = final_status;
        Ok(HistoryRecord::new(archived, clock.utc()))
    }

    fn ensure_transition(&self, target: TaskStatus) -> Result<(), TaskDomainError> {
        if self.status.can_transition_to(target) {
            Ok(())
        } else {
            Err(self.transition_error(target))
        }
    }

    fn transition_error(&self, target: TaskStatus) -> TaskDomainError {
        TaskDomainError::InvalidStateTransition {
            task_id: self.task_id.clone(),
            from: self.status,
            to: target,
        }
    }

    fn ensure_ref_free(
        &self,
        current: Option<&TxRef>,
        incoming: Option<&TxRef>,
        kind: &'static str,
    ) -> Result<(), TaskDomainError> {
        match (current, incoming) {
            (Some(existing), Some(new)) if existing != new => Err(TaskDomainError::TxRefAlreadySet {
                task_id: self.task_id.clone(),
                kind,
            }),
            _ => Ok(()),
        }
    }

    /// Updates the `updated_at` timestamp to the current clock time.
    fn touch(&mut self, clock: &(impl Clock + ?Sized)) {
        self.updated_at = clock.utc();
    }
}
