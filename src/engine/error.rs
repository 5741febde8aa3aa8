//! Error types for the engine facade.

use thiserror::Error;

use crate::config::ConfigError;
use crate::ledger::domain::LedgerError;
use crate::pipeline::PipelineError;
use crate::task::domain::TaskDomainError;
use crate::task::services::TaskLifecycleError;

/// Errors surfaced to engine callers.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A configured value failed domain validation.
    #[error(transparent)]
    Domain(#[from] TaskDomainError),

    /// Task creation or a task read failed.
    #[error(transparent)]
    Tasks(#[from] TaskLifecycleError),

    /// A manually triggered pass failed.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// A ledger read failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The engine only observes and will not create tasks or submit
    /// claims.
    #[error("engine is in observation mode; submissions are disabled")]
    ObservationMode,

    /// The operation needs a configured account.
    #[error("no account is configured")]
    NoAccount,

    /// Another owner holds the transaction lock.
    #[error("transaction lock is busy; try again later")]
    LockBusy,

    /// The reward claim was not submitted or not confirmed.
    #[error("reward claim failed: {0}")]
    RewardClaim(String),

    /// [`super::Engine::start`] was called while already running.
    #[error("engine is already running")]
    AlreadyRunning,

    /// The operation needs a running scheduler.
    #[error("engine is not running")]
    NotRunning,

    /// No worker is registered under this name.
    #[error("unknown worker: {0}")]
    UnknownWorker(String),
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
