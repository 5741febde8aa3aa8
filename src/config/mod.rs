//! Engine configuration.
//!
//! Settings come from a TOML file read through a capability directory, then
//! `STAKEFLOW_*` environment variables override individual fields, then the
//! result is validated. Every field has a default so an empty file is a
//! valid (observation-only) configuration.

mod env;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::pipeline::{PipelineSettings, RetryPolicy};
use crate::txlock::AcquireMode;

pub use env::{EnvLookup, process_env};

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be opened or read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path that was requested.
        path: Utf8PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for [`EngineConfig`].
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// Path that was parsed.
        path: Utf8PathBuf,
        /// Parser failure.
        #[source]
        source: Box<toml::de::Error>,
    },

    /// An environment override could not be parsed.
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidEnv {
        /// Environment variable name.
        key: String,
        /// Raw value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The merged configuration is inconsistent.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Whether the engine may submit ledger operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Operations are signed and submitted.
    Execution,
    /// Pipelines only report what they would do.
    #[default]
    Observation,
}

impl ExecutionMode {
    /// Lowercase name used in configuration.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Execution => "execution",
            Self::Observation => "observation",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "execution" => Ok(Self::Execution),
            "observation" => Ok(Self::Observation),
            other => Err(format!("unknown mode '{other}'; expected execution or observation")),
        }
    }
}

/// Schedule of one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerConfig {
    /// Whether the worker starts enabled.
    pub enabled: bool,
    /// Seconds between passes.
    pub interval_secs: u64,
}

impl WorkerConfig {
    const fn every(interval_secs: u64, enabled: bool) -> Self {
        Self {
            enabled,
            interval_secs,
        }
    }

    /// Interval as a [`Duration`].
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Schedules of the four workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkersConfig {
    /// Unboost pipeline.
    pub unboost: WorkerConfig,
    /// Redemption pipeline.
    pub redeem: WorkerConfig,
    /// Boost pipeline; off unless enabled explicitly.
    pub boost: WorkerConfig,
    /// Status cache refresh.
    pub status: WorkerConfig,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            unboost: WorkerConfig::every(30, true),
            redeem: WorkerConfig::every(30, true),
            boost: WorkerConfig::every(30, false),
            status: WorkerConfig::every(10, true),
        }
    }
}

/// Transaction lock and confirmation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransactionConfig {
    /// Seconds before a holder is force-released.
    pub lock_max_hold_secs: u64,
    /// Seconds a driver waits for the lock; `0` defers immediately.
    pub lock_wait_secs: u64,
    /// Whether steps wait for their receipt before advancing.
    pub await_confirmations: bool,
    /// Seconds one confirmation wait may take.
    pub confirmation_timeout_secs: u64,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            lock_max_hold_secs: 300,
            lock_wait_secs: 0,
            await_confirmations: true,
            confirmation_timeout_secs: 120,
        }
    }
}

impl TransactionConfig {
    /// How drivers acquire the transaction lock.
    #[must_use]
    pub const fn lock_mode(&self) -> AcquireMode {
        if self.lock_wait_secs == 0 {
            AcquireMode::NonBlocking
        } else {
            AcquireMode::Wait(Duration::from_secs(self.lock_wait_secs))
        }
    }
}

/// Retry limits for failed steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    /// Consecutive failures before a task fails; `0` never gives up.
    pub max_attempts: u32,
    /// Seconds before the first retry.
    pub backoff_base_secs: u64,
    /// Upper bound in seconds on the wait between retries.
    pub backoff_max_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            backoff_base_secs: policy.backoff_base.as_secs(),
            backoff_max_secs: policy.backoff_max.as_secs(),
        }
    }
}

impl RetryConfig {
    /// The equivalent [`RetryPolicy`].
    #[must_use]
    pub const fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            backoff_base: Duration::from_secs(self.backoff_base_secs),
            backoff_max: Duration::from_secs(self.backoff_max_secs),
        }
    }
}

/// Everything the engine needs to start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Account that holds and boosts the balance.
    pub account: String,
    /// Validator the boost is directed at.
    pub validator_pubkey: String,
    /// Requested execution mode.
    pub mode: ExecutionMode,
    /// Whether a signing capability is available.
    pub signer_configured: bool,
    /// SQLite database location.
    pub database_url: String,
    /// Seconds [`crate::worker::Scheduler::stop`] waits for each worker.
    pub stop_timeout_secs: u64,
    /// Worker schedules.
    pub workers: WorkersConfig,
    /// Lock and confirmation settings.
    pub transactions: TransactionConfig,
    /// Retry limits.
    pub retry: RetryConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            account: String::new(),
            validator_pubkey: String::new(),
            mode: ExecutionMode::default(),
            signer_configured: false,
            database_url: "stakeflow.db".to_owned(),
            stop_timeout_secs: 5,
            workers: WorkersConfig::default(),
            transactions: TransactionConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Loads `path`, applies process environment overrides and validates.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read or parsed, an
    /// override is malformed, or validation fails.
    pub fn load(path: &Utf8Path) -> ConfigResult<Self> {
        Self::load_with(path, &process_env)
    }

    /// Like [`Self::load`] with an explicit environment.
    ///
    /// # Errors
    ///
    /// See [`Self::load`].
    pub fn load_with(path: &Utf8Path, lookup: &EnvLookup<'_>) -> ConfigResult<Self> {
        let text = read_file(path)?;
        let mut config = Self::from_toml(&text).map_err(|err| ConfigError::Parse {
            path: path.to_owned(),
            source: Box::new(err),
        })?;
        config.apply_env(lookup)?;
        config.validate()?;
        tracing::info!(
            path = %path,
            mode = %config.effective_mode(),
            "configuration loaded"
        );
        Ok(config)
    }

    /// Parses a TOML document without overrides or validation.
    ///
    /// # Errors
    ///
    /// Returns the TOML parse error.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Applies `STAKEFLOW_*` overrides from `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnv`] for an unparseable value.
    pub fn apply_env(&mut self, lookup: &EnvLookup<'_>) -> ConfigResult<()> {
        env::apply(self, lookup)
    }

    /// Checks cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first violated rule.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.database_url.trim().is_empty() {
            return Err(ConfigError::Invalid("database_url must not be empty".to_owned()));
        }
        if self.workers.boost.enabled && self.account.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "account is required when the boost worker is enabled".to_owned(),
            ));
        }
        let schedules = [
            ("unboost", self.workers.unboost),
            ("redeem", self.workers.redeem),
            ("boost", self.workers.boost),
            ("status", self.workers.status),
        ];
        if let Some((name, _)) = schedules
            .iter()
            .find(|(_, worker)| worker.interval_secs == 0)
        {
            return Err(ConfigError::Invalid(format!(
                "workers.{name}.interval_secs must be positive"
            )));
        }
        let positive = [
            ("transactions.lock_max_hold_secs", self.transactions.lock_max_hold_secs),
            (
                "transactions.confirmation_timeout_secs",
                self.transactions.confirmation_timeout_secs,
            ),
            ("stop_timeout_secs", self.stop_timeout_secs),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Invalid(format!("{name} must be positive")));
        }
        if self.retry.backoff_base_secs > self.retry.backoff_max_secs {
            return Err(ConfigError::Invalid(
                "retry.backoff_base_secs must not exceed retry.backoff_max_secs".to_owned(),
            ));
        }
        Ok(())
    }

    /// Observation applies when requested or when no signer is available.
    #[must_use]
    pub const fn effective_mode(&self) -> ExecutionMode {
        if matches!(self.mode, ExecutionMode::Observation) || !self.signer_configured {
            ExecutionMode::Observation
        } else {
            ExecutionMode::Execution
        }
    }

    /// Returns `true` when pipelines must not submit operations.
    #[must_use]
    pub const fn is_observation(&self) -> bool {
        matches!(self.effective_mode(), ExecutionMode::Observation)
    }

    /// Settings handed to every pipeline driver.
    #[must_use]
    pub const fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            execution_enabled: !self.is_observation(),
            lock_mode: self.transactions.lock_mode(),
            await_confirmations: self.transactions.await_confirmations,
            confirmation_timeout: Duration::from_secs(self.transactions.confirmation_timeout_secs),
            retry: self.retry.policy(),
        }
    }

    /// How long a lock holder may keep the transaction lock.
    #[must_use]
    pub const fn lock_max_hold(&self) -> Duration {
        Duration::from_secs(self.transactions.lock_max_hold_secs)
    }

    /// Bound on each worker join during shutdown.
    #[must_use]
    pub const fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}

fn read_file(path: &Utf8Path) -> ConfigResult<String> {
    let read_error = |source| ConfigError::Read {
        path: path.to_owned(),
        source,
    };
    let file_name = path.file_name().ok_or_else(|| {
        read_error(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "path has no file name",
        ))
    })?;
    let parent = match path.parent() {
        Some(dir) if !dir.as_str().is_empty() => dir,
        _ => Utf8Path::new("."),
    };
    let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(read_error)?;
    dir.read_to_string(file_name).map_err(read_error)
}
