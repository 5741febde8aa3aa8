//! Bounded retry of failed ledger steps.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::task::domain::TaskId;

/// How often a task's failing step is retried before it is failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Consecutive failures allowed before the task is failed; `0` retries
    /// forever.
    pub max_attempts: u32,
    /// Wait before the first retry; doubles with every further failure.
    /// Zero retries on the next tick.
    pub backoff_base: Duration,
    /// Upper bound on the wait between retries.
    pub backoff_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            backoff_base: Duration::ZERO,
            backoff_max: Duration::from_secs(600),
        }
    }
}

impl RetryPolicy {
    /// Wait required after `failures` consecutive failures.
    #[must_use]
    pub fn backoff(&self, failures: u32) -> Duration {
        if failures == 0 || self.backoff_base.is_zero() {
            return Duration::ZERO;
        }
        let factor = 2_u32.saturating_pow(failures.saturating_sub(1));
        self.backoff_base
            .checked_mul(factor)
            .map_or(self.backoff_max, |wait| wait.min(self.backoff_max))
    }

    /// Returns `true` once `failures` reaches the attempt limit.
    #[must_use]
    pub const fn is_exhausted(&self, failures: u32) -> bool {
        self.max_attempts != 0 && failures >= self.max_attempts
    }
}

#[derive(Debug, Clone, Copy)]
struct Failures {
    count: u32,
    last: DateTime<Utc>,
}

/// Consecutive step failures per task, kept in memory.
///
/// Counters reset on success and on restart.
#[derive(Debug, Default)]
pub struct FailureTracker {
    policy: RetryPolicy,
    failures: Mutex<HashMap<TaskId, Failures>>,
}

impl FailureTracker {
    /// Creates an empty tracker applying `policy`.
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// The policy applied by this tracker.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Whether the task's backoff has elapsed at `now`.
    #[must_use]
    pub fn is_ready(&self, task_id: &TaskId, now: DateTime<Utc>) -> bool {
        let failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        failures.get(task_id).is_none_or(|entry| {
            let since = (now - entry.last).to_std().unwrap_or_default();
            since >= self.policy.backoff(entry.count)
        })
    }

    /// Records a failure and returns the consecutive count.
    pub fn record(&self, task_id: &TaskId, now: DateTime<Utc>) -> u32 {
        let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = failures.entry(task_id.clone()).or_insert(Failures {
            count: 0,
            last: now,
        });
        entry.count = entry.count.saturating_add(1);
        entry.last = now;
        entry.count
    }

    /// Consecutive failures recorded for the task.
    #[must_use]
    pub fn count(&self, task_id: &TaskId) -> u32 {
        let failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        failures.get(task_id).map_or(0, |entry| entry.count)
    }

    /// Forgets the task's failures.
    pub fn clear(&self, task_id: &TaskId) {
        let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        failures.remove(task_id);
    }
}
