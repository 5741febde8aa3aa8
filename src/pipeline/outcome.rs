//! Structured results of one pipeline pass.

use serde::Serialize;
use std::fmt;

/// Counters describing what one pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickSummary {
    /// Tasks looked at.
    pub examined: usize,
    /// Tasks moved forward or completed.
    pub advanced: usize,
    /// Tasks still waiting on a ledger condition or balance.
    pub waiting: usize,
    /// Steps that failed and will be retried.
    pub failed: usize,
    /// Tasks skipped because their retry backoff has not elapsed.
    pub backing_off: usize,
    /// Tasks given up on and completed as failed.
    pub escalated: usize,
    /// Tasks another pass changed before this one could submit.
    pub stale: usize,
    /// Whether the pass stopped early because the transaction lock was busy.
    pub lock_busy: bool,
}

impl TickSummary {
    /// Returns `true` when the pass neither examined nor changed anything.
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        self.examined == 0 && !self.lock_busy
    }
}

impl fmt::Display for TickSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "examined={} advanced={} waiting={} failed={} backing_off={} escalated={} stale={}",
            self.examined,
            self.advanced,
            self.waiting,
            self.failed,
            self.backing_off,
            self.escalated,
            self.stale
        )?;
        if self.lock_busy {
            f.write_str(" lock_busy")?;
        }
        Ok(())
    }
}

/// How a pass ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum TickOutcome {
    /// The pass ran.
    Completed(TickSummary),
    /// The pass chose not to act, for example in observation mode.
    Skipped(String),
    /// The pass failed or panicked.
    Failed(String),
}

impl TickOutcome {
    /// Returns the summary of a completed pass.
    #[must_use]
    pub const fn summary(&self) -> Option<&TickSummary> {
        match self {
            Self::Completed(summary) => Some(summary),
            Self::Skipped(_) | Self::Failed(_) => None,
        }
    }
}
