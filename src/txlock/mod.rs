//! Process-wide serialization of ledger submissions.
//!
//! Every pipeline that submits a transaction first takes the
//! [`TransactionLock`], so two workers never race on the account's nonce or
//! on the same queue. A holder that keeps the lock longer than its
//! `max_hold` is presumed stuck and is force-released by the next acquire
//! attempt.

use chrono::{DateTime, Utc};
use mockable::Clock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::clock::SharedClock;

/// Default upper bound on how long one holder may keep the lock.
pub const DEFAULT_MAX_HOLD: Duration = Duration::from_secs(300);

/// How [`TransactionLock::acquire`] behaves when the lock is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireMode {
    /// Return `false` immediately.
    NonBlocking,
    /// Wait up to the given duration.
    Wait(Duration),
    /// Wait until the lock is free or the holder expires.
    WaitForever,
}

#[derive(Debug, Clone)]
struct Holder {
    owner: String,
    acquired_at: DateTime<Utc>,
    generation: u64,
}

enum Attempt {
    Acquired(u64),
    Held { owner: String, expires_in: Duration },
}

/// A named mutual-exclusion lock with forced release of expired holders.
///
/// The lock is not re-entrant: an owner that already holds it is treated
/// like any other contender.
pub struct TransactionLock {
    name: String,
    max_hold: Duration,
    clock: SharedClock,
    holder: Mutex<Option<Holder>>,
    released: Notify,
    generations: AtomicU64,
    force_releases: AtomicU64,
}

impl std::fmt::Debug for TransactionLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionLock")
            .field("name", &self.name)
            .field("max_hold", &self.max_hold)
            .field("holder", &self.holder())
            .finish_non_exhaustive()
    }
}

impl TransactionLock {
    /// Creates an unlocked lock.
    #[must_use]
    pub fn new(name: impl Into<String>, max_hold: Duration, clock: SharedClock) -> Self {
        Self {
            name: name.into(),
            max_hold,
            clock,
            holder: Mutex::new(None),
            released: Notify::new(),
            generations: AtomicU64::new(0),
            force_releases: AtomicU64::new(0),
        }
    }

    /// The lock's name, used in logs.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The configured maximum hold time.
    #[must_use]
    pub const fn max_hold(&self) -> Duration {
        self.max_hold
    }

    /// Current holder, if any.
    #[must_use]
    pub fn holder(&self) -> Option<String> {
        self.state().as_ref().map(|holder| holder.owner.clone())
    }

    /// Returns `true` when someone holds the lock.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.state().is_some()
    }

    /// Number of holders released because they exceeded `max_hold`.
    #[must_use]
    pub fn force_release_count(&self) -> u64 {
        self.force_releases.load(Ordering::Relaxed)
    }

    /// Tries to take the lock for `owner`.
    ///
    /// Returns `false` when the lock is still held once `mode` gives up.
    /// Contention is logged with the current holder.
    pub async fn acquire(&self, owner: &str, mode: AcquireMode) -> bool {
        self.acquire_generation(owner, mode).await.is_some()
    }

    /// Takes the lock and returns a guard that releases it on drop.
    pub async fn lock(self: &Arc<Self>, owner: &str, mode: AcquireMode) -> Option<TxLockGuard> {
        let generation = self.acquire_generation(owner, mode).await?;
        Some(TxLockGuard {
            lock: Arc::clone(self),
            owner: owner.to_owned(),
            generation,
        })
    }

    /// Releases the lock held by `owner`.
    ///
    /// Releasing an unlocked lock, or one held by someone else, is logged
    /// and ignored.
    pub fn release(&self, owner: &str) {
        self.release_matching(owner, |_| true);
    }

    async fn acquire_generation(&self, owner: &str, mode: AcquireMode) -> Option<u64> {
        let deadline = match mode {
            AcquireMode::Wait(timeout) => Instant::now().checked_add(timeout),
            AcquireMode::NonBlocking | AcquireMode::WaitForever => None,
        };
        loop {
            let mut released = std::pin::pin!(self.released.notified());
            released.as_mut().enable();

            let (holder, expires_in) = match self.try_take(owner) {
                Attempt::Acquired(generation) => {
                    tracing::info!(lock = %self.name, owner, "transaction lock acquired");
                    return Some(generation);
                }
                Attempt::Held { owner: holder, expires_in } => (holder, expires_in),
            };
            tracing::info!(
                lock = %self.name,
                owner,
                holder = %holder,
                "transaction lock busy"
            );

            let wait = match (mode, deadline) {
                (AcquireMode::NonBlocking, _) => return None,
                (_, Some(until)) => {
                    let left = until.saturating_duration_since(Instant::now());
                    if left.is_zero() {
                        tracing::warn!(lock = %self.name, owner, "timed out waiting for transaction lock");
                        return None;
                    }
                    left.min(expires_in)
                }
                (_, None) => expires_in,
            };
            tokio::select! {
                () = &mut released => {}
                () = tokio::time::sleep(wait) => {}
            }
        }
    }

    fn try_take(&self, owner: &str) -> Attempt {
        let now = self.clock.utc();
        let mut state = self.state();
        if let Some(current) = state.as_ref() {
            let held_for = (now - current.acquired_at).to_std().unwrap_or_default();
            if held_for <= self.max_hold {
                return Attempt::Held {
                    owner: current.owner.clone(),
                    expires_in: self
                        .max_hold
                        .saturating_sub(held_for)
                        .max(Duration::from_millis(1)),
                };
            }
            tracing::warn!(
                lock = %self.name,
                holder = %current.owner,
                held_secs = held_for.as_secs(),
                "transaction lock held past its maximum; forcing release"
            );
            self.force_releases.fetch_add(1, Ordering::Relaxed);
        }
        let generation = self.generations.fetch_add(1, Ordering::Relaxed);
        *state = Some(Holder {
            owner: owner.to_owned(),
            acquired_at: now,
            generation,
        });
        Attempt::Acquired(generation)
    }

    fn release_matching(&self, owner: &str, same_hold: impl Fn(&Holder) -> bool) {
        let mut state = self.state();
        match state.as_ref() {
            None => {
                tracing::warn!(lock = %self.name, owner, "release of an unlocked transaction lock");
            }
            Some(current) if current.owner != owner || !same_hold(current) => {
                tracing::warn!(
                    lock = %self.name,
                    owner,
                    holder = %current.owner,
                    "release of a transaction lock held by someone else"
                );
            }
            Some(_) => {
                *state = None;
                drop(state);
                tracing::info!(lock = %self.name, owner, "transaction lock released");
                self.released.notify_waiters();
            }
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, Option<Holder>> {
        self.holder.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Holds the [`TransactionLock`] until dropped.
///
/// A guard whose hold was force-released does not release the next holder.
#[derive(Debug)]
pub struct TxLockGuard {
    lock: Arc<TransactionLock>,
    owner: String,
    generation: u64,
}

impl TxLockGuard {
    /// The owner this guard was issued to.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }
}

impl Drop for TxLockGuard {
    fn drop(&mut self) {
        let generation = self.generation;
        self.lock
            .release_matching(&self.owner, |holder| holder.generation == generation);
    }
}

#[cfg(test)]
mod tests;
