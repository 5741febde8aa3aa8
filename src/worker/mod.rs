//! Interval-driven workers for the pipeline drivers.
//!
//! The [`Scheduler`] runs one tokio task per registered [`Pipeline`]. Each
//! loop runs a pass when enabled, then waits for its interval or the stop
//! signal. Passes run in their own spawned task so a panic is reported as a
//! failed tick instead of ending the worker. A pass is cancelled together
//! with its loop, so nothing keeps running after [`Scheduler::stop`]
//! returns. Every pass produces a
//! [`TickReport`] that is logged here and published on a broadcast channel.

use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::Serialize;
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::clock::SharedClock;
use crate::pipeline::{Pipeline, PipelineResult, TickOutcome};

/// Default bound on how long [`Scheduler::stop`] waits for each worker.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

const REPORT_CAPACITY: usize = 64;

/// Structured result of one worker pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Name of the worker that ran.
    pub worker: &'static str,
    /// How the pass ended.
    pub outcome: TickOutcome,
    /// When the pass started.
    pub started_at: DateTime<Utc>,
    /// When the pass finished.
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug)]
struct WorkerHandle {
    enabled: Arc<AtomicBool>,
    interval: Duration,
    join: JoinHandle<()>,
}

/// Runs and controls the worker loops.
pub struct Scheduler {
    clock: SharedClock,
    stop_timeout: Duration,
    stop: watch::Sender<bool>,
    reports: broadcast::Sender<TickReport>,
    workers: BTreeMap<&'static str, WorkerHandle>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("stop_timeout", &self.stop_timeout)
            .field("workers", &self.workers)
            .finish_non_exhaustive()
    }
}

/// What [`Scheduler::stop`] had to do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StopSummary {
    /// Workers that exited on their own.
    pub stopped: usize,
    /// Workers aborted after the stop timeout.
    pub aborted: usize,
}

impl Scheduler {
    /// Creates a scheduler with no workers.
    #[must_use]
    pub fn new(clock: SharedClock, stop_timeout: Duration) -> Self {
        let (stop, _) = watch::channel(false);
        let (reports, _) = broadcast::channel(REPORT_CAPACITY);
        Self {
            clock,
            stop_timeout,
            stop,
            reports,
            workers: BTreeMap::new(),
        }
    }

    /// Starts a worker loop for `pipeline`.
    ///
    /// Must be called from within a tokio runtime. Registering a second
    /// worker under the same name replaces and aborts the first.
    pub fn spawn(&mut self, pipeline: Arc<dyn Pipeline>, interval: Duration, enabled: bool) {
        let name = pipeline.name();
        let flag = Arc::new(AtomicBool::new(enabled));
        let worker = WorkerLoop {
            pipeline,
            interval,
            enabled: Arc::clone(&flag),
            stop: self.stop.subscribe(),
            reports: self.reports.clone(),
            clock: Arc::clone(&self.clock),
        };
        let join = tokio::spawn(worker.run());
        tracing::info!(
            worker = name,
            interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
            enabled,
            "worker started"
        );
        let replaced = self.workers.insert(
            name,
            WorkerHandle {
                enabled: flag,
                interval,
                join,
            },
        );
        if let Some(previous) = replaced {
            tracing::warn!(worker = name, "worker registered twice; aborting the first loop");
            previous.join.abort();
        }
    }

    /// Subscribes to tick reports from every worker.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TickReport> {
        self.reports.subscribe()
    }

    /// Flips a worker between enabled and disabled without stopping it.
    ///
    /// Returns the new state, or `None` for an unknown worker.
    #[must_use]
    pub fn toggle(&self, name: &str) -> Option<bool> {
        let handle = self.workers.get(name)?;
        let enabled = !handle.enabled.fetch_xor(true, Ordering::AcqRel);
        tracing::info!(worker = name, enabled, "worker toggled");
        Some(enabled)
    }

    /// Whether the named worker is enabled.
    #[must_use]
    pub fn is_enabled(&self, name: &str) -> Option<bool> {
        self.workers
            .get(name)
            .map(|handle| handle.enabled.load(Ordering::Acquire))
    }

    /// The interval of the named worker.
    #[must_use]
    pub fn interval(&self, name: &str) -> Option<Duration> {
        self.workers.get(name).map(|handle| handle.interval)
    }

    /// Names of the registered workers in sorted order.
    #[must_use]
    pub fn worker_names(&self) -> Vec<&'static str> {
        self.workers.keys().copied().collect()
    }

    /// Signals every worker to stop and waits for each up to the stop
    /// timeout, aborting stragglers.
    pub async fn stop(self) -> StopSummary {
        self.stop.send_replace(true);
        let mut summary = StopSummary::default();
        for (name, handle) in self.workers {
            let mut join = handle.join;
            if tokio::time::timeout(self.stop_timeout, &mut join).await.is_ok() {
                summary.stopped += 1;
            } else {
                tracing::warn!(worker = name, "worker did not stop in time; aborting");
                join.abort();
                summary.aborted += 1;
            }
        }
        tracing::info!(stopped = summary.stopped, aborted = summary.aborted, "scheduler stopped");
        summary
    }
}

struct WorkerLoop {
    pipeline: Arc<dyn Pipeline>,
    interval: Duration,
    enabled: Arc<AtomicBool>,
    stop: watch::Receiver<bool>,
    reports: broadcast::Sender<TickReport>,
    clock: SharedClock,
}

impl WorkerLoop {
    async fn run(mut self) {
        let name = self.pipeline.name();
        loop {
            if *self.stop.borrow() {
                break;
            }
            if self.enabled.load(Ordering::Acquire) {
                let report = self.pass().await;
                publish(&self.reports, report);
            }
            tokio::select! {
                changed = self.stop.changed() => {
                    if changed.is_err() || *self.stop.borrow() {
                        break;
                    }
                }
                () = tokio::time::sleep(self.interval) => {}
            }
        }
        tracing::info!(worker = name, "worker stopped");
    }

    async fn pass(&self) -> TickReport {
        let started_at = self.clock.utc();
        let pipeline = Arc::clone(&self.pipeline);
        let mut task = PassTask(tokio::spawn(async move { pipeline.run_once().await }));
        let outcome = match (&mut task.0).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => TickOutcome::Failed(err.to_string()),
            Err(join_err) if join_err.is_panic() => TickOutcome::Failed(format!(
                "pass panicked: {}",
                panic_message(join_err.into_panic().as_ref())
            )),
            Err(_) => TickOutcome::Failed("pass cancelled".to_owned()),
        };
        TickReport {
            worker: self.pipeline.name(),
            outcome,
            started_at,
            finished_at: self.clock.utc(),
        }
    }
}

/// Aborts the spawned pass when dropped.
struct PassTask(JoinHandle<PipelineResult<TickOutcome>>);

impl Drop for PassTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic payload")
}

fn publish(reports: &broadcast::Sender<TickReport>, report: TickReport) {
    match &report.outcome {
        TickOutcome::Completed(summary) if summary.is_idle() => {
            tracing::debug!(worker = report.worker, "tick idle");
        }
        TickOutcome::Completed(summary) => {
            tracing::info!(worker = report.worker, %summary, "tick completed");
        }
        TickOutcome::Skipped(reason) => {
            tracing::info!(worker = report.worker, reason = %reason, "tick skipped");
        }
        TickOutcome::Failed(reason) => {
            tracing::error!(worker = report.worker, reason = %reason, "tick failed");
        }
    }
    if reports.send(report).is_err() {
        tracing::trace!("no tick report subscribers");
    }
}
