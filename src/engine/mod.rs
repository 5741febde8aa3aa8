//! Service wiring and the caller-facing facade.
//!
//! [`Engine`] owns every long-lived service explicitly: the transaction lock,
//! the condition oracle, the three pipeline drivers, the status cache and,
//! once started, the worker scheduler. Callers such as an HTTP layer talk to
//! the engine only.

mod error;

pub use error::{EngineError, EngineResult};

use chrono::NaiveDate;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;

use crate::clock::SharedClock;
use crate::config::{EngineConfig, ExecutionMode, WorkerConfig};
use crate::ledger::{ports::LedgerClient, services::ConditionOracle};
use crate::pipeline::{
    BoostPipeline, Pipeline, PipelineContext, RedeemPipeline, RewardClaim, TickOutcome,
    UnboostPipeline,
};
use crate::status::{StatusCache, StatusSnapshot};
use crate::task::{
    domain::{Amount, Receiver, Task, TaskEvent, TaskId, TaskMetadata, TaskType, TxRef},
    ports::TaskStore,
    services::{
        CreateTaskRequest, HistoryPage, HistoryRequest, StatisticsReport, TaskLifecycleService,
        TaskLookup,
    },
};
use crate::txlock::TransactionLock;
use crate::worker::{Scheduler, StopSummary, TickReport};

/// Name of the lock serialising ledger submissions.
pub const LEDGER_LOCK: &str = "ledger";

/// Lock owner used for on-demand reward claims.
pub const REWARDS_OWNER: &str = "rewards";

/// The task lifecycle engine.
pub struct Engine {
    config: EngineConfig,
    clock: SharedClock,
    account: Option<Receiver>,
    tasks: TaskLifecycleService,
    lock: Arc<TransactionLock>,
    unboost: Arc<UnboostPipeline>,
    redeem: Arc<RedeemPipeline>,
    boost: Option<Arc<BoostPipeline>>,
    rewards: PipelineContext,
    status: Arc<StatusCache>,
    scheduler: Mutex<Option<Scheduler>>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("mode", &self.mode())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Wires the engine's services.
    ///
    /// The boost driver is only built when an account is configured.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] when `config` fails validation or
    /// [`EngineError::Domain`] when the account is malformed.
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn TaskStore>,
        ledger: Arc<dyn LedgerClient>,
        clock: SharedClock,
    ) -> EngineResult<Self> {
        config.validate()?;
        let lock = Arc::new(TransactionLock::new(
            LEDGER_LOCK,
            config.lock_max_hold(),
            Arc::clone(&clock),
        ));
        let oracle = ConditionOracle::new(ledger);
        let settings = config.pipeline_settings();
        let context = || {
            PipelineContext::new(
                Arc::clone(&store),
                oracle.clone(),
                Arc::clone(&lock),
                Arc::clone(&clock),
                settings,
            )
        };
        let account = if config.account.trim().is_empty() {
            None
        } else {
            Some(Receiver::new(config.account.as_str())?)
        };
        let boost = account
            .clone()
            .map(|account| Arc::new(BoostPipeline::new(context(), account)));
        let rewards = context();
        let unboost = Arc::new(UnboostPipeline::new(context()));
        let redeem = Arc::new(RedeemPipeline::new(context()));
        let status = Arc::new(StatusCache::new(
            oracle.clone(),
            Arc::clone(&clock),
            config.effective_mode(),
        ));
        tracing::info!(
            mode = %config.effective_mode(),
            boost = boost.is_some(),
            "engine wired"
        );
        Ok(Self {
            tasks: TaskLifecycleService::new(Arc::clone(&store)),
            config,
            clock,
            account,
            lock,
            unboost,
            redeem,
            boost,
            rewards,
            status,
            scheduler: Mutex::new(None),
        })
    }

    /// The configuration the engine was built with.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Whether operations are submitted or only observed.
    #[must_use]
    pub const fn mode(&self) -> ExecutionMode {
        self.config.effective_mode()
    }

    /// The clock every service reads.
    #[must_use]
    pub const fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// The lock serialising ledger submissions.
    #[must_use]
    pub const fn transaction_lock(&self) -> &Arc<TransactionLock> {
        &self.lock
    }

    /// Returns `true` while the scheduler is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.scheduler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Starts the `unboost`, `redeem`, `boost` and `status` workers.
    ///
    /// Must be called from within a tokio runtime. Returns a receiver of
    /// tick reports.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::AlreadyRunning`] when called twice without a
    /// shutdown in between.
    pub fn start(&self) -> EngineResult<broadcast::Receiver<TickReport>> {
        let mut slot = self.scheduler.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Err(EngineError::AlreadyRunning);
        }
        let mut scheduler = Scheduler::new(Arc::clone(&self.clock), self.config.stop_timeout());
        let reports = scheduler.subscribe();
        for (pipeline, schedule) in self.workers() {
            scheduler.spawn(pipeline, schedule.interval(), schedule.enabled);
        }
        tracing::info!(workers = ?scheduler.worker_names(), "engine started");
        *slot = Some(scheduler);
        Ok(reports)
    }

    /// Subscribes to tick reports of the running scheduler.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotRunning`] before [`Self::start`].
    pub fn subscribe(&self) -> EngineResult<broadcast::Receiver<TickReport>> {
        self.scheduler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(Scheduler::subscribe)
            .ok_or(EngineError::NotRunning)
    }

    /// Stops the scheduler, waiting a bounded time for each worker.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotRunning`] when nothing was started.
    pub async fn shutdown(&self) -> EngineResult<StopSummary> {
        let scheduler = self
            .scheduler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(EngineError::NotRunning)?;
        Ok(scheduler.stop().await)
    }

    /// Enables or disables a worker without stopping it.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotRunning`] before [`Self::start`] or
    /// [`EngineError::UnknownWorker`] for an unregistered name.
    pub fn toggle_worker(&self, name: &str) -> EngineResult<bool> {
        let slot = self.scheduler.lock().unwrap_or_else(PoisonError::into_inner);
        let scheduler = slot.as_ref().ok_or(EngineError::NotRunning)?;
        scheduler
            .toggle(name)
            .ok_or_else(|| EngineError::UnknownWorker(name.to_owned()))
    }

    /// Runs one pass of the named worker outside the scheduler.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownWorker`] for an unknown name or
    /// [`EngineError::Pipeline`] when the pass fails.
    pub async fn run_worker_once(&self, name: &str) -> EngineResult<TickOutcome> {
        let pipeline = self
            .workers()
            .into_iter()
            .map(|(pipeline, _)| pipeline)
            .find(|pipeline| pipeline.name() == name)
            .ok_or_else(|| EngineError::UnknownWorker(name.to_owned()))?;
        Ok(pipeline.run_once().await?)
    }

    /// Validates input and creates a pending UNBOOST task.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ObservationMode`] when the engine may not
    /// submit operations, or [`EngineError::Tasks`] for invalid input or a
    /// store failure.
    pub async fn create_unboost_task(
        &self,
        amount: &str,
        receiver: &str,
        metadata: TaskMetadata,
    ) -> EngineResult<Task> {
        if self.config.is_observation() {
            tracing::warn!(amount, receiver, "unboost request refused in observation mode");
            return Err(EngineError::ObservationMode);
        }
        let request =
            CreateTaskRequest::new(TaskType::Unboost, amount, receiver).with_metadata(metadata);
        Ok(self.tasks.create(request).await?)
    }

    /// Finds a task in flight or in the archive.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Tasks`] when the store read fails.
    pub async fn get_task(&self, task_id: &TaskId) -> EngineResult<Option<TaskLookup>> {
        Ok(self.tasks.lookup(task_id).await?)
    }

    /// Returns a task's events oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Tasks`] when the store read fails.
    pub async fn get_events(&self, task_id: &TaskId) -> EngineResult<Vec<TaskEvent>> {
        Ok(self.tasks.events(task_id).await?)
    }

    /// Lists every in-flight task oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Tasks`] when the store read fails.
    pub async fn list_active_tasks(&self) -> EngineResult<Vec<Task>> {
        Ok(self.tasks.active().await?)
    }

    /// Returns one page of archived tasks.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Tasks`] for invalid paging or a store failure.
    pub async fn list_history(&self, request: HistoryRequest) -> EngineResult<HistoryPage> {
        Ok(self.tasks.history(request).await?)
    }

    /// Returns daily statistics in the inclusive range with their sums.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Tasks`] when the store read fails.
    pub async fn get_statistics(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> EngineResult<StatisticsReport> {
        Ok(self.tasks.statistics(from, to).await?)
    }

    /// Returns the cached ledger status, refreshing on first use.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Ledger`] when the first refresh fails.
    pub async fn get_status_snapshot(&self) -> EngineResult<StatusSnapshot> {
        Ok(self.status.snapshot().await?)
    }

    /// Rewards earned by the configured account and not yet claimed.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Ledger`] when the ledger read fails.
    pub async fn get_earned_rewards(&self) -> EngineResult<Amount> {
        Ok(self.rewards.oracle().earned().await?)
    }

    /// Claims accrued rewards, paying `recipient` or the configured account.
    ///
    /// The claim is serialised with the workers through the transaction
    /// lock.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ObservationMode`] when the engine may not
    /// submit, [`EngineError::NoAccount`] when no recipient is known,
    /// [`EngineError::Domain`] for a blank recipient,
    /// [`EngineError::LockBusy`] when the lock could not be taken and
    /// [`EngineError::RewardClaim`] when the claim failed on the ledger.
    pub async fn claim_rewards(&self, recipient: Option<&str>) -> EngineResult<TxRef> {
        if self.config.is_observation() {
            tracing::warn!(recipient, "reward claim refused in observation mode");
            return Err(EngineError::ObservationMode);
        }
        let receiver = recipient.map_or_else(
            || self.account.clone().ok_or(EngineError::NoAccount),
            |value| Ok(Receiver::new(value)?),
        )?;
        match self.rewards.claim_reward(REWARDS_OWNER, receiver.clone()).await {
            RewardClaim::Claimed(tx_ref) => {
                tracing::info!(receiver = %receiver, tx_ref = %tx_ref, "rewards claimed");
                Ok(tx_ref)
            }
            RewardClaim::LockBusy => Err(EngineError::LockBusy),
            RewardClaim::Failed(reason) => {
                tracing::warn!(receiver = %receiver, reason = %reason, "reward claim failed");
                Err(EngineError::RewardClaim(reason))
            }
        }
    }

    fn workers(&self) -> Vec<(Arc<dyn Pipeline>, WorkerConfig)> {
        let schedules = &self.config.workers;
        let mut workers: Vec<(Arc<dyn Pipeline>, WorkerConfig)> = vec![
            (self.unboost.clone(), schedules.unboost),
            (self.redeem.clone(), schedules.redeem),
            (self.status.clone(), schedules.status),
        ];
        if let Some(boost) = &self.boost {
            workers.push((boost.clone(), schedules.boost));
        }
        workers
    }
}

#[cfg(test)]
mod tests;
