//! Resume scheduler
//!
//! Polls the store on a fixed interval for paused executions whose resume
//! time has passed and hands them back to the [`ExecutionRunner`]. This is
//! the only way a suspended execution continues.
//!
//! A tick only claims. Every claimed execution is resumed on its own task
//! under the runner's shared permits, so a stuck collaborator call holds up
//! that execution alone and never the next tick.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, instrument, warn, Instrument};
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::engine::{EngineError, ExecutionRunner, RunOutcome};
use crate::persistence::{ExecutionStore, StoreError};

/// Scheduler errors
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("resume scheduler is already running")]
    AlreadyRunning,

    #[error("resume scheduler is not running")]
    NotRunning,

    /// Claiming due executions failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Tally of the resumes dispatched by one tick
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickReport {
    /// Executions claimed for resumption
    pub claimed: usize,
    pub completed: usize,
    pub suspended: usize,
    pub failed: usize,

    /// Executions whose resumption raised an error
    pub errors: usize,
}

impl TickReport {
    fn record(&mut self, outcome: &RunOutcome) {
        match outcome {
            RunOutcome::Completed => self.completed += 1,
            RunOutcome::Suspended { .. } => self.suspended += 1,
            RunOutcome::Failed { .. } => self.failed += 1,
        }
    }
}

type ResumeResult = (Uuid, Result<RunOutcome, EngineError>);

/// Resumes started by one tick
///
/// Dropping this detaches the resumes; they keep running and log their own
/// outcome.
#[derive(Debug)]
pub struct DispatchedTick {
    claimed: usize,
    handles: Vec<JoinHandle<ResumeResult>>,
}

impl DispatchedTick {
    /// Executions claimed by the tick
    pub fn claimed(&self) -> usize {
        self.claimed
    }

    pub fn is_empty(&self) -> bool {
        self.claimed == 0
    }

    /// Wait for every dispatched resume and tally the outcomes
    pub async fn wait(self) -> TickReport {
        let mut report = TickReport {
            claimed: self.claimed,
            ..Default::default()
        };

        for handle in self.handles {
            match handle.await {
                Ok((_, Ok(outcome))) => report.record(&outcome),
                Ok((_, Err(_))) => report.errors += 1,
                Err(e) => {
                    error!(error = %e, "resume task panicked");
                    report.errors += 1;
                }
            }
        }

        report
    }
}

/// Periodically resumes due executions
///
/// # Example
///
/// ```ignore
/// let scheduler = Arc::new(ResumeScheduler::new(runner, SchedulerConfig::default()));
/// scheduler.start()?;
///
/// // ... later
/// scheduler.stop().await?;
/// ```
pub struct ResumeScheduler {
    runner: Arc<ExecutionRunner>,
    store: Arc<dyn ExecutionStore>,
    config: SchedulerConfig,
    shutdown_tx: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
    tasks: TaskTracker,
}

impl ResumeScheduler {
    /// Create a scheduler resuming executions from the runner's store
    pub fn new(runner: Arc<ExecutionRunner>, config: SchedulerConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            store: Arc::clone(runner.store()),
            runner,
            config,
            shutdown_tx,
            handle: Mutex::new(None),
            tasks: TaskTracker::new(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.handle.lock().is_some()
    }

    /// Resumes dispatched and not yet finished
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Start the polling loop
    ///
    /// The first tick runs immediately. Calling `start` on a running
    /// scheduler returns [`SchedulerError::AlreadyRunning`].
    pub fn start(self: &Arc<Self>) -> Result<(), SchedulerError> {
        let mut handle = self.handle.lock();
        if handle.is_some() {
            return Err(SchedulerError::AlreadyRunning);
        }

        self.shutdown_tx.send_replace(false);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let scheduler = Arc::clone(self);

        info!(
            interval_ms = self.config.interval.as_millis() as u64,
            batch_size = self.config.batch_size,
            "starting resume scheduler"
        );

        *handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(scheduler.config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match scheduler.tick(Utc::now()).await {
                            // Dropping the dispatch detaches the resumes
                            Ok(dispatched) if !dispatched.is_empty() => {
                                info!(claimed = dispatched.claimed(), "dispatched due executions");
                            }
                            Ok(_) => debug!("no due executions"),
                            Err(e) => error!(error = %e, "resume tick failed"),
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            debug!("resume scheduler shutdown requested");
                            break;
                        }
                    }
                }
            }
        }));

        Ok(())
    }

    /// Stop the polling loop
    ///
    /// Waits for the claim phase of the current tick, then gives in-flight
    /// resumes up to `shutdown_timeout` to finish. Resumes still running
    /// after that are left to finish on their own.
    pub async fn stop(&self) -> Result<(), SchedulerError> {
        let handle = self
            .handle
            .lock()
            .take()
            .ok_or(SchedulerError::NotRunning)?;

        let _ = self.shutdown_tx.send(true);
        if let Err(e) = handle.await {
            warn!(error = %e, "resume scheduler loop ended abnormally");
        }

        self.tasks.close();
        let drained = tokio::time::timeout(self.config.shutdown_timeout, self.tasks.wait()).await;
        self.tasks.reopen();

        if drained.is_err() {
            warn!(
                in_flight = self.tasks.len(),
                timeout_ms = self.config.shutdown_timeout.as_millis() as u64,
                "Shutdown timeout reached, leaving resumes running"
            );
        }

        info!("resume scheduler stopped");
        Ok(())
    }

    /// Claim due executions and dispatch a resume for each of them
    ///
    /// Returns once the claim is done. Each resume waits for a permit on its
    /// own task; errors are logged per execution and never affect the others.
    #[instrument(skip(self))]
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<DispatchedTick, SchedulerError> {
        let claimed = self.store.claim_due(now, self.config.batch_size).await?;
        if claimed.is_empty() {
            return Ok(DispatchedTick {
                claimed: 0,
                handles: Vec::new(),
            });
        }

        debug!(count = claimed.len(), "claimed due executions");

        let mut handles = Vec::with_capacity(claimed.len());
        for execution in claimed {
            let runner = Arc::clone(&self.runner);
            let execution_id = execution.id;
            handles.push(
                self.tasks.spawn(
                    async move {
                        // Held until the resume returns
                        let _permit = runner.permits().clone().acquire_owned().await;

                        let result = runner.resume(execution).await;
                        match &result {
                            Ok(outcome) => debug!(%execution_id, ?outcome, "resume finished"),
                            Err(e) => {
                                error!(%execution_id, error = %e, "failed to resume execution")
                            }
                        }
                        (execution_id, result)
                    }
                    .in_current_span(),
                ),
            );
        }

        Ok(DispatchedTick {
            claimed: handles.len(),
            handles,
        })
    }
}
