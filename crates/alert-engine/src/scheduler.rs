//! Fixed-interval tick scheduler

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::evaluator::{Evaluator, TickOutcome};

/// How often evaluation history is pruned while the scheduler runs
const PRUNE_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Drives [`Evaluator::run_tick`] on a fixed interval
pub struct Scheduler {
    evaluator: Arc<Evaluator>,
    interval: Duration,
}

impl Scheduler {
    pub fn new(evaluator: Arc<Evaluator>, interval: Duration) -> Self {
        Self {
            evaluator,
            interval,
        }
    }

    /// Spawns the timer loop. Ticks are spawned so a slow tick never delays
    /// the timer; a tick that comes due while one is running is skipped by
    /// the evaluator's in-flight guard.
    pub fn start(self) -> SchedulerHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        info!(interval_secs = self.interval.as_secs_f64(), "Starting rule scheduler");

        let task = tokio::spawn(async move {
            let mut ticker = interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            let mut pruner = interval(PRUNE_INTERVAL);
            pruner.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let evaluator = self.evaluator.clone();
                        tokio::spawn(async move {
                            match evaluator.run_tick().await {
                                Ok(TickOutcome::Completed(_)) => {}
                                Ok(TickOutcome::Skipped) => debug!("Scheduled tick skipped"),
                                Err(e) => error!(error = %e, "Scheduled tick failed"),
                            }
                        });
                    }
                    _ = pruner.tick() => {
                        if let Err(e) = self.evaluator.prune_history().await {
                            error!(error = %e, "Failed to prune evaluation history");
                        }
                    }
                }
            }

            info!("Rule scheduler stopped");
        });

        SchedulerHandle { cancel, task }
    }
}

/// Handle to a running [`Scheduler`]
pub struct SchedulerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stops scheduling new ticks and waits for the timer loop to exit.
    ///
    /// A tick already in flight finishes on its own.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            error!(error = %e, "Scheduler task ended abnormally");
        }
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}
