//! Fixed-interval trigger for the batch pipeline

use crate::pipeline::BatchPipeline;

use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

/// Totals for one scheduler run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub cycles: usize,
    pub failed_cycles: usize,
}

/// Runs a cycle at start and then every `interval`.
///
/// Cycles execute inline in the loop, so at most one is in flight; a tick
/// that comes due while a cycle overruns is skipped rather than queued.
pub struct BatchScheduler {
    pipeline: BatchPipeline,
    interval: Duration,
}

impl BatchScheduler {
    pub fn new(pipeline: BatchPipeline, interval: Duration) -> Self {
        Self { pipeline, interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Loop until `shutdown` resolves. Shutdown is observed between cycles.
    pub async fn run_until<F>(&self, shutdown: F) -> SchedulerStats
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            interval_secs = self.interval.as_secs(),
            window_secs = self.pipeline.window().num_seconds(),
            "Batch scheduler started"
        );

        let mut stats = SchedulerStats::default();
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                // The first tick completes immediately.
                _ = ticker.tick() => {
                    stats.cycles += 1;
                    if let Err(e) = self.pipeline.run_cycle_now().await {
                        stats.failed_cycles += 1;
                        error!(error = %e, "Batch cycle failed");
                    }
                }
            }
        }

        info!(
            cycles = stats.cycles,
            failed_cycles = stats.failed_cycles,
            "Batch scheduler stopped"
        );
        stats
    }
}
