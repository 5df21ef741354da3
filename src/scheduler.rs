// src/scheduler.rs
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::pipeline::{IngestPipeline, RunOutcome};

/// Spawn the periodic scraper. The first tick fires immediately; runs execute inline,
/// so a slow run delays the next tick instead of overlapping it.
pub fn spawn_scheduler(pipeline: Arc<IngestPipeline>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(target: "scraper", interval_secs = every.as_secs(), "scheduler started");
        loop {
            ticker.tick().await;
            let outcome = pipeline.run().await;
            let stats = outcome.stats();
            tracing::info!(
                target: "scraper",
                outcome = outcome.label(),
                processed = stats.processed,
                skipped = stats.skipped,
                errors = stats.errors,
                "scheduled tick"
            );
        }
    })
}

/// Fire a one-off run in the background (admin trigger). The guard still applies.
pub fn spawn_manual_run(pipeline: Arc<IngestPipeline>) -> JoinHandle<RunOutcome> {
    tokio::spawn(async move {
        let outcome = pipeline.run().await;
        tracing::info!(target: "scraper", outcome = outcome.label(), "manual run finished");
        outcome
    })
}
