// src/guard.rs
//! Storage-backed mutual exclusion between pipeline runs.
//!
//! A run is "active" while its record has no `completed_at` and started within the
//! staleness window. Older unfinished runs are treated as crashed and do not block.

use chrono::Duration as ChronoDuration;

use crate::clock::SharedClock;
use crate::error::StoreError;
use crate::models::RunRecord;
use crate::store::{DynStore, RunClaim};

pub const DEFAULT_STALE_AFTER_MINUTES: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquire {
    Acquired(RunRecord),
    Busy(RunRecord),
}

pub struct RunGuard {
    store: DynStore,
    clock: SharedClock,
    stale_after: ChronoDuration,
}

impl RunGuard {
    pub fn new(store: DynStore, clock: SharedClock, stale_after: ChronoDuration) -> Self {
        Self {
            store,
            clock,
            stale_after,
        }
    }

    pub fn stale_after(&self) -> ChronoDuration {
        self.stale_after
    }

    /// Claim a new run unless a non-stale one is in progress. The check and the insert
    /// happen atomically inside the store.
    pub async fn try_acquire(&self) -> Result<Acquire, StoreError> {
        let now = self.clock.now();
        let stale_before = now - self.stale_after;
        match self.store.claim_run(now, stale_before).await? {
            RunClaim::Acquired(run) => {
                tracing::debug!(target: "scraper", run_id = run.id, "run guard acquired");
                Ok(Acquire::Acquired(run))
            }
            RunClaim::Busy(active) => {
                tracing::info!(
                    target: "scraper",
                    active_run_id = active.id, started_at = %active.started_at,
                    "another run is in progress; skipping"
                );
                Ok(Acquire::Busy(active))
            }
        }
    }
}
