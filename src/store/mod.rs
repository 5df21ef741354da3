// src/store/mod.rs
//! Persistence seam for documents and run records.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::error::StoreError;
use crate::models::{FeedPage, FeedQuery, NewDocument, RunRecord};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Result of an atomic attempt to open a new run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunClaim {
    /// A new in-progress run was created and persisted.
    Acquired(RunRecord),
    /// Another non-stale run is still in progress; nothing was created.
    Busy(RunRecord),
}

#[async_trait]
pub trait Store: Send + Sync {
    /// True if a document with this number OR this source URL is already stored.
    async fn document_exists(&self, document_number: &str, source_url: &str) -> Result<bool, StoreError>;

    /// Insert all documents in one transaction. Either every row is written or none is.
    async fn insert_documents(&self, docs: &[NewDocument]) -> Result<u64, StoreError>;

    /// Atomically: if no run with `completed_at IS NULL` started after `stale_before`
    /// exists, create one started at `now`.
    async fn claim_run(&self, now: DateTime<Utc>, stale_before: DateTime<Utc>) -> Result<RunClaim, StoreError>;

    /// Persist the final state of a run (counts, success flag, message, completion time).
    async fn finalize_run(&self, run: &RunRecord) -> Result<(), StoreError>;

    /// Most recent runs first.
    async fn list_runs(&self, limit: u32) -> Result<Vec<RunRecord>, StoreError>;

    async fn count_runs(&self) -> Result<u64, StoreError>;

    /// Feed page ordered by `published_at` (ties broken by id).
    async fn feed_page(&self, query: &FeedQuery) -> Result<FeedPage, StoreError>;

    async fn document_count(&self) -> Result<u64, StoreError>;

    async fn last_fetched_at(&self) -> Result<Option<DateTime<Utc>>, StoreError>;
}

pub type DynStore = Arc<dyn Store>;
