// src/store/memory.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Mutex;

use super::{RunClaim, Store};
use crate::error::StoreError;
use crate::models::{DocumentRecord, FeedPage, FeedQuery, FeedSort, NewDocument, RunRecord};

#[derive(Default)]
struct Inner {
    documents: Vec<DocumentRecord>,
    numbers: HashSet<String>,
    urls: HashSet<String>,
    runs: Vec<RunRecord>,
    next_doc_id: i64,
    next_run_id: i64,
}

/// Mutex-guarded store for tests and database-less local runs.
/// Enforces the same unique keys and all-or-nothing inserts as the Postgres store.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Snapshot of all stored documents in insertion order.
    pub fn documents(&self) -> Vec<DocumentRecord> {
        self.lock().documents.clone()
    }

    /// Snapshot of all runs in creation order.
    pub fn runs(&self) -> Vec<RunRecord> {
        self.lock().runs.clone()
    }

    /// Seed a run record as-is (e.g. an abandoned run from a crashed process).
    pub fn insert_run(&self, mut run: RunRecord) -> RunRecord {
        let mut g = self.lock();
        g.next_run_id += 1;
        run.id = g.next_run_id;
        g.runs.push(run.clone());
        run
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn document_exists(&self, document_number: &str, source_url: &str) -> Result<bool, StoreError> {
        let g = self.lock();
        Ok(g.numbers.contains(document_number) || g.urls.contains(source_url))
    }

    async fn insert_documents(&self, docs: &[NewDocument]) -> Result<u64, StoreError> {
        let mut g = self.lock();

        // Validate the whole batch first so a conflict leaves nothing behind.
        let mut batch_numbers = HashSet::new();
        let mut batch_urls = HashSet::new();
        for d in docs {
            if g.numbers.contains(&d.document_number) || !batch_numbers.insert(d.document_number.as_str()) {
                return Err(StoreError::Conflict(format!("document_number {}", d.document_number)));
            }
            if g.urls.contains(&d.source_url) || !batch_urls.insert(d.source_url.as_str()) {
                return Err(StoreError::Conflict(format!("source_url {}", d.source_url)));
            }
        }

        for d in docs {
            g.next_doc_id += 1;
            let id = g.next_doc_id;
            g.numbers.insert(d.document_number.clone());
            g.urls.insert(d.source_url.clone());
            g.documents.push(DocumentRecord::from_new(id, d.clone()));
        }
        Ok(docs.len() as u64)
    }

    async fn claim_run(&self, now: DateTime<Utc>, stale_before: DateTime<Utc>) -> Result<RunClaim, StoreError> {
        let mut g = self.lock();
        if let Some(active) = g
            .runs
            .iter()
            .rev()
            .find(|r| r.completed_at.is_none() && r.started_at > stale_before)
        {
            return Ok(RunClaim::Busy(active.clone()));
        }
        g.next_run_id += 1;
        let run = RunRecord::started(g.next_run_id, now);
        g.runs.push(run.clone());
        Ok(RunClaim::Acquired(run))
    }

    async fn finalize_run(&self, run: &RunRecord) -> Result<(), StoreError> {
        let mut g = self.lock();
        let slot = g
            .runs
            .iter_mut()
            .find(|r| r.id == run.id)
            .ok_or(StoreError::RunNotFound(run.id))?;
        *slot = run.clone();
        Ok(())
    }

    async fn list_runs(&self, limit: u32) -> Result<Vec<RunRecord>, StoreError> {
        let g = self.lock();
        let mut runs = g.runs.clone();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.id.cmp(&a.id)));
        runs.truncate(limit as usize);
        Ok(runs)
    }

    async fn count_runs(&self) -> Result<u64, StoreError> {
        Ok(self.lock().runs.len() as u64)
    }

    async fn feed_page(&self, query: &FeedQuery) -> Result<FeedPage, StoreError> {
        let g = self.lock();
        let mut docs: Vec<&DocumentRecord> = g.documents.iter().collect();
        match query.sort {
            FeedSort::Newest => {
                docs.sort_by(|a, b| b.published_at.cmp(&a.published_at).then(b.id.cmp(&a.id)))
            }
            FeedSort::Oldest => {
                docs.sort_by(|a, b| a.published_at.cmp(&b.published_at).then(a.id.cmp(&b.id)))
            }
        }
        let total = docs.len() as u64;
        let items = docs
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.limit as usize)
            .cloned()
            .collect();
        Ok(FeedPage::new(items, total, query))
    }

    async fn document_count(&self) -> Result<u64, StoreError> {
        Ok(self.lock().documents.len() as u64)
    }

    async fn last_fetched_at(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self.lock().documents.iter().map(|d| d.fetched_at).max())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone};

    fn doc(n: &str, url: &str, day: u32) -> NewDocument {
        let t = Utc.with_ymd_and_hms(2025, 6, day, 0, 0, 0).unwrap();
        NewDocument {
            document_number: n.into(),
            raw_payload: serde_json::json!({ "document_number": n }),
            fetched_at: t,
            title: format!("Doc {n}"),
            summary: "s".into(),
            source_url: url.into(),
            published_at: t,
        }
    }

    #[tokio::test]
    async fn conflicting_batch_writes_nothing() {
        let store = MemoryStore::new();
        store.insert_documents(&[doc("a", "u/a", 1)]).await.unwrap();

        let res = store
            .insert_documents(&[doc("b", "u/b", 2), doc("c", "u/a", 3)])
            .await;
        assert!(matches!(res, Err(StoreError::Conflict(_))));
        assert_eq!(store.document_count().await.unwrap(), 1);
        assert!(!store.document_exists("b", "u/b").await.unwrap());

        // duplicate inside one batch
        let res = store
            .insert_documents(&[doc("d", "u/d", 4), doc("d", "u/d2", 4)])
            .await;
        assert!(res.is_err());
        assert_eq!(store.document_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn exists_matches_either_key() {
        let store = MemoryStore::new();
        store.insert_documents(&[doc("a", "u/a", 1)]).await.unwrap();
        assert!(store.document_exists("a", "other").await.unwrap());
        assert!(store.document_exists("other", "u/a").await.unwrap());
        assert!(!store.document_exists("x", "u/x").await.unwrap());
    }

    #[tokio::test]
    async fn feed_orders_and_paginates() {
        let store = MemoryStore::new();
        store
            .insert_documents(&[doc("a", "u/a", 3), doc("b", "u/b", 1), doc("c", "u/c", 2)])
            .await
            .unwrap();

        let p1 = store.feed_page(&FeedQuery::new(1, 2, FeedSort::Newest)).await.unwrap();
        let numbers: Vec<_> = p1.items.iter().map(|d| d.document_number.as_str()).collect();
        assert_eq!(numbers, ["a", "c"]);
        assert_eq!(p1.total, 3);
        assert!(p1.has_more);

        let p2 = store.feed_page(&FeedQuery::new(2, 2, FeedSort::Newest)).await.unwrap();
        assert_eq!(p2.items.len(), 1);
        assert!(!p2.has_more);

        let oldest = store.feed_page(&FeedQuery::new(1, 10, FeedSort::Oldest)).await.unwrap();
        assert_eq!(oldest.items[0].document_number, "b");
    }

    #[tokio::test]
    async fn claim_respects_staleness() {
        let store = MemoryStore::new();
        let t0 = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let hour = ChronoDuration::hours(1);

        let first = store.claim_run(t0, t0 - hour).await.unwrap();
        let RunClaim::Acquired(first) = first else { panic!("expected acquire") };

        let t1 = t0 + ChronoDuration::minutes(10);
        assert!(matches!(store.claim_run(t1, t1 - hour).await.unwrap(), RunClaim::Busy(r) if r.id == first.id));
        assert_eq!(store.count_runs().await.unwrap(), 1);

        let t2 = t0 + ChronoDuration::minutes(61);
        assert!(matches!(store.claim_run(t2, t2 - hour).await.unwrap(), RunClaim::Acquired(_)));
        assert_eq!(store.count_runs().await.unwrap(), 2);

        let runs = store.list_runs(10).await.unwrap();
        assert_eq!(runs[0].started_at, t2);
    }
}
