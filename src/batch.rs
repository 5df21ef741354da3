// src/batch.rs
//! Buffers new documents and commits them in bounded batches.

use metrics::counter;

use crate::error::StoreError;
use crate::models::NewDocument;
use crate::store::Store;

pub const DEFAULT_FLUSH_THRESHOLD: usize = 50;

pub struct BatchWriter<'a> {
    store: &'a dyn Store,
    threshold: usize,
    pending: Vec<NewDocument>,
    flushes: u32,
    committed: u64,
}

impl<'a> BatchWriter<'a> {
    /// `threshold` below 1 is treated as 1.
    pub fn new(store: &'a dyn Store, threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            store,
            threshold,
            pending: Vec::with_capacity(threshold),
            flushes: 0,
            committed: 0,
        }
    }

    /// Buffer `doc`; flush once the buffer reaches the threshold.
    pub async fn add(&mut self, doc: NewDocument) -> Result<(), StoreError> {
        self.pending.push(doc);
        if self.pending.len() >= self.threshold {
            self.flush().await?;
        }
        Ok(())
    }

    /// Commit everything pending in one transaction. On failure the buffer is kept
    /// untouched and the error returned; the caller decides what the failure means.
    pub async fn flush(&mut self) -> Result<(), StoreError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let n = self.store.insert_documents(&self.pending).await?;
        tracing::debug!(target: "scraper", batch = self.pending.len(), written = n, "batch committed");
        self.committed += self.pending.len() as u64;
        self.flushes += 1;
        self.pending.clear();
        counter!("scraper_batch_flushes_total").increment(1);
        Ok(())
    }

    /// Whether a pending (not yet committed) document already uses either key.
    pub fn contains(&self, document_number: &str, source_url: &str) -> bool {
        self.pending
            .iter()
            .any(|d| d.document_number == document_number || d.source_url == source_url)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn flush_count(&self) -> u32 {
        self.flushes
    }

    /// Documents committed so far by this writer.
    pub fn committed(&self) -> u64 {
        self.committed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::{TimeZone, Utc};

    fn doc(i: usize) -> NewDocument {
        let t = Utc.with_ymd_and_hms(2025, 8, 1, 0, 0, 0).unwrap();
        NewDocument {
            document_number: format!("2025-{i:05}"),
            raw_payload: serde_json::json!({}),
            fetched_at: t,
            title: "t".into(),
            summary: "s".into(),
            source_url: format!("https://example.test/{i}"),
            published_at: t,
        }
    }

    #[tokio::test]
    async fn flushes_at_threshold_and_on_demand() {
        let store = MemoryStore::new();
        let mut w = BatchWriter::new(&store, DEFAULT_FLUSH_THRESHOLD);

        for i in 0..120 {
            w.add(doc(i)).await.unwrap();
        }
        assert_eq!(w.flush_count(), 2);
        assert_eq!(w.pending_len(), 20);
        assert_eq!(store.documents().len(), 100);

        w.flush().await.unwrap();
        assert_eq!(w.flush_count(), 3);
        assert_eq!(w.committed(), 120);
        assert_eq!(store.documents().len(), 120);

        // empty flush is not counted
        w.flush().await.unwrap();
        assert_eq!(w.flush_count(), 3);
    }

    #[tokio::test]
    async fn failed_flush_keeps_pending() {
        let store = MemoryStore::new();
        store.insert_documents(&[doc(1)]).await.unwrap();

        let mut w = BatchWriter::new(&store, 10);
        w.add(doc(1)).await.unwrap();
        w.add(doc(2)).await.unwrap();
        assert!(w.contains("2025-00002", "nope"));

        assert!(w.flush().await.is_err());
        assert_eq!(w.pending_len(), 2);
        assert_eq!(w.committed(), 0);
        assert_eq!(store.documents().len(), 1);
    }
}
