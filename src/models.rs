// src/models.rs
//! Persisted records and the value types that flow between pipeline stages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Upper bound for `RunRecord::error_message`.
pub const ERROR_MESSAGE_MAX_CHARS: usize = 500;

/// A document ready to be written; `DocumentRecord` once it has an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDocument {
    pub document_number: String,
    /// Upstream entry kept verbatim for audit.
    pub raw_payload: serde_json::Value,
    pub fetched_at: DateTime<Utc>,
    pub title: String,
    pub summary: String,
    pub source_url: String,
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: i64,
    pub document_number: String,
    pub raw_payload: serde_json::Value,
    pub fetched_at: DateTime<Utc>,
    pub title: String,
    pub summary: String,
    pub source_url: String,
    pub published_at: DateTime<Utc>,
}

impl DocumentRecord {
    pub fn from_new(id: i64, doc: NewDocument) -> Self {
        Self {
            id,
            document_number: doc.document_number,
            raw_payload: doc.raw_payload,
            fetched_at: doc.fetched_at,
            title: doc.title,
            summary: doc.summary,
            source_url: doc.source_url,
            published_at: doc.published_at,
        }
    }
}

/// One pipeline execution attempt. `completed_at == None` means in progress or abandoned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub processed_count: i64,
    pub skipped_count: i64,
    pub error_count: i64,
    pub success: bool,
    pub error_message: Option<String>,
}

impl RunRecord {
    pub fn started(id: i64, started_at: DateTime<Utc>) -> Self {
        Self {
            id,
            started_at,
            completed_at: None,
            processed_count: 0,
            skipped_count: 0,
            error_count: 0,
            success: false,
            error_message: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }

    pub fn duration_seconds(&self) -> Option<f64> {
        self.completed_at
            .map(|end| (end - self.started_at).num_milliseconds() as f64 / 1_000.0)
    }

    pub fn stats(&self) -> RunStats {
        RunStats {
            processed: self.processed_count.max(0) as u64,
            skipped: self.skipped_count.max(0) as u64,
            errors: self.error_count.max(0) as u64,
        }
    }

    pub fn finish_ok(&mut self, at: DateTime<Utc>, stats: RunStats) {
        self.apply(at, stats);
        self.success = true;
        self.error_message = None;
    }

    pub fn finish_failed(&mut self, at: DateTime<Utc>, stats: RunStats, message: &str) {
        self.apply(at, stats);
        self.success = false;
        self.error_message = Some(message.chars().take(ERROR_MESSAGE_MAX_CHARS).collect());
    }

    fn apply(&mut self, at: DateTime<Utc>, stats: RunStats) {
        self.completed_at = Some(at);
        self.processed_count = stats.processed as i64;
        self.skipped_count = stats.skipped as i64;
        self.error_count = stats.errors as i64;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub processed: u64,
    pub skipped: u64,
    pub errors: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedSort {
    #[default]
    Newest,
    Oldest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedQuery {
    /// 1-based.
    pub page: u32,
    pub limit: u32,
    pub sort: FeedSort,
}

impl FeedQuery {
    pub const MAX_LIMIT: u32 = 100;

    /// Clamp page to >= 1 and limit to 1..=100.
    pub fn new(page: u32, limit: u32, sort: FeedSort) -> Self {
        Self {
            page: page.max(1),
            limit: limit.clamp(1, Self::MAX_LIMIT),
            sort,
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }
}

impl Default for FeedQuery {
    fn default() -> Self {
        Self::new(1, 20, FeedSort::Newest)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedPage {
    pub items: Vec<DocumentRecord>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub has_more: bool,
}

impl FeedPage {
    pub fn new(items: Vec<DocumentRecord>, total: u64, query: &FeedQuery) -> Self {
        let has_more = query.offset() + (items.len() as u64) < total;
        Self {
            items,
            total,
            page: query.page,
            limit: query.limit,
            has_more,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone};

    #[test]
    fn failed_run_message_is_capped() {
        let t0 = Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap();
        let mut run = RunRecord::started(7, t0);
        let long = "x".repeat(2_000);
        run.finish_failed(t0 + ChronoDuration::seconds(3), RunStats::default(), &long);

        assert!(!run.success);
        assert_eq!(
            run.error_message.as_deref().map(|m| m.chars().count()),
            Some(ERROR_MESSAGE_MAX_CHARS)
        );
        assert_eq!(run.duration_seconds(), Some(3.0));
    }

    #[test]
    fn feed_query_clamps_and_computes_offset() {
        let q = FeedQuery::new(0, 500, FeedSort::Oldest);
        assert_eq!(q.page, 1);
        assert_eq!(q.limit, 100);
        assert_eq!(q.offset(), 0);
        assert_eq!(FeedQuery::new(3, 20, FeedSort::Newest).offset(), 40);
    }
}
