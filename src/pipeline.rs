// src/pipeline.rs
//! The scraper run: guard → fetch → dedupe/summarize per item → batch persist → finalize.

use chrono::Duration as ChronoDuration;
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::batch::{BatchWriter, DEFAULT_FLUSH_THRESHOLD};
use crate::clock::SharedClock;
use crate::config::ScraperConfig;
use crate::error::StoreError;
use crate::guard::{Acquire, RunGuard, DEFAULT_STALE_AFTER_MINUTES};
use crate::models::{NewDocument, RunRecord, RunStats};
use crate::source::{DocumentSource, RawDocument};
use crate::store::DynStore;
use crate::summarize::Summarizer;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("scraper_runs_total", "Scraper runs by outcome.");
        describe_counter!(
            "scraper_documents_processed_total",
            "Documents summarized and committed."
        );
        describe_counter!(
            "scraper_documents_skipped_total",
            "Documents already stored (dedupe hits)."
        );
        describe_counter!(
            "scraper_document_errors_total",
            "Documents that failed processing."
        );
        describe_counter!(
            "scraper_fetch_errors_total",
            "Federal Register fetches that degraded to no documents."
        );
        describe_counter!(
            "scraper_summary_fallbacks_total",
            "Summaries that fell back to truncated text."
        );
        describe_counter!("scraper_batch_flushes_total", "Committed document batches.");
        describe_gauge!("scraper_last_run_ts", "Unix ts when the scraper last finished a run.");
    });
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    pub lookback_days: u32,
    pub batch_size: usize,
    pub stale_after: ChronoDuration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            lookback_days: 1,
            batch_size: DEFAULT_FLUSH_THRESHOLD,
            stale_after: ChronoDuration::minutes(DEFAULT_STALE_AFTER_MINUTES),
        }
    }
}

impl From<&ScraperConfig> for PipelineSettings {
    fn from(cfg: &ScraperConfig) -> Self {
        Self {
            lookback_days: cfg.lookback_days,
            batch_size: cfg.batch_size,
            stale_after: ChronoDuration::minutes(i64::from(cfg.stale_after_minutes)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Guarded,
    Fetching,
    ProcessingItems,
    Flushing,
    Finalized,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Guarded => "guarded",
            Self::Fetching => "fetching",
            Self::ProcessingItems => "processing items",
            Self::Flushing => "flushing",
            Self::Finalized => "finalized",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Another run held the guard; nothing was recorded.
    Skipped { active_run_id: i64 },
    Completed(RunRecord),
    /// A fatal error ended the run; the record carries the message.
    Failed(RunRecord),
    /// The run could not even be opened (store unreachable).
    Unavailable(String),
}

impl RunOutcome {
    pub fn stats(&self) -> RunStats {
        match self {
            Self::Completed(r) | Self::Failed(r) => r.stats(),
            Self::Skipped { .. } | Self::Unavailable(_) => RunStats::default(),
        }
    }

    pub fn record(&self) -> Option<&RunRecord> {
        match self {
            Self::Completed(r) | Self::Failed(r) => Some(r),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Skipped { .. } => "skipped",
            Self::Completed(_) => "completed",
            Self::Failed(_) => "failed",
            Self::Unavailable(_) => "unavailable",
        }
    }
}

#[derive(Debug, Error)]
enum ItemError {
    #[error("document has no document_number")]
    MissingDocumentNumber,
    #[error("dedupe lookup failed: {0}")]
    Lookup(#[from] StoreError),
}

enum ItemOutcome {
    New(Box<NewDocument>),
    Duplicate,
}

pub struct IngestPipeline {
    source: Arc<dyn DocumentSource>,
    summarizer: Arc<Summarizer>,
    store: DynStore,
    guard: RunGuard,
    clock: SharedClock,
    settings: PipelineSettings,
}

impl IngestPipeline {
    pub fn new(
        source: Arc<dyn DocumentSource>,
        summarizer: Arc<Summarizer>,
        store: DynStore,
        clock: SharedClock,
        settings: PipelineSettings,
    ) -> Self {
        let guard = RunGuard::new(store.clone(), clock.clone(), settings.stale_after);
        Self {
            source,
            summarizer,
            store,
            guard,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Execute one run. Never returns an error: fatal failures are recorded on the run.
    pub async fn run(&self) -> RunOutcome {
        ensure_metrics_described();

        let run = match self.guard.try_acquire().await {
            Ok(Acquire::Acquired(run)) => run,
            Ok(Acquire::Busy(active)) => {
                counter!("scraper_runs_total", "outcome" => "skipped").increment(1);
                return RunOutcome::Skipped {
                    active_run_id: active.id,
                };
            }
            Err(e) => {
                tracing::error!(target: "scraper", error = %e, "could not open a run record");
                counter!("scraper_runs_total", "outcome" => "unavailable").increment(1);
                return RunOutcome::Unavailable(e.to_string());
            }
        };

        let outcome = self.execute(run).await;

        counter!("scraper_runs_total", "outcome" => outcome.label()).increment(1);
        let stats = outcome.stats();
        counter!("scraper_documents_processed_total").increment(stats.processed);
        counter!("scraper_documents_skipped_total").increment(stats.skipped);
        counter!("scraper_document_errors_total").increment(stats.errors);
        gauge!("scraper_last_run_ts").set(self.clock.now().timestamp() as f64);
        outcome
    }

    async fn execute(&self, mut run: RunRecord) -> RunOutcome {
        tracing::info!(
            target: "scraper",
            run_id = run.id, lookback_days = self.settings.lookback_days, source = self.source.name(),
            phase = %RunPhase::Fetching, "scraper run started"
        );

        let docs = self.source.fetch_recent(self.settings.lookback_days).await;
        let mut stats = RunStats::default();

        if docs.is_empty() {
            tracing::warn!(target: "scraper", run_id = run.id, "no documents fetched");
            run.finish_ok(self.clock.now(), stats);
            self.persist_final(&run).await;
            return RunOutcome::Completed(run);
        }

        let total = docs.len();
        let mut writer = BatchWriter::new(self.store.as_ref(), self.settings.batch_size);

        for (i, doc) in docs.into_iter().enumerate() {
            let number = doc.document_number().unwrap_or("UNKNOWN").to_string();
            tracing::debug!(
                target: "scraper",
                run_id = run.id, item = i + 1, total, document_number = %number,
                phase = %RunPhase::ProcessingItems, "processing document"
            );

            let item = self.process_item(doc, &writer).await;
            match item {
                Ok(ItemOutcome::Duplicate) => {
                    tracing::debug!(target: "scraper", document_number = %number, "already stored; skipping");
                    stats.skipped += 1;
                }
                Ok(ItemOutcome::New(new_doc)) => {
                    if let Err(e) = writer.add(*new_doc).await {
                        stats.processed = writer.committed();
                        return self.fail(run, stats, RunPhase::Flushing, &e).await;
                    }
                    stats.processed += 1;
                }
                Err(e) => {
                    tracing::error!(target: "scraper", run_id = run.id, document_number = %number, error = %e, "document failed");
                    stats.errors += 1;
                }
            }
        }

        if let Err(e) = writer.flush().await {
            stats.processed = writer.committed();
            return self.fail(run, stats, RunPhase::Flushing, &e).await;
        }
        stats.processed = writer.committed();

        run.finish_ok(self.clock.now(), stats);
        self.persist_final(&run).await;
        tracing::info!(
            target: "scraper",
            run_id = run.id, processed = stats.processed, skipped = stats.skipped, errors = stats.errors,
            flushes = writer.flush_count(), phase = %RunPhase::Finalized, "scraper run complete"
        );
        RunOutcome::Completed(run)
    }

    async fn process_item(&self, doc: RawDocument, writer: &BatchWriter<'_>) -> Result<ItemOutcome, ItemError> {
        let number = doc
            .document_number()
            .ok_or(ItemError::MissingDocumentNumber)?
            .to_string();
        let source_url = doc.source_url().unwrap_or_default();

        if writer.contains(&number, &source_url)
            || self.store.document_exists(&number, &source_url).await?
        {
            return Ok(ItemOutcome::Duplicate);
        }

        let now = self.clock.now();
        let title = doc.title();
        let published_at = doc.publication_date().unwrap_or(now);
        let summary = self.summarizer.summarize(&doc.summary_input()).await;

        Ok(ItemOutcome::New(Box::new(NewDocument {
            document_number: number,
            raw_payload: doc.into_payload(),
            fetched_at: now,
            title,
            summary,
            source_url,
            published_at,
        })))
    }

    async fn fail(&self, mut run: RunRecord, stats: RunStats, phase: RunPhase, err: &StoreError) -> RunOutcome {
        let message = format!("{phase} failed: {err}");
        tracing::error!(
            target: "scraper",
            run_id = run.id, processed = stats.processed, skipped = stats.skipped, errors = stats.errors,
            error = %message, "fatal error; run aborted"
        );
        run.finish_failed(self.clock.now(), stats, &message);
        self.persist_final(&run).await;
        RunOutcome::Failed(run)
    }

    async fn persist_final(&self, run: &RunRecord) {
        if let Err(e) = self.store.finalize_run(run).await {
            tracing::error!(target: "scraper", run_id = run.id, error = %e, "could not finalize run record");
        }
    }
}
