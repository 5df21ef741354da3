// src/summarize/mod.rs
//! Best-effort summarization. `Summarizer::summarize` never fails: any backend problem
//! degrades to the truncated original text.

pub mod grok;
pub mod mock;

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use metrics::counter;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::clock::SharedClock;
use crate::config::{SummarizerConfig, MAX_SUMMARY_CACHE_TTL_SECS};
use crate::error::HttpCallError;
use crate::retry::RetryPolicy;
use crate::ttl_cache::TtlCache;

pub const NO_SUMMARY: &str = "No summary available.";
pub const FALLBACK_MAX_CHARS: usize = 200;
const ELLIPSIS: &str = "...";

/// A remote (or fake) text generator. May fail; the `Summarizer` absorbs failures.
#[async_trait]
pub trait SummaryBackend: Send + Sync {
    async fn complete(&self, text: &str) -> Result<String, HttpCallError>;
    fn name(&self) -> &'static str;
}

pub type DynBackend = Arc<dyn SummaryBackend>;

/// First `FALLBACK_MAX_CHARS` characters, with `...` appended when something was cut.
pub fn truncate_fallback(text: &str) -> String {
    let text = text.trim();
    let mut chars = text.char_indices();
    match chars.nth(FALLBACK_MAX_CHARS) {
        Some((cut, _)) => format!("{}{ELLIPSIS}", &text[..cut]),
        None => text.to_string(),
    }
}

pub struct Summarizer {
    backend: Option<DynBackend>,
    retry: RetryPolicy,
    cache: Option<TtlCache<String, String>>,
}

impl Summarizer {
    /// No backend: every summary is the truncation fallback.
    pub fn unconfigured() -> Self {
        Self {
            backend: None,
            retry: RetryPolicy::summarize(),
            cache: None,
        }
    }

    pub fn with_backend(backend: DynBackend) -> Self {
        Self {
            backend: Some(backend),
            retry: RetryPolicy::summarize(),
            cache: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Cache successful summaries by input hash for `ttl`.
    pub fn with_cache(mut self, ttl: ChronoDuration, clock: SharedClock) -> Self {
        self.cache = Some(TtlCache::new(ttl, clock));
        self
    }

    /// Factory:
    /// * `use_mock` → deterministic mock backend
    /// * blank key → unconfigured (truncation only)
    /// * otherwise → Grok chat completions
    pub fn from_config(cfg: &SummarizerConfig, clock: SharedClock) -> Self {
        let ttl_secs = cfg.cache_ttl_secs.min(MAX_SUMMARY_CACHE_TTL_SECS) as i64;
        let ttl = ChronoDuration::try_seconds(ttl_secs).unwrap_or(ChronoDuration::MAX);
        let base = if cfg.use_mock {
            tracing::info!(target: "summarizer", "using mock summarizer");
            Self::with_backend(Arc::new(mock::MockBackend))
        } else if !cfg.has_credential() {
            tracing::warn!(target: "summarizer", "no API key configured; summaries will be truncated text");
            return Self::unconfigured();
        } else {
            match grok::GrokBackend::new(cfg) {
                Ok(b) => Self::with_backend(Arc::new(b)),
                Err(e) => {
                    tracing::warn!(target: "summarizer", error = %e, "failed to build Grok client; falling back to truncation");
                    return Self::unconfigured();
                }
            }
        };
        base.with_cache(ttl, clock)
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.as_ref().map(|b| b.name()).unwrap_or("none")
    }

    pub async fn summarize(&self, text: &str) -> String {
        if text.trim().is_empty() {
            return NO_SUMMARY.to_string();
        }
        let Some(backend) = self.backend.as_ref() else {
            return truncate_fallback(text);
        };

        let key = cache_key(text);
        if let Some(hit) = self.cache.as_ref().and_then(|c| c.get(&key)) {
            tracing::debug!(target: "summarizer", "summary cache hit");
            return hit;
        }

        let result = self
            .retry
            .run("summarize", HttpCallError::is_retryable, |_| backend.complete(text))
            .await;

        match result {
            Ok(out) if !out.trim().is_empty() => {
                let out = out.trim().to_string();
                tracing::debug!(target: "summarizer", backend = backend.name(), chars = out.chars().count(), "summary generated");
                if let Some(c) = self.cache.as_ref() {
                    c.insert(key, out.clone());
                }
                out
            }
            Ok(_) => {
                tracing::warn!(target: "summarizer", backend = backend.name(), "empty summary from backend; using truncated text");
                counter!("scraper_summary_fallbacks_total").increment(1);
                truncate_fallback(text)
            }
            Err(e) => {
                tracing::warn!(target: "summarizer", backend = backend.name(), error = %e, "summarization failed; using truncated text");
                counter!("scraper_summary_fallbacks_total").increment(1);
                truncate_fallback(text)
            }
        }
    }
}

fn cache_key(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}
