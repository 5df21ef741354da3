// src/source/federal_register.rs
//! Paginated client for the Federal Register documents API.

use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use metrics::counter;
use serde::Deserialize;
use std::time::Duration;

use super::{DocumentSource, RawDocument};
use crate::clock::SharedClock;
use crate::config::FederalRegisterConfig;
use crate::error::HttpCallError;
use crate::retry::RetryPolicy;

#[derive(Debug, Deserialize)]
struct DocumentsPage {
    // The API omits `results` entirely when nothing matches.
    #[serde(default)]
    results: Vec<serde_json::Value>,
    #[serde(default, alias = "total_documents")]
    count: u64,
}

pub struct FederalRegisterClient {
    http: reqwest::Client,
    base_url: String,
    per_page: u32,
    max_pages: u32,
    page_delay: Duration,
    retry: RetryPolicy,
    clock: SharedClock,
}

impl FederalRegisterClient {
    pub fn new(cfg: &FederalRegisterConfig, clock: SharedClock) -> Result<Self, HttpCallError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("fedreg-digest/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(cfg.timeout_secs.min(10)))
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: cfg.api_url.trim_end_matches('/').to_string(),
            per_page: cfg.per_page.max(1),
            max_pages: cfg.max_pages.max(1),
            page_delay: Duration::from_millis(cfg.page_delay_ms),
            retry: RetryPolicy::fetch(),
            clock,
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Closed range `[today - lookback_days, today]`.
    pub fn date_range(today: NaiveDate, lookback_days: u32) -> (NaiveDate, NaiveDate) {
        let start = today
            .checked_sub_days(Days::new(u64::from(lookback_days)))
            .unwrap_or(NaiveDate::MIN);
        (start, today)
    }

    async fn fetch_page(
        &self,
        page: u32,
        (start, end): (NaiveDate, NaiveDate),
    ) -> Result<DocumentsPage, HttpCallError> {
        let url = format!("{}/documents.json", self.base_url);
        let params = [
            ("filter[publication_date][gte]", start.to_string()),
            ("filter[publication_date][lte]", end.to_string()),
            ("per_page", self.per_page.to_string()),
            ("page", page.to_string()),
        ];
        let resp = self.http.get(&url).query(&params).send().await?;
        tracing::debug!(target: "source", page, status = resp.status().as_u16(), "federal register response");
        let body = resp.error_for_status()?.text().await?;
        serde_json::from_str(&body).map_err(|e| HttpCallError::Malformed(e.to_string()))
    }

    /// Fetch every page in the lookback window, surfacing the first unrecoverable error.
    pub async fn try_fetch_recent(&self, lookback_days: u32) -> Result<Vec<RawDocument>, HttpCallError> {
        let range = Self::date_range(self.clock.now().date_naive(), lookback_days);
        tracing::info!(
            target: "source",
            start = %range.0, end = %range.1, per_page = self.per_page, max_pages = self.max_pages,
            "fetching federal register documents"
        );

        let mut docs = Vec::new();
        for page in 1..=self.max_pages {
            if page > 1 && !self.page_delay.is_zero() {
                tokio::time::sleep(self.page_delay).await;
            }

            let label = format!("federal_register page {page}");
            let body = self
                .retry
                .run(&label, HttpCallError::is_retryable, |_| self.fetch_page(page, range))
                .await?;

            let got = body.results.len();
            tracing::info!(target: "source", page, got, total = body.count, "federal register page");
            docs.extend(body.results.into_iter().map(RawDocument::new));

            if got < self.per_page as usize {
                break;
            }
        }
        Ok(docs)
    }
}

#[async_trait]
impl DocumentSource for FederalRegisterClient {
    async fn fetch_recent(&self, lookback_days: u32) -> Vec<RawDocument> {
        match self.try_fetch_recent(lookback_days).await {
            Ok(docs) => {
                tracing::info!(target: "source", count = docs.len(), "federal register fetch complete");
                docs
            }
            Err(e) => {
                tracing::warn!(target: "source", error = %e, "federal register fetch failed; treating as no documents");
                counter!("scraper_fetch_errors_total").increment(1);
                Vec::new()
            }
        }
    }

    fn name(&self) -> &'static str {
        "federal_register"
    }
}
