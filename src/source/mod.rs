// src/source/mod.rs
pub mod federal_register;
pub mod fixture;

use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

/// Characters of full text used as summary input when a document has no abstract.
pub const FULL_TEXT_INPUT_CHARS: usize = 1_000;

/// One upstream entry. The upstream schema is not contractually stable, so the payload
/// stays an opaque JSON value and only the consumed fields get accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawDocument(serde_json::Value);

impl RawDocument {
    pub fn new(payload: serde_json::Value) -> Self {
        Self(payload)
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_payload(self) -> serde_json::Value {
        self.0
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn document_number(&self) -> Option<&str> {
        self.str_field("document_number")
    }

    /// Normalized title, `"Untitled"` when absent.
    pub fn title(&self) -> String {
        self.str_field("title")
            .map(normalize_text)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "Untitled".to_string())
    }

    pub fn abstract_text(&self) -> Option<String> {
        self.str_field("abstract")
            .map(normalize_text)
            .filter(|t| !t.is_empty())
    }

    pub fn full_text(&self) -> Option<&str> {
        self.str_field("full_text")
    }

    pub fn html_url(&self) -> Option<&str> {
        self.str_field("html_url")
    }

    /// Accepts `YYYY-MM-DD` (the API's format) or RFC 3339.
    pub fn publication_date(&self) -> Option<DateTime<Utc>> {
        let raw = self.str_field("publication_date")?;
        if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            return d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        }
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Text handed to the summarizer: the abstract, else the head of the full text.
    pub fn summary_input(&self) -> String {
        if let Some(a) = self.abstract_text() {
            return a;
        }
        self.full_text()
            .map(|t| normalize_text(&t.chars().take(FULL_TEXT_INPUT_CHARS).collect::<String>()))
            .unwrap_or_default()
    }

    /// `html_url`, or the Federal Register short link derived from the document number.
    pub fn source_url(&self) -> Option<String> {
        if let Some(u) = self.html_url() {
            return Some(u.to_string());
        }
        self.document_number()
            .map(|n| format!("https://www.federalregister.gov/d/{n}"))
    }
}

impl From<serde_json::Value> for RawDocument {
    fn from(v: serde_json::Value) -> Self {
        Self::new(v)
    }
}

/// Fetches recent upstream documents. Infallible by contract: upstream failures
/// degrade to an empty list so a scheduled run becomes a no-op instead of an error.
#[async_trait::async_trait]
pub trait DocumentSource: Send + Sync {
    async fn fetch_recent(&self, lookback_days: u32) -> Vec<RawDocument>;
    fn name(&self) -> &'static str;
}

/// Decode entities, strip tags, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[a-z][^>]*>").unwrap());
    let stripped = re_tags.replace_all(&decoded, " ");

    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    re_ws.replace_all(&stripped, " ").trim().to_string()
}
