// src/source/fixture.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Mutex;

use super::{DocumentSource, RawDocument};

/// Serves a fixed document list. Used by tests and for local runs without network access.
pub struct StaticSource {
    docs: Mutex<Vec<RawDocument>>,
}

impl StaticSource {
    pub fn new(docs: Vec<RawDocument>) -> Self {
        Self {
            docs: Mutex::new(docs),
        }
    }

    /// Parse a Federal Register style page (`{"results": [...]}`) or a bare JSON array.
    pub fn from_fixture(json: &str) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_str(json).context("parsing document fixture")?;
        let items = match value {
            serde_json::Value::Array(items) => items,
            serde_json::Value::Object(mut obj) => match obj.remove("results") {
                Some(serde_json::Value::Array(items)) => items,
                _ => Vec::new(),
            },
            _ => anyhow::bail!("fixture must be an array or an object with `results`"),
        };
        Ok(Self::new(items.into_iter().map(RawDocument::new).collect()))
    }

    /// Replace the served documents (simulates upstream changing between runs).
    pub fn set(&self, docs: Vec<RawDocument>) {
        *self.docs.lock().unwrap_or_else(|p| p.into_inner()) = docs;
    }
}

#[async_trait]
impl DocumentSource for StaticSource {
    async fn fetch_recent(&self, _lookback_days: u32) -> Vec<RawDocument> {
        self.docs.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn name(&self) -> &'static str {
        "fixture"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn parses_results_wrapper_and_bare_array() {
        let wrapped = StaticSource::from_fixture(
            r#"{"count": 2, "results": [{"document_number": "a"}, {"document_number": "b"}]}"#,
        )
        .unwrap();
        assert_eq!(wrapped.fetch_recent(1).await.len(), 2);

        let bare = StaticSource::from_fixture(r#"[{"document_number": "a"}]"#).unwrap();
        assert_eq!(bare.fetch_recent(1).await.len(), 1);

        let empty = StaticSource::from_fixture(r#"{"count": 0}"#).unwrap();
        assert!(empty.fetch_recent(1).await.is_empty());

        assert!(StaticSource::from_fixture("42").is_err());
    }
}
