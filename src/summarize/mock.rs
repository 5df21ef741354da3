// src/summarize/mock.rs
use async_trait::async_trait;

use super::SummaryBackend;
use crate::error::HttpCallError;

const PREFIX: &str = "This document relates to government activity. ";
const ECHO_CHARS: usize = 100;

/// Deterministic offline backend for local development: no network, no cost.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockBackend;

#[async_trait]
impl SummaryBackend for MockBackend {
    async fn complete(&self, text: &str) -> Result<String, HttpCallError> {
        let head: String = text.trim().chars().take(ECHO_CHARS).collect();
        Ok(format!("{PREFIX}{head}..."))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
