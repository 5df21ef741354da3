// src/error.rs
//! Typed errors for outbound HTTP calls and persistence.

use thiserror::Error;

/// Failure of a single outbound HTTP call (Federal Register page, summarization request).
#[derive(Debug, Error)]
pub enum HttpCallError {
    #[error("request timed out")]
    Timeout,
    #[error("upstream returned HTTP {status}")]
    Status { status: u16 },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl HttpCallError {
    /// Timeouts and error statuses are transient; everything else fails fast.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::Status { .. })
    }
}

impl From<reqwest::Error> for HttpCallError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if let Some(status) = e.status() {
            Self::Status {
                status: status.as_u16(),
            }
        } else if e.is_decode() {
            Self::Malformed(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique key (document number or source URL) already exists.
    #[error("unique constraint violated: {0}")]
    Conflict(String),
    #[error("run {0} not found")]
    RunNotFound(i64),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}
