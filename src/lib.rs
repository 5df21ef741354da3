// src/lib.rs
//! Federal Register digest: scrape recent documents, summarize them, store them,
//! and serve them as a paginated feed.

pub mod api;
pub mod batch;
pub mod clock;
pub mod config;
pub mod error;
pub mod guard;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod retry;
pub mod scheduler;
pub mod source;
pub mod store;
pub mod summarize;
pub mod ttl_cache;

pub use config::AppConfig;
pub use error::{HttpCallError, StoreError};
pub use models::{DocumentRecord, NewDocument, RunRecord, RunStats};
pub use pipeline::{IngestPipeline, PipelineSettings, RunOutcome};
pub use store::{DynStore, MemoryStore, PgStore, Store};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Log targets used across the crate (`scraper`, `source`, `summarizer`, `api`) plus the crate path.
pub const DEFAULT_LOG_FILTER: &str =
    "fedreg_digest=info,scraper=info,source=info,summarizer=info,api=info,warn";

/// Install the global tracing subscriber. `RUST_LOG` overrides the default filter;
/// `LOG_FORMAT=json` switches to JSON lines. A second call (or a host-installed
/// subscriber) is left in place.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
