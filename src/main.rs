//! Federal Register digest service: binary entrypoint.
//! Wires config, storage, the scraper pipeline and its scheduler, and the HTTP router.

use std::sync::Arc;

use anyhow::Context as _;
use shuttle_axum::ShuttleAxum;

use fedreg_digest::api::{self, AppState};
use fedreg_digest::clock::{SharedClock, SystemClock};
use fedreg_digest::metrics::Metrics;
use fedreg_digest::scheduler::spawn_scheduler;
use fedreg_digest::source::federal_register::FederalRegisterClient;
use fedreg_digest::summarize::Summarizer;
use fedreg_digest::{AppConfig, DynStore, IngestPipeline, MemoryStore, PgStore, PipelineSettings};

async fn open_store(cfg: &AppConfig) -> anyhow::Result<DynStore> {
    match cfg.database_url.as_deref() {
        Some(url) => {
            let store = PgStore::connect(url).await.context("connect to DATABASE_URL")?;
            store.migrate().await.context("create tables")?;
            tracing::info!(target: "scraper", "using postgres store");
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!(target: "scraper", "DATABASE_URL not set; documents are kept in memory only");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // .env is optional; missing file is fine.
    let _ = dotenvy::dotenv();
    fedreg_digest::init_tracing();

    let cfg = AppConfig::load().context("load scraper config")?;
    for w in cfg.warnings() {
        tracing::warn!(target: "scraper", "{w}");
    }

    let clock: SharedClock = Arc::new(SystemClock);
    let store = open_store(&cfg).await?;

    let source = FederalRegisterClient::new(&cfg.federal_register, clock.clone())
        .context("build Federal Register client")?;
    let summarizer = Summarizer::from_config(&cfg.summarizer, clock.clone());
    tracing::info!(target: "scraper", backend = summarizer.backend_name(), "summarizer ready");

    let pipeline = Arc::new(IngestPipeline::new(
        Arc::new(source),
        Arc::new(summarizer),
        store.clone(),
        clock.clone(),
        PipelineSettings::from(&cfg.scraper),
    ));

    // Recorder first, so the first scheduled run is counted.
    let metrics = match Metrics::init(u64::from(cfg.scraper.interval_minutes)) {
        Ok(m) => Some(m),
        Err(e) => {
            tracing::warn!(target: "scraper", error = %e, "metrics disabled");
            None
        }
    };
    spawn_scheduler(pipeline.clone(), cfg.scraper.interval());

    let state = AppState {
        store,
        pipeline,
        clock,
    };
    let mut router = api::create_router(state, &cfg.allowed_origins);
    if let Some(m) = metrics {
        router = router.merge(m.router());
    }

    Ok(router.into())
}
