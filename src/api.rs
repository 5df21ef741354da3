// src/api.rs
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::clock::SharedClock;
use crate::error::StoreError;
use crate::models::{FeedQuery, FeedSort, RunRecord};
use crate::pipeline::IngestPipeline;
use crate::scheduler::spawn_manual_run;
use crate::store::DynStore;

pub const FEED_CACHE_CONTROL: &str = "public, max-age=300";
pub const RUNS_DEFAULT_LIMIT: u32 = 10;
pub const RUNS_MAX_LIMIT: u32 = 50;

#[derive(Clone)]
pub struct AppState {
    pub store: DynStore,
    pub pipeline: Arc<IngestPipeline>,
    pub clock: SharedClock,
}

/// Build the public router. An empty `allowed_origins` list means any origin.
pub fn create_router(state: AppState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/feed", get(get_feed))
        .route("/api/admin/scraper-runs", get(get_scraper_runs))
        .route("/api/admin/stats", get(get_stats))
        .route("/api/admin/scrape", post(trigger_scrape))
        .layer(cors_layer(allowed_origins))
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() {
        return CorsLayer::very_permissive();
    }
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(target: "api", origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Store failures surface as 500 with a JSON body.
pub struct ApiError(StoreError);

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::error!(target: "api", error = %self.0, "request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

#[derive(Deserialize)]
struct FeedParams {
    page: Option<u32>,
    limit: Option<u32>,
    sort: Option<FeedSort>,
}

#[derive(Serialize)]
struct FeedItem {
    id: i64,
    document_number: String,
    title: String,
    summary: String,
    source_url: String,
    published_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct FeedResp {
    items: Vec<FeedItem>,
    total: u64,
    page: u32,
    limit: u32,
    has_more: bool,
}

async fn get_feed(
    State(state): State<AppState>,
    Query(params): Query<FeedParams>,
) -> Result<Response, ApiError> {
    let defaults = FeedQuery::default();
    let query = FeedQuery::new(
        params.page.unwrap_or(defaults.page),
        params.limit.unwrap_or(defaults.limit),
        params.sort.unwrap_or_default(),
    );
    let page = state.store.feed_page(&query).await?;

    let resp = FeedResp {
        items: page
            .items
            .into_iter()
            .map(|d| FeedItem {
                id: d.id,
                document_number: d.document_number,
                title: d.title,
                summary: d.summary,
                source_url: d.source_url,
                published_at: d.published_at,
            })
            .collect(),
        total: page.total,
        page: page.page,
        limit: page.limit,
        has_more: page.has_more,
    };

    let body = serde_json::to_vec(&resp).map_err(|e| StoreError::Unavailable(e.to_string()))?;
    let etag = format!("\"{}\"", hex_digest(&body));

    Ok((
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (header::CACHE_CONTROL, FEED_CACHE_CONTROL.to_string()),
            (header::ETAG, etag),
        ],
        body,
    )
        .into_response())
}

fn hex_digest(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[derive(Deserialize)]
struct RunsParams {
    limit: Option<u32>,
}

#[derive(Serialize)]
struct RunOut {
    #[serde(flatten)]
    run: RunRecord,
    duration_seconds: Option<f64>,
}

#[derive(Serialize)]
struct RunsResp {
    runs: Vec<RunOut>,
    total: u64,
}

async fn get_scraper_runs(
    State(state): State<AppState>,
    Query(params): Query<RunsParams>,
) -> Result<Json<RunsResp>, ApiError> {
    let limit = params
        .limit
        .unwrap_or(RUNS_DEFAULT_LIMIT)
        .clamp(1, RUNS_MAX_LIMIT);
    let runs = state.store.list_runs(limit).await?;
    let total = state.store.count_runs().await?;
    Ok(Json(RunsResp {
        runs: runs
            .into_iter()
            .map(|run| RunOut {
                duration_seconds: run.duration_seconds(),
                run,
            })
            .collect(),
        total,
    }))
}

#[derive(Serialize)]
struct StatsResp {
    total_articles: u64,
    last_scrape_time: Option<DateTime<Utc>>,
    last_scrape_human: String,
}

async fn get_stats(State(state): State<AppState>) -> Result<Json<StatsResp>, ApiError> {
    let total_articles = state.store.document_count().await?;
    let last = state.store.last_fetched_at().await?;
    let last_scrape_human = match last {
        Some(ts) => format!("{} seconds ago", (state.clock.now() - ts).num_seconds().max(0)),
        None => "Never".to_string(),
    };
    Ok(Json(StatsResp {
        total_articles,
        last_scrape_time: last,
        last_scrape_human,
    }))
}

async fn trigger_scrape(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    tracing::info!(target: "api", "manual scrape triggered");
    // Detached; the run guard still decides whether it does any work.
    drop(spawn_manual_run(state.pipeline.clone()));
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "status": "queued",
            "message": "Scrape job queued in background",
        })),
    )
}
