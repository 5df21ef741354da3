// tests/federal_register_http.rs
//
// Federal Register client against an in-process axum server on 127.0.0.1:0.
//
// Covered:
// - query parameters (date window, per_page, page)
// - pagination stops on a short page / at the page cap
// - 503 is retried; exhausted retries degrade to no documents
// - malformed JSON is not retried
// - an unreachable host degrades to no documents
// - a failed fetch finalizes as an empty, successful run

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{TimeZone, Utc};
use serde_json::json;

use fedreg_digest::clock::ManualClock;
use fedreg_digest::config::FederalRegisterConfig;
use fedreg_digest::error::HttpCallError;
use fedreg_digest::retry::RetryPolicy;
use fedreg_digest::source::federal_register::FederalRegisterClient;
use fedreg_digest::source::DocumentSource;

#[derive(Clone, Copy)]
enum Mode {
    /// Serve `total` documents paginated by the requested `per_page`.
    Pages { total: usize },
    /// 503 for the first `n` requests, then behave like `Pages`.
    FailFirst { n: usize, total: usize },
    Malformed,
}

#[derive(Clone)]
struct Upstream {
    mode: Mode,
    hits: Arc<AtomicUsize>,
    queries: Arc<Mutex<Vec<HashMap<String, String>>>>,
}

async fn documents(
    State(up): State<Upstream>,
    Query(q): Query<HashMap<String, String>>,
) -> Response {
    let hit = up.hits.fetch_add(1, Ordering::SeqCst) + 1;
    up.queries.lock().unwrap().push(q.clone());

    let total = match up.mode {
        Mode::Malformed => return (StatusCode::OK, "<html>not json</html>").into_response(),
        Mode::FailFirst { n, .. } if hit <= n => {
            return (StatusCode::SERVICE_UNAVAILABLE, "busy").into_response()
        }
        Mode::FailFirst { total, .. } | Mode::Pages { total } => total,
    };

    let page: usize = q.get("page").and_then(|p| p.parse().ok()).unwrap_or(1);
    let per_page: usize = q.get("per_page").and_then(|p| p.parse().ok()).unwrap_or(20);
    let results: Vec<_> = ((page - 1) * per_page..(page * per_page).min(total))
        .map(|i| {
            json!({
                "document_number": format!("2025-{i:05}"),
                "title": format!("Doc {i}"),
                "publication_date": "2025-07-24",
            })
        })
        .collect();
    Json(json!({ "count": total, "results": results })).into_response()
}

async fn serve(mode: Mode) -> (SocketAddr, Upstream) {
    let up = Upstream {
        mode,
        hits: Arc::new(AtomicUsize::new(0)),
        queries: Arc::new(Mutex::new(Vec::new())),
    };
    let app = Router::new()
        .route("/documents.json", get(documents))
        .with_state(up.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, up)
}

fn client(addr: SocketAddr, per_page: u32, max_pages: u32) -> FederalRegisterClient {
    let cfg = FederalRegisterConfig {
        api_url: format!("http://{addr}/"),
        timeout_secs: 5,
        per_page,
        max_pages,
        page_delay_ms: 0,
    };
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 7, 24, 9, 30, 0).unwrap(),
    ));
    FederalRegisterClient::new(&cfg, clock)
        .expect("client builds")
        .with_retry(RetryPolicy::immediate(3))
}

#[tokio::test]
async fn paginates_until_short_page() {
    let (addr, up) = serve(Mode::Pages { total: 5 }).await;

    let docs = client(addr, 2, 10).fetch_recent(1).await;
    let numbers: Vec<_> = docs.iter().filter_map(|d| d.document_number()).collect();
    assert_eq!(numbers, ["2025-00000", "2025-00001", "2025-00002", "2025-00003", "2025-00004"]);
    assert_eq!(up.hits.load(Ordering::SeqCst), 3);

    let queries = up.queries.lock().unwrap();
    let first = &queries[0];
    assert_eq!(first["filter[publication_date][gte]"], "2025-07-23");
    assert_eq!(first["filter[publication_date][lte]"], "2025-07-24");
    assert_eq!(first["per_page"], "2");
    assert_eq!(first["page"], "1");
    assert_eq!(queries[2]["page"], "3");
}

#[tokio::test]
async fn stops_at_page_cap() {
    let (addr, up) = serve(Mode::Pages { total: 10 }).await;

    let docs = client(addr, 2, 2).fetch_recent(1).await;
    assert_eq!(docs.len(), 4);
    assert_eq!(up.hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn empty_window_yields_no_documents() {
    let (addr, up) = serve(Mode::Pages { total: 0 }).await;

    let docs = client(addr, 100, 2).fetch_recent(3).await;
    assert!(docs.is_empty());
    assert_eq!(up.hits.load(Ordering::SeqCst), 1);
    assert_eq!(up.queries.lock().unwrap()[0]["filter[publication_date][gte]"], "2025-07-21");
}

#[tokio::test]
async fn transient_503_is_retried() {
    let (addr, up) = serve(Mode::FailFirst { n: 2, total: 3 }).await;

    let docs = client(addr, 100, 2).fetch_recent(1).await;
    assert_eq!(docs.len(), 3);
    assert_eq!(up.hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn exhausted_retries_degrade_to_empty() {
    let (addr, up) = serve(Mode::FailFirst { n: 100, total: 3 }).await;
    let c = client(addr, 100, 2);

    assert!(c.fetch_recent(1).await.is_empty());
    assert_eq!(up.hits.load(Ordering::SeqCst), 3);

    match c.try_fetch_recent(1).await {
        Err(HttpCallError::Status { status }) => assert_eq!(status, 503),
        other => panic!("expected a 503 status error, got {other:?}"),
    }
}

#[tokio::test]
async fn malformed_body_is_not_retried() {
    let (addr, up) = serve(Mode::Malformed).await;
    let c = client(addr, 100, 2);

    assert!(matches!(
        c.try_fetch_recent(1).await,
        Err(HttpCallError::Malformed(_))
    ));
    assert_eq!(up.hits.load(Ordering::SeqCst), 1);
    assert!(c.fetch_recent(1).await.is_empty());
}

#[tokio::test]
async fn unreachable_host_degrades_to_empty() {
    // Bind then drop to get a port nobody listens on.
    let addr = {
        let l = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        l.local_addr().unwrap()
    };
    let docs = client(addr, 100, 2).fetch_recent(1).await;
    assert!(docs.is_empty());
}

#[tokio::test]
async fn failed_fetch_is_an_empty_successful_run() {
    use fedreg_digest::summarize::Summarizer;
    use fedreg_digest::{IngestPipeline, MemoryStore, PipelineSettings, RunOutcome};

    let (addr, up) = serve(Mode::FailFirst { n: 100, total: 3 }).await;
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 7, 24, 9, 30, 0).unwrap(),
    ));
    let pipeline = IngestPipeline::new(
        Arc::new(client(addr, 100, 2)),
        Arc::new(Summarizer::unconfigured()),
        store.clone(),
        clock,
        PipelineSettings::default(),
    );

    match pipeline.run().await {
        RunOutcome::Completed(run) => {
            assert!(run.success);
            assert!(run.is_completed());
            assert_eq!(run.stats(), Default::default());
        }
        other => panic!("expected a completed run, got {other:?}"),
    }
    assert_eq!(up.hits.load(Ordering::SeqCst), 3);
    assert!(store.documents().is_empty());
}
