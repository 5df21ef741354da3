// src/store/postgres.rs
//! Postgres-backed store (sqlx, runtime-checked queries).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{QueryBuilder, Row};

use super::{RunClaim, Store};
use crate::error::StoreError;
use crate::models::{DocumentRecord, FeedPage, FeedQuery, FeedSort, NewDocument, RunRecord};

/// Key for the transaction-scoped advisory lock serializing run claims.
const RUN_CLAIM_LOCK_KEY: i64 = 0x6665_6472_6567; // "fedreg"

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS documents (
        id              BIGSERIAL PRIMARY KEY,
        document_number TEXT NOT NULL UNIQUE,
        raw_payload     JSONB NOT NULL,
        fetched_at      TIMESTAMPTZ NOT NULL,
        title           TEXT NOT NULL,
        summary         TEXT NOT NULL,
        source_url      TEXT NOT NULL UNIQUE,
        published_at    TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_documents_published_at ON documents (published_at DESC, id DESC)",
    r#"
    CREATE TABLE IF NOT EXISTS scraper_runs (
        id              BIGSERIAL PRIMARY KEY,
        started_at      TIMESTAMPTZ NOT NULL,
        completed_at    TIMESTAMPTZ,
        processed_count BIGINT NOT NULL DEFAULT 0,
        skipped_count   BIGINT NOT NULL DEFAULT 0,
        error_count     BIGINT NOT NULL DEFAULT 0,
        success         BOOLEAN NOT NULL DEFAULT FALSE,
        error_message   VARCHAR(500)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_scraper_runs_started_at ON scraper_runs (started_at DESC)",
];

const RUN_COLUMNS: &str =
    "id, started_at, completed_at, processed_count, skipped_count, error_count, success, error_message";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Create tables and indexes if missing. Idempotent.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        for stmt in SCHEMA {
            sqlx::query(stmt).execute(&self.pool).await?;
        }
        Ok(())
    }
}

fn run_from_row(row: &PgRow) -> Result<RunRecord, sqlx::Error> {
    Ok(RunRecord {
        id: row.try_get("id")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        processed_count: row.try_get("processed_count")?,
        skipped_count: row.try_get("skipped_count")?,
        error_count: row.try_get("error_count")?,
        success: row.try_get("success")?,
        error_message: row.try_get("error_message")?,
    })
}

fn document_from_row(row: &PgRow) -> Result<DocumentRecord, sqlx::Error> {
    Ok(DocumentRecord {
        id: row.try_get("id")?,
        document_number: row.try_get("document_number")?,
        raw_payload: row.try_get("raw_payload")?,
        fetched_at: row.try_get("fetched_at")?,
        title: row.try_get("title")?,
        summary: row.try_get("summary")?,
        source_url: row.try_get("source_url")?,
        published_at: row.try_get("published_at")?,
    })
}

fn map_insert_error(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(db.message().to_string())
        }
        _ => StoreError::Database(e),
    }
}

#[async_trait]
impl Store for PgStore {
    async fn document_exists(&self, document_number: &str, source_url: &str) -> Result<bool, StoreError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM documents WHERE document_number = $1 OR source_url = $2)",
        )
        .bind(document_number)
        .bind(source_url)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn insert_documents(&self, docs: &[NewDocument]) -> Result<u64, StoreError> {
        if docs.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;

        let mut qb = QueryBuilder::new(
            "INSERT INTO documents \
             (document_number, raw_payload, fetched_at, title, summary, source_url, published_at) ",
        );
        qb.push_values(docs, |mut b, d| {
            b.push_bind(&d.document_number)
                .push_bind(&d.raw_payload)
                .push_bind(d.fetched_at)
                .push_bind(&d.title)
                .push_bind(&d.summary)
                .push_bind(&d.source_url)
                .push_bind(d.published_at);
        });

        // Dropping `tx` on error rolls the batch back.
        let done = qb.build().execute(&mut *tx).await.map_err(map_insert_error)?;
        tx.commit().await?;
        Ok(done.rows_affected())
    }

    async fn claim_run(&self, now: DateTime<Utc>, stale_before: DateTime<Utc>) -> Result<RunClaim, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(RUN_CLAIM_LOCK_KEY)
            .execute(&mut *tx)
            .await?;

        let active = sqlx::query(&format!(
            "SELECT {RUN_COLUMNS} FROM scraper_runs \
             WHERE completed_at IS NULL AND started_at > $1 \
             ORDER BY started_at DESC LIMIT 1"
        ))
        .bind(stale_before)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(row) = active {
            let run = run_from_row(&row)?;
            tx.rollback().await?;
            return Ok(RunClaim::Busy(run));
        }

        let row = sqlx::query(&format!(
            "INSERT INTO scraper_runs (started_at) VALUES ($1) RETURNING {RUN_COLUMNS}"
        ))
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;
        let run = run_from_row(&row)?;
        tx.commit().await?;
        Ok(RunClaim::Acquired(run))
    }

    async fn finalize_run(&self, run: &RunRecord) -> Result<(), StoreError> {
        let done = sqlx::query(
            "UPDATE scraper_runs SET completed_at = $2, processed_count = $3, skipped_count = $4, \
             error_count = $5, success = $6, error_message = $7 WHERE id = $1",
        )
        .bind(run.id)
        .bind(run.completed_at)
        .bind(run.processed_count)
        .bind(run.skipped_count)
        .bind(run.error_count)
        .bind(run.success)
        .bind(run.error_message.as_deref())
        .execute(&self.pool)
        .await?;
        if done.rows_affected() == 0 {
            return Err(StoreError::RunNotFound(run.id));
        }
        Ok(())
    }

    async fn list_runs(&self, limit: u32) -> Result<Vec<RunRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {RUN_COLUMNS} FROM scraper_runs ORDER BY started_at DESC, id DESC LIMIT $1"
        ))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(run_from_row)
            .collect::<Result<_, _>>()
            .map_err(StoreError::from)
    }

    async fn count_runs(&self) -> Result<u64, StoreError> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM scraper_runs")
            .fetch_one(&self.pool)
            .await?;
        Ok(n.max(0) as u64)
    }

    async fn feed_page(&self, query: &FeedQuery) -> Result<FeedPage, StoreError> {
        let order = match query.sort {
            FeedSort::Newest => "published_at DESC, id DESC",
            FeedSort::Oldest => "published_at ASC, id ASC",
        };
        let rows = sqlx::query(&format!(
            "SELECT id, document_number, raw_payload, fetched_at, title, summary, source_url, published_at \
             FROM documents ORDER BY {order} LIMIT $1 OFFSET $2"
        ))
        .bind(i64::from(query.limit))
        .bind(query.offset().min(i64::MAX as u64) as i64)
        .fetch_all(&self.pool)
        .await?;
        let items = rows
            .iter()
            .map(document_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        let total = self.document_count().await?;
        Ok(FeedPage::new(items, total, query))
    }

    async fn document_count(&self) -> Result<u64, StoreError> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        Ok(n.max(0) as u64)
    }

    async fn last_fetched_at(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        let ts: Option<DateTime<Utc>> = sqlx::query_scalar("SELECT MAX(fetched_at) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        Ok(ts)
    }
}
