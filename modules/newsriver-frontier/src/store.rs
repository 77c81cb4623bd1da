use chrono::{DateTime, Utc};
use sqlx::{PgPool, QueryBuilder};
use tracing::{debug, warn};
use uuid::Uuid;

use newsriver_common::urlnorm::{normalize, NormalizedUrl};
use newsriver_common::{FailureReason, UrlOrigin};

use crate::error::Result;

/// Base retry backoff; doubles per retry, capped at 24 hours.
const RETRY_BACKOFF_BASE_MINUTES: i32 = 5;

/// A row in the frontier. Status/origin are stored as their canonical
/// text forms; dead rows keep a canonical reason in `last_error`.
#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct FrontierUrl {
    pub id: i64,
    pub url: String,
    pub url_hash: String,
    pub host: String,
    pub source_id: Uuid,
    pub origin: String,
    pub parent_url: Option<String>,
    pub depth: i32,
    pub priority: i32,
    pub status: String,
    pub next_fetch_at: DateTime<Utc>,
    pub retry_count: i32,
    pub last_error: Option<String>,
    pub last_fetched_at: Option<DateTime<Utc>>,
    pub fetch_count: i32,
    pub content_hash: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parameters for submitting a URL. The store normalizes and hashes; the
/// caller provides scheduling intent.
#[derive(Debug, Clone)]
pub struct SubmitUrl {
    pub url: String,
    pub source_id: Uuid,
    pub origin: UrlOrigin,
    pub parent_url: Option<String>,
    pub depth: i32,
    pub priority: i32,
    pub next_fetch_at: DateTime<Utc>,
}

/// Filters for the admin listing endpoint.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub status: Option<String>,
    pub source_id: Option<Uuid>,
    pub host: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

/// One aggregate row of `stats()`.
#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct FrontierStat {
    pub source_id: Uuid,
    pub status: String,
    pub count: i64,
}

#[derive(Clone)]
pub struct FrontierStore {
    pool: PgPool,
}

impl FrontierStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Submit a URL. Upserts by `url_hash`: a conflicting row is updated
    /// only while still pending, keeping the higher priority and the
    /// earlier `next_fetch_at`. Idempotent. Returns the row id when a row
    /// was inserted or updated, `None` when an existing non-pending row
    /// absorbed the submission.
    pub async fn submit(&self, submit: SubmitUrl) -> Result<Option<i64>> {
        let normalized = normalize(&submit.url)?;
        self.submit_normalized(&normalized, submit).await
    }

    /// Submit a URL that the caller already normalized (saves re-hashing
    /// on batch paths).
    pub async fn submit_normalized(
        &self,
        normalized: &NormalizedUrl,
        submit: SubmitUrl,
    ) -> Result<Option<i64>> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO frontier_urls
                (url, url_hash, host, source_id, origin, parent_url, depth, priority, next_fetch_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (url_hash) DO UPDATE SET
                priority = GREATEST(frontier_urls.priority, EXCLUDED.priority),
                next_fetch_at = LEAST(frontier_urls.next_fetch_at, EXCLUDED.next_fetch_at),
                updated_at = now()
            WHERE frontier_urls.status = 'pending'
            RETURNING id
            "#,
        )
        .bind(&normalized.url)
        .bind(&normalized.hash)
        .bind(&normalized.host)
        .bind(submit.source_id)
        .bind(submit.origin.to_string())
        .bind(&submit.parent_url)
        .bind(submit.depth)
        .bind(submit.priority)
        .bind(submit.next_fetch_at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(id)
    }

    /// Atomically claim the best fetchable row, respecting per-host
    /// politeness. Concurrent claimers skip each other's locked rows.
    /// Returns `None` when nothing is claimable right now.
    pub async fn claim(&self) -> Result<Option<FrontierUrl>> {
        let row = sqlx::query_as::<_, FrontierUrl>(
            r#"
            UPDATE frontier_urls
            SET status = 'fetching', updated_at = now()
            WHERE id = (
                SELECT f.id
                FROM frontier_urls f
                LEFT JOIN host_state h ON h.host = f.host
                WHERE f.status = 'pending'
                  AND f.next_fetch_at <= now()
                  AND (h.host IS NULL
                       OR h.last_fetch_at IS NULL
                       OR h.last_fetch_at + make_interval(secs => h.min_delay_ms / 1000.0) <= now())
                ORDER BY f.priority DESC, f.next_fetch_at ASC
                LIMIT 1
                FOR UPDATE OF f SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Transition `fetching → fetched`. `None` metadata keeps the stored
    /// value (the 304 path preserves existing validators and hash).
    pub async fn update_fetched(
        &self,
        id: i64,
        content_hash: Option<&str>,
        etag: Option<&str>,
        last_modified: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE frontier_urls
            SET status = 'fetched',
                content_hash = COALESCE($2, content_hash),
                etag = COALESCE($3, etag),
                last_modified = COALESCE($4, last_modified),
                last_fetched_at = now(),
                fetch_count = fetch_count + 1,
                retry_count = 0,
                last_error = NULL,
                updated_at = now()
            WHERE id = $1 AND status = 'fetching'
            "#,
        )
        .bind(id)
        .bind(content_hash)
        .bind(etag)
        .bind(last_modified)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Like `update_fetched`, but redirects resolved to a different final
    /// URL: rewrite url/hash/host to the final form. If the final hash
    /// already belongs to another row, fall back to the plain path on the
    /// original row. No duplicate is ever created.
    pub async fn update_fetched_with_final_url(
        &self,
        id: i64,
        final_url: &NormalizedUrl,
        content_hash: Option<&str>,
        etag: Option<&str>,
        last_modified: Option<&str>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE frontier_urls
            SET url = $2,
                url_hash = $3,
                host = $4,
                status = 'fetched',
                content_hash = COALESCE($5, content_hash),
                etag = COALESCE($6, etag),
                last_modified = COALESCE($7, last_modified),
                last_fetched_at = now(),
                fetch_count = fetch_count + 1,
                retry_count = 0,
                last_error = NULL,
                updated_at = now()
            WHERE id = $1 AND status = 'fetching'
            "#,
        )
        .bind(id)
        .bind(&final_url.url)
        .bind(&final_url.hash)
        .bind(&final_url.host)
        .bind(content_hash)
        .bind(etag)
        .bind(last_modified)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => {
                debug!(id, final_url = %final_url.url, "Final URL already known, keeping original row");
                self.update_fetched(id, content_hash, etag, last_modified)
                    .await
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Record a failure. Under the retry budget the row goes back to
    /// `pending` with exponential backoff (doubling from the base, capped
    /// at 24 hours); at the budget it transitions to `dead` atomically
    /// with the reason.
    pub async fn update_failed(
        &self,
        id: i64,
        reason: FailureReason,
        max_retries: i32,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE frontier_urls
            SET retry_count = retry_count + 1,
                last_error = $2,
                status = CASE WHEN retry_count + 1 >= $3 THEN 'dead' ELSE 'pending' END,
                next_fetch_at = CASE WHEN retry_count + 1 >= $3 THEN next_fetch_at
                    ELSE now() + LEAST(
                        interval '24 hours',
                        make_interval(mins => $4) * power(2, retry_count))
                    END,
                updated_at = now()
            WHERE id = $1 AND status = 'fetching'
            "#,
        )
        .bind(id)
        .bind(reason.to_string())
        .bind(max_retries)
        .bind(RETRY_BACKOFF_BASE_MINUTES)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Terminal transition for non-retryable outcomes (robots-blocked,
    /// unsupported content type, 404, source deletion).
    pub async fn update_dead(&self, id: i64, reason: FailureReason) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE frontier_urls
            SET status = 'dead', last_error = $2, updated_at = now()
            WHERE id = $1 AND status <> 'dead'
            "#,
        )
        .bind(id)
        .bind(reason.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Kill every non-terminal row of a deleted source.
    pub async fn mark_source_dead(&self, source_id: Uuid) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE frontier_urls
            SET status = 'dead', last_error = $2, updated_at = now()
            WHERE source_id = $1 AND status IN ('pending', 'failed')
            "#,
        )
        .bind(source_id)
        .bind(FailureReason::SourceDeleted.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Convert rows stuck in `fetching` (a worker died mid-fetch) back to
    /// `pending` with a short delay. Returns how many were reclaimed.
    pub async fn reclaim_stuck(&self, older_than_secs: f64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE frontier_urls
            SET status = 'pending',
                next_fetch_at = now() + interval '5 minutes',
                updated_at = now()
            WHERE status = 'fetching'
              AND updated_at < now() - make_interval(secs => $1)
            "#,
        )
        .bind(older_than_secs)
        .execute(&self.pool)
        .await?;

        let reclaimed = result.rows_affected();
        if reclaimed > 0 {
            warn!(reclaimed, "Reclaimed stuck fetching rows");
        }
        Ok(reclaimed)
    }

    pub async fn get(&self, id: i64) -> Result<Option<FrontierUrl>> {
        let row = sqlx::query_as::<_, FrontierUrl>("SELECT * FROM frontier_urls WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn get_by_hash(&self, url_hash: &str) -> Result<Option<FrontierUrl>> {
        let row =
            sqlx::query_as::<_, FrontierUrl>("SELECT * FROM frontier_urls WHERE url_hash = $1")
                .bind(url_hash)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row)
    }

    /// Admin listing with optional filters, newest first.
    pub async fn list(&self, filter: &ListFilter) -> Result<Vec<FrontierUrl>> {
        let mut qb = QueryBuilder::new("SELECT * FROM frontier_urls WHERE 1=1");
        if let Some(status) = &filter.status {
            qb.push(" AND status = ").push_bind(status);
        }
        if let Some(source_id) = filter.source_id {
            qb.push(" AND source_id = ").push_bind(source_id);
        }
        if let Some(host) = &filter.host {
            qb.push(" AND host = ").push_bind(host);
        }
        let limit = if filter.limit > 0 { filter.limit.min(500) } else { 50 };
        qb.push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(filter.offset.max(0));

        let rows = qb.build_query_as::<FrontierUrl>().fetch_all(&self.pool).await?;
        Ok(rows)
    }

    /// Aggregate counts per source and status.
    pub async fn stats(&self) -> Result<Vec<FrontierStat>> {
        let rows = sqlx::query_as::<_, FrontierStat>(
            r#"
            SELECT source_id, status, count(*) AS count
            FROM frontier_urls
            GROUP BY source_id, status
            ORDER BY source_id, status
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Remove a row. Returns whether anything was deleted.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM frontier_urls WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map(|d| d.is_unique_violation())
        .unwrap_or(false)
}
