use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;
use crate::schedule::Schedule;

/// Jobs that keep failing park in `failed` until manually resumed.
const FAILURE_CEILING: i32 = 10;

/// One auto-managed polling job per source.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Job {
    pub id: i64,
    pub source_id: Uuid,
    pub source_name: String,
    pub source_url: String,
    pub interval_minutes: i32,
    pub next_run_at: DateTime<Utc>,
    pub status: String,
    pub priority: i32,
    pub max_concurrent: i32,
    pub failure_count: i32,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub backoff_until: Option<DateTime<Utc>>,
    pub window_start_hour: Option<i32>,
    pub window_end_hour: Option<i32>,
    pub window_days: Vec<i32>,
    pub auto_managed: bool,
    pub lease_token: Option<Uuid>,
    pub leased_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct JobStore {
    pool: PgPool,
}

impl JobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create or refresh a job from a computed schedule. An existing job
    /// keeps its status and window settings; schedule fields and the
    /// denormalized source identity are updated.
    pub async fn upsert(
        &self,
        source_id: Uuid,
        name: &str,
        url: &str,
        schedule: &Schedule,
        next_run_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO jobs
                (source_id, source_name, source_url, interval_minutes, next_run_at,
                 status, priority, max_concurrent, auto_managed)
            VALUES ($1, $2, $3, $4, $5, 'pending', $6, $7, true)
            ON CONFLICT (source_id) DO UPDATE SET
                source_name = EXCLUDED.source_name,
                source_url = EXCLUDED.source_url,
                interval_minutes = EXCLUDED.interval_minutes,
                priority = EXCLUDED.priority,
                max_concurrent = EXCLUDED.max_concurrent,
                updated_at = now()
            "#,
        )
        .bind(source_id)
        .bind(name)
        .bind(url)
        .bind(schedule.interval_minutes as i32)
        .bind(next_run_at)
        .bind(schedule.priority)
        .bind(schedule.max_concurrent)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, source_id: Uuid) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE source_id = $1")
            .bind(source_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn delete(&self, source_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM jobs WHERE source_id = $1")
            .bind(source_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Pause a job (source disabled).
    pub async fn pause(&self, source_id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE jobs SET status = 'paused', updated_at = now() WHERE source_id = $1",
        )
        .bind(source_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Resume a paused/failed job: runnable immediately.
    pub async fn resume(&self, source_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'pending', next_run_at = now(), failure_count = 0,
                backoff_until = NULL, updated_at = now()
            WHERE source_id = $1
            "#,
        )
        .bind(source_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// A job whose source no longer exists.
    pub async fn mark_orphaned(&self, source_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'orphaned', lease_token = NULL, leased_at = NULL, updated_at = now()
            WHERE source_id = $1
            "#,
        )
        .bind(source_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_auto_managed(&self) -> Result<Vec<Job>> {
        let rows = sqlx::query_as::<_, Job>(
            "SELECT * FROM jobs WHERE auto_managed ORDER BY source_name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Atomically lease a batch of due jobs: pending, due, not backed off,
    /// unleased, best-priority first. Competing schedulers skip each
    /// other's locked rows.
    pub async fn claim_due(&self, lease_token: Uuid, batch_size: i64) -> Result<Vec<Job>> {
        let rows = sqlx::query_as::<_, Job>(
            r#"
            UPDATE jobs
            SET status = 'running', lease_token = $1, leased_at = now(), updated_at = now()
            WHERE id IN (
                SELECT id FROM jobs
                WHERE status = 'pending'
                  AND next_run_at <= now()
                  AND (backoff_until IS NULL OR backoff_until <= now())
                  AND lease_token IS NULL
                ORDER BY priority DESC, next_run_at ASC
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .bind(lease_token)
        .bind(batch_size)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Crawl succeeded: reset failure tracking, schedule the next turn.
    pub async fn complete_success(&self, id: i64, lease_token: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'pending',
                failure_count = 0,
                last_failure_at = NULL,
                backoff_until = NULL,
                lease_token = NULL,
                leased_at = NULL,
                next_run_at = now() + make_interval(mins => interval_minutes),
                updated_at = now()
            WHERE id = $1 AND lease_token = $2
            "#,
        )
        .bind(id)
        .bind(lease_token)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Crawl failed: bump the failure count and back off
    /// `interval × 2^failures`, capped at 24 hours. Past the ceiling the
    /// job parks in `failed`.
    pub async fn complete_failure(&self, id: i64, lease_token: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET failure_count = failure_count + 1,
                last_failure_at = now(),
                backoff_until = now() + LEAST(
                    interval '24 hours',
                    make_interval(mins => interval_minutes) * power(2, failure_count + 1)),
                status = CASE WHEN failure_count + 1 >= $3 THEN 'failed' ELSE 'pending' END,
                lease_token = NULL,
                leased_at = NULL,
                updated_at = now()
            WHERE id = $1 AND lease_token = $2
            "#,
        )
        .bind(id)
        .bind(lease_token)
        .bind(FAILURE_CEILING)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Outside the crawl window: release the lease without consuming the
    /// turn; `next_run_at` stays where it was.
    pub async fn release_skipped(&self, id: i64, lease_token: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'pending', lease_token = NULL, leased_at = NULL, updated_at = now()
            WHERE id = $1 AND lease_token = $2
            "#,
        )
        .bind(id)
        .bind(lease_token)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Leases held longer than the running ceiling are presumed dead;
    /// their jobs return to pending with a short backoff.
    pub async fn reclaim_stale(&self, max_running_minutes: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'pending',
                lease_token = NULL,
                leased_at = NULL,
                backoff_until = now() + interval '5 minutes',
                updated_at = now()
            WHERE status = 'running'
              AND leased_at < now() - make_interval(mins => $1)
            "#,
        )
        .bind(max_running_minutes as i32)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

/// Ledger of applied event ids. Unique on `event_id`; rows age out.
#[derive(Clone)]
pub struct ProcessedEventStore {
    pool: PgPool,
}

impl ProcessedEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn is_processed(&self, event_id: Uuid) -> Result<bool> {
        let found = sqlx::query_scalar::<_, i64>(
            "SELECT 1 FROM processed_events WHERE event_id = $1",
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(found.is_some())
    }

    pub async fn mark(&self, event_id: Uuid, source_id: Uuid, event_type: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO processed_events (event_id, source_id, event_type)
            VALUES ($1, $2, $3)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(event_id)
        .bind(source_id)
        .bind(event_type)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Evict ledger rows past the retention window.
    pub async fn evict_older_than_days(&self, days: i32) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM processed_events WHERE processed_at < now() - make_interval(days => $1)",
        )
        .bind(days)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
