use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;

/// One row per source feed. Consecutive errors back off this feed only.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FeedState {
    pub source_id: Uuid,
    pub feed_url: String,
    pub last_polled_at: Option<DateTime<Utc>>,
    pub next_poll_at: DateTime<Utc>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub last_item_count: i32,
    pub consecutive_errors: i32,
    pub last_error: Option<String>,
}

#[derive(Clone)]
pub struct FeedStore {
    pool: PgPool,
}

impl FeedStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Register (or re-point) a source's feed. A changed URL resets the
    /// conditional-GET validators.
    pub async fn upsert(&self, source_id: Uuid, feed_url: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO feed_state (source_id, feed_url)
            VALUES ($1, $2)
            ON CONFLICT (source_id) DO UPDATE SET
                feed_url = EXCLUDED.feed_url,
                etag = CASE WHEN feed_state.feed_url = EXCLUDED.feed_url THEN feed_state.etag END,
                last_modified = CASE WHEN feed_state.feed_url = EXCLUDED.feed_url
                    THEN feed_state.last_modified END
            "#,
        )
        .bind(source_id)
        .bind(feed_url)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, source_id: Uuid) -> Result<Option<FeedState>> {
        let row = sqlx::query_as::<_, FeedState>("SELECT * FROM feed_state WHERE source_id = $1")
            .bind(source_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Feeds due for polling, most overdue first.
    pub async fn due(&self, limit: i64) -> Result<Vec<FeedState>> {
        let rows = sqlx::query_as::<_, FeedState>(
            r#"
            SELECT * FROM feed_state
            WHERE next_poll_at <= now()
            ORDER BY next_poll_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Record a successful poll (200): new validators, item count, zeroed
    /// error streak, next poll at the source's normal interval.
    pub async fn mark_polled(
        &self,
        source_id: Uuid,
        etag: Option<&str>,
        last_modified: Option<&str>,
        item_count: i32,
        interval_minutes: i32,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE feed_state
            SET last_polled_at = now(),
                etag = $2,
                last_modified = $3,
                last_item_count = $4,
                consecutive_errors = 0,
                last_error = NULL,
                next_poll_at = now() + make_interval(mins => $5)
            WHERE source_id = $1
            "#,
        )
        .bind(source_id)
        .bind(etag)
        .bind(last_modified)
        .bind(item_count)
        .bind(interval_minutes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record a 304: nothing changed, validators stay, error streak resets.
    pub async fn mark_not_modified(&self, source_id: Uuid, interval_minutes: i32) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE feed_state
            SET last_polled_at = now(),
                consecutive_errors = 0,
                last_error = NULL,
                next_poll_at = now() + make_interval(mins => $2)
            WHERE source_id = $1
            "#,
        )
        .bind(source_id)
        .bind(interval_minutes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record a poll failure: bump the error streak and back this feed off
    /// exponentially (interval × 2^errors, capped at 24 hours).
    pub async fn mark_failed(
        &self,
        source_id: Uuid,
        error: &str,
        interval_minutes: i32,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE feed_state
            SET consecutive_errors = consecutive_errors + 1,
                last_error = $2,
                last_polled_at = now(),
                next_poll_at = now() + LEAST(
                    interval '24 hours',
                    make_interval(mins => $3) * power(2, consecutive_errors + 1))
            WHERE source_id = $1
            "#,
        )
        .bind(source_id)
        .bind(error)
        .bind(interval_minutes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Make a feed due immediately (a crawl turn for a feed-mode source).
    pub async fn poke(&self, source_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE feed_state SET next_poll_at = now() WHERE source_id = $1")
            .bind(source_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete(&self, source_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM feed_state WHERE source_id = $1")
            .bind(source_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
