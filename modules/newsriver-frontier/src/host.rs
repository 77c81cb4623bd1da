use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::Result;

/// Ceiling for throttling-driven delay raises (429 handling).
const MAX_MIN_DELAY_MS: i64 = 60_000;

/// One row per hostname: the politeness clock and the robots cache.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct HostState {
    pub host: String,
    pub last_fetch_at: Option<DateTime<Utc>>,
    pub min_delay_ms: i64,
    pub robots_body: Option<String>,
    pub robots_fetched_at: Option<DateTime<Utc>>,
}

impl HostState {
    /// Whether the cached robots body is still valid.
    pub fn robots_fresh(&self, ttl_hours: i64, now: DateTime<Utc>) -> bool {
        match self.robots_fetched_at {
            Some(fetched) => now - fetched < chrono::Duration::hours(ttl_hours),
            None => false,
        }
    }
}

#[derive(Clone)]
pub struct HostStore {
    pool: PgPool,
}

impl HostStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the row on first observation of a host. No-op if present.
    pub async fn observe(&self, host: &str) -> Result<()> {
        sqlx::query("INSERT INTO host_state (host) VALUES ($1) ON CONFLICT (host) DO NOTHING")
            .bind(host)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get(&self, host: &str) -> Result<Option<HostState>> {
        let row = sqlx::query_as::<_, HostState>("SELECT * FROM host_state WHERE host = $1")
            .bind(host)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Stamp the politeness clock. Called for every contacted host,
    /// whatever the fetch outcome.
    pub async fn record_fetch(&self, host: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO host_state (host, last_fetch_at)
            VALUES ($1, now())
            ON CONFLICT (host) DO UPDATE SET last_fetch_at = now()
            "#,
        )
        .bind(host)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Double the host's crawl delay in response to a throttling signal,
    /// up to the ceiling.
    pub async fn raise_min_delay(&self, host: &str) -> Result<i64> {
        let delay = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO host_state (host, min_delay_ms)
            VALUES ($1, 2000)
            ON CONFLICT (host) DO UPDATE
                SET min_delay_ms = LEAST($2, GREATEST(host_state.min_delay_ms, 500) * 2)
            RETURNING min_delay_ms
            "#,
        )
        .bind(host)
        .bind(MAX_MIN_DELAY_MS)
        .fetch_one(&self.pool)
        .await?;
        Ok(delay)
    }

    /// Cache a robots.txt body. `crawl_delay_ms` (from a Crawl-delay
    /// directive) overrides the host's delay when present.
    pub async fn put_robots(
        &self,
        host: &str,
        body: Option<&str>,
        crawl_delay_ms: Option<i64>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO host_state (host, robots_body, robots_fetched_at, min_delay_ms)
            VALUES ($1, $2, now(), COALESCE($3, 1000))
            ON CONFLICT (host) DO UPDATE SET
                robots_body = $2,
                robots_fetched_at = now(),
                min_delay_ms = COALESCE($3, host_state.min_delay_ms)
            "#,
        )
        .bind(host)
        .bind(body)
        .bind(crawl_delay_ms)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
