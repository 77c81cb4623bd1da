use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;

use crate::error::Result;
use crate::rules::Rules;

/// A consumer-declared custom routing channel.
#[derive(Debug, Clone)]
pub struct Channel {
    pub id: i64,
    pub name: String,
    pub redis_channel: String,
    pub rules: Rules,
    pub enabled: bool,
}

#[derive(sqlx::FromRow)]
struct ChannelRow {
    id: i64,
    name: String,
    redis_channel: String,
    rules: serde_json::Value,
    enabled: bool,
}

#[derive(Clone)]
pub struct ChannelStore {
    pool: PgPool,
}

impl ChannelStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Snapshot of enabled channels, loaded at each polling cycle.
    /// A channel whose rules JSON is broken matches nothing rather than
    /// everything.
    pub async fn list_enabled(&self) -> Result<Vec<Channel>> {
        let rows = sqlx::query_as::<_, ChannelRow>(
            "SELECT id, name, redis_channel, rules, enabled FROM channels WHERE enabled ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                match serde_json::from_value::<Rules>(row.rules) {
                    Ok(rules) => Some(Channel {
                        id: row.id,
                        name: row.name,
                        redis_channel: row.redis_channel,
                        rules,
                        enabled: row.enabled,
                    }),
                    Err(e) => {
                        debug!(channel = %row.name, error = %e, "Unparseable channel rules, skipping");
                        None
                    }
                }
            })
            .collect())
    }
}

/// Per-channel exactly-once ledger.
#[derive(Clone)]
pub struct PublishHistoryStore {
    pool: PgPool,
}

impl PublishHistoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Reserve `(article_id, channel)`. True means this caller won the
    /// insert and owns the publish; false means someone already has it.
    /// This insert is the linearization point for per-channel
    /// exactly-once delivery.
    pub async fn try_record(
        &self,
        article_id: &str,
        channel: &str,
        channel_id: Option<i64>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO publish_history (article_id, channel, channel_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (article_id, channel) DO NOTHING
            "#,
        )
        .bind(article_id)
        .bind(channel)
        .bind(channel_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn was_published(&self, article_id: &str, channel: &str) -> Result<bool> {
        let found = sqlx::query_scalar::<_, i64>(
            "SELECT 1 FROM publish_history WHERE article_id = $1 AND channel = $2",
        )
        .bind(article_id)
        .bind(channel)
        .fetch_optional(&self.pool)
        .await?;
        Ok(found.is_some())
    }
}

/// The router's restart position across the union of classified indexes.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CursorRow {
    pub classified_at: DateTime<Utc>,
    pub doc_id: String,
}

#[derive(Clone)]
pub struct CursorStore {
    pool: PgPool,
}

impl CursorStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self) -> Result<Option<CursorRow>> {
        let row = sqlx::query_as::<_, CursorRow>(
            "SELECT classified_at, doc_id FROM router_cursor WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Persist the cursor (single-row upsert). Called at page boundaries;
    /// the cursor never retreats in normal operation.
    pub async fn put(&self, classified_at: DateTime<Utc>, doc_id: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO router_cursor (id, classified_at, doc_id)
            VALUES (1, $1, $2)
            ON CONFLICT (id) DO UPDATE SET
                classified_at = EXCLUDED.classified_at,
                doc_id = EXCLUDED.doc_id,
                updated_at = now()
            "#,
        )
        .bind(classified_at)
        .bind(doc_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
