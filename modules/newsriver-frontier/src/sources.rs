use std::str::FromStr;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use newsriver_common::{
    ExtractionSelectors, IngestionMode, PriorityTier, Source, SourceCatalog,
};

/// [`SourceCatalog`] over the `sources` snapshot table. The table is
/// externally owned; this is strictly a reader.
#[derive(Clone)]
pub struct PgSourceCatalog {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct SourceRow {
    source_id: Uuid,
    name: String,
    base_url: String,
    feed_url: Option<String>,
    sitemap_url: Option<String>,
    mode: String,
    poll_interval_minutes: Option<i32>,
    enabled: bool,
    priority: String,
    rate_limit: i32,
    max_depth: Option<i32>,
    selectors: serde_json::Value,
}

impl SourceRow {
    fn into_source(self) -> Source {
        Source {
            source_id: self.source_id,
            name: self.name,
            base_url: self.base_url,
            feed_url: self.feed_url,
            sitemap_url: self.sitemap_url,
            mode: IngestionMode::from_str(&self.mode).unwrap_or(IngestionMode::Feed),
            poll_interval_minutes: self.poll_interval_minutes.map(|m| m.max(0) as u32),
            enabled: self.enabled,
            priority: PriorityTier::from_str(&self.priority).unwrap_or_default(),
            rate_limit: self.rate_limit.max(0) as u32,
            max_depth: self.max_depth,
            selectors: serde_json::from_value::<ExtractionSelectors>(self.selectors)
                .unwrap_or_default(),
        }
    }
}

impl PgSourceCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SourceCatalog for PgSourceCatalog {
    async fn get(&self, source_id: Uuid) -> anyhow::Result<Option<Source>> {
        let row = sqlx::query_as::<_, SourceRow>("SELECT * FROM sources WHERE source_id = $1")
            .bind(source_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(SourceRow::into_source))
    }

    async fn list_enabled(&self) -> anyhow::Result<Vec<Source>> {
        let rows =
            sqlx::query_as::<_, SourceRow>("SELECT * FROM sources WHERE enabled ORDER BY name")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(SourceRow::into_source).collect())
    }
}
