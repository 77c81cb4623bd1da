use async_trait::async_trait;
use uuid::Uuid;

use crate::types::Source;

/// Read-only access to source configuration. The admin system owns the
/// data; the pipeline only ever reads snapshots.
#[async_trait]
pub trait SourceCatalog: Send + Sync {
    async fn get(&self, source_id: Uuid) -> anyhow::Result<Option<Source>>;

    /// All enabled sources. Used by reconciliation and the discoverers.
    async fn list_enabled(&self) -> anyhow::Result<Vec<Source>>;
}
