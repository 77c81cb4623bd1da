//! Classified-content stream router: polls the classified indexes behind
//! a persisted cursor, routes each article through the fixed domain
//! pipeline plus the custom-channel rule engine, and publishes to the bus
//! with per-channel exactly-once delivery.

pub mod article;
pub mod bus;
pub mod domains;
pub mod error;
pub mod router;
pub mod rules;
pub mod store;

pub use article::Article;
pub use bus::{Publisher, RecordingPublisher, RedisPublisher};
pub use domains::{route_article, ChannelRoute, RoutingDomain};
pub use error::{Result, RouterError};
pub use router::StreamRouter;
pub use rules::Rules;
pub use store::{Channel, ChannelStore, CursorRow, CursorStore, PublishHistoryStore};

use sqlx::PgPool;

/// Run the embedded migrations. Idempotent.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
