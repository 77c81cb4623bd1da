//! Durable stores for the URL frontier: the frontier queue itself, the
//! per-host politeness/robots state, and per-source feed polling state.
//!
//! All cross-process coordination happens through these tables; workers on
//! any number of hosts share them safely. The claim path uses a
//! single-statement skip-locked read so concurrent claimers never block on
//! each other.

pub mod error;
pub mod feeds;
pub mod host;
pub mod sources;
pub mod store;

pub use error::{FrontierError, Result};
pub use feeds::{FeedState, FeedStore};
pub use host::{HostState, HostStore};
pub use sources::PgSourceCatalog;
pub use store::{FrontierStat, FrontierStore, FrontierUrl, ListFilter, SubmitUrl};

use sqlx::PgPool;

/// Run the embedded migrations. Idempotent.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
