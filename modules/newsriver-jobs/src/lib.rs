//! Automated job lifecycle and adaptive scheduling.
//!
//! Source-configuration events are mirrored into the `jobs` table exactly
//! once per `event_id`; the interval scheduler leases due jobs and runs
//! their crawl turns with priority, backoff, and crawl-window semantics.

pub mod dispatcher;
pub mod error;
pub mod lifecycle;
pub mod schedule;
pub mod store;

pub use dispatcher::{CrawlDispatch, FrontierDispatch, IntervalScheduler};
pub use error::{JobsError, Result};
pub use lifecycle::JobLifecycle;
pub use schedule::{compute_schedule, in_crawl_window, Schedule, ScheduleInputs};
pub use store::{Job, JobStore, ProcessedEventStore};

use sqlx::PgPool;

/// Run the embedded migrations. Idempotent.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
