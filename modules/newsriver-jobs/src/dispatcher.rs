//! The interval scheduler: leases due jobs and executes their crawl turn.
//!
//! A crawl turn is cheap by design: it seeds the frontier and pokes the
//! feed poller; the fetcher pool does the heavy lifting at its own pace.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use newsriver_common::{submit_priority, Config, Source, SourceCatalog, UrlOrigin};
use newsriver_frontier::{FeedStore, FrontierStore, SubmitUrl};

use crate::schedule::in_crawl_window;
use crate::store::{Job, JobStore};

const DISPATCH_TICK: Duration = Duration::from_secs(10);
const STALE_LEASE_CHECK: Duration = Duration::from_secs(300);

/// Executes one crawl turn for a leased job.
#[async_trait]
pub trait CrawlDispatch: Send + Sync {
    async fn crawl(&self, job: &Job, source: &Source) -> anyhow::Result<usize>;
}

/// Production dispatch: route the source's work into the frontier and the
/// feed poller according to its ingestion mode.
pub struct FrontierDispatch {
    frontier: FrontierStore,
    feeds: FeedStore,
}

impl FrontierDispatch {
    pub fn new(frontier: FrontierStore, feeds: FeedStore) -> Self {
        Self { frontier, feeds }
    }
}

#[async_trait]
impl CrawlDispatch for FrontierDispatch {
    async fn crawl(&self, _job: &Job, source: &Source) -> anyhow::Result<usize> {
        let mut actions = 0usize;

        if source.mode.polls_feed() {
            if let Some(feed_url) = &source.feed_url {
                self.feeds.upsert(source.source_id, feed_url).await?;
                self.feeds.poke(source.source_id).await?;
                actions += 1;
            }
        }

        if source.mode.spiders() {
            let submit = SubmitUrl {
                url: source.base_url.clone(),
                source_id: source.source_id,
                origin: UrlOrigin::Spider,
                parent_url: None,
                depth: 0,
                priority: submit_priority(source.priority, UrlOrigin::Spider),
                next_fetch_at: Utc::now(),
            };
            if self.frontier.submit(submit).await?.is_some() {
                actions += 1;
            }
        }

        Ok(actions)
    }
}

pub struct IntervalScheduler {
    jobs: JobStore,
    catalog: Arc<dyn SourceCatalog>,
    dispatch: Arc<dyn CrawlDispatch>,
    config: Config,
}

impl IntervalScheduler {
    pub fn new(
        jobs: JobStore,
        catalog: Arc<dyn SourceCatalog>,
        dispatch: Arc<dyn CrawlDispatch>,
        config: Config,
    ) -> Self {
        Self {
            jobs,
            catalog,
            dispatch,
            config,
        }
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            batch = self.config.scheduler_batch_size,
            "Interval scheduler started"
        );
        let mut last_stale_check = std::time::Instant::now();
        loop {
            if *shutdown.borrow() {
                break;
            }

            if let Err(e) = self.tick().await {
                warn!(error = %e, "Scheduler tick failed");
            }

            if last_stale_check.elapsed() >= STALE_LEASE_CHECK {
                last_stale_check = std::time::Instant::now();
                match self
                    .jobs
                    .reclaim_stale(self.config.scheduler_max_running_minutes)
                    .await
                {
                    Ok(0) => {}
                    Ok(n) => warn!(reclaimed = n, "Reclaimed stale job leases"),
                    Err(e) => warn!(error = %e, "Stale lease reclaim failed"),
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(DISPATCH_TICK) => {}
                _ = shutdown.changed() => {}
            }
        }
        info!("Interval scheduler stopped");
    }

    /// Lease a batch of due jobs and execute each turn.
    pub async fn tick(&self) -> anyhow::Result<usize> {
        let lease = Uuid::new_v4();
        let batch = self
            .jobs
            .claim_due(lease, self.config.scheduler_batch_size)
            .await?;
        if batch.is_empty() {
            return Ok(0);
        }

        let now = Utc::now();
        let mut dispatched = 0usize;
        for job in batch {
            if !in_crawl_window(
                job.window_start_hour,
                job.window_end_hour,
                &job.window_days,
                now,
            ) {
                debug!(source = %job.source_name, "Outside crawl window, skipping turn");
                self.jobs.release_skipped(job.id, lease).await?;
                continue;
            }

            let Some(source) = self.catalog.get(job.source_id).await? else {
                warn!(source_id = %job.source_id, "Job source vanished, orphaning");
                self.jobs.mark_orphaned(job.source_id).await?;
                continue;
            };

            match self.dispatch.crawl(&job, &source).await {
                Ok(actions) => {
                    debug!(source = %source.name, actions, "Crawl turn complete");
                    self.jobs.complete_success(job.id, lease).await?;
                    dispatched += 1;
                }
                Err(e) => {
                    warn!(source = %source.name, error = %e, "Crawl turn failed");
                    self.jobs.complete_failure(job.id, lease).await?;
                }
            }
        }
        Ok(dispatched)
    }
}
