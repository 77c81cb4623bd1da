//! The automated job lifecycle: consumes source-configuration change
//! events and mirrors them into the job table.
//!
//! Consumer contract: ledger check → handler → ledger insert → ack. A
//! handler error leaves the message pending for retry (here or on another
//! consumer after the idle timeout). Undecodable messages are acked and
//! dropped, since the alternative is a poison-pill loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use newsriver_common::{Source, SourceCatalog};
use newsriver_events::{Delivery, EventStream, EventType, SourceEvent};
use newsriver_frontier::{FeedStore, FrontierStore};

use crate::schedule::{compute_schedule, ScheduleInputs};
use crate::store::{JobStore, ProcessedEventStore};

const READ_BATCH: usize = 16;
const READ_BLOCK: Duration = Duration::from_secs(5);
/// Pending messages idle longer than this are reclaimed from dead consumers.
const RECLAIM_IDLE: Duration = Duration::from_secs(60);
const RECLAIM_EVERY: Duration = Duration::from_secs(60);
/// Drift repair cadence.
const RECONCILE_EVERY: Duration = Duration::from_secs(300);
/// Ledger retention.
const LEDGER_RETENTION_DAYS: i32 = 7;

pub struct JobLifecycle {
    stream: Arc<dyn EventStream>,
    jobs: JobStore,
    ledger: ProcessedEventStore,
    catalog: Arc<dyn SourceCatalog>,
    frontier: FrontierStore,
    feeds: FeedStore,
}

impl JobLifecycle {
    pub fn new(
        stream: Arc<dyn EventStream>,
        jobs: JobStore,
        ledger: ProcessedEventStore,
        catalog: Arc<dyn SourceCatalog>,
        frontier: FrontierStore,
        feeds: FeedStore,
    ) -> Self {
        Self {
            stream,
            jobs,
            ledger,
            catalog,
            frontier,
            feeds,
        }
    }

    /// Consume the event stream until shutdown.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("Job lifecycle consumer started");
        let mut last_reclaim = Instant::now();
        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.stream.read(READ_BATCH, READ_BLOCK).await {
                Ok(deliveries) => {
                    for delivery in deliveries {
                        self.handle_delivery(&delivery).await;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Event stream read failed");
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_secs(2)) => {}
                        _ = shutdown.changed() => {}
                    }
                }
            }

            if last_reclaim.elapsed() >= RECLAIM_EVERY {
                last_reclaim = Instant::now();
                match self.stream.reclaim_idle(RECLAIM_IDLE, READ_BATCH).await {
                    Ok(reclaimed) => {
                        for delivery in reclaimed {
                            self.handle_delivery(&delivery).await;
                        }
                    }
                    Err(e) => warn!(error = %e, "Stream reclaim failed"),
                }
            }
        }
        info!("Job lifecycle consumer stopped");
    }

    /// Periodic drift repair: sources without a job get one; jobs whose
    /// source vanished are orphaned; the ledger is trimmed. The safety
    /// net for lost or unprocessable events.
    pub async fn run_reconciliation(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }
            if let Err(e) = self.reconcile().await {
                warn!(error = %e, "Reconciliation failed");
            }
            tokio::select! {
                _ = tokio::time::sleep(RECONCILE_EVERY) => {}
                _ = shutdown.changed() => {}
            }
        }
    }

    pub async fn handle_delivery(&self, delivery: &Delivery) {
        let event: SourceEvent = match serde_json::from_str(&delivery.payload) {
            Ok(event) => event,
            Err(e) => {
                // Poison message: ack it away, keep the stream moving.
                warn!(
                    delivery_id = %delivery.delivery_id,
                    error = %e,
                    "Undecodable event, dropping"
                );
                if let Err(e) = self.stream.ack(&delivery.delivery_id).await {
                    warn!(error = %e, "Ack of poison message failed");
                }
                return;
            }
        };

        match self.process_event(&event).await {
            Ok(applied) => {
                if applied {
                    debug!(event_id = %event.event_id, event_type = %event.event_type, "Event applied");
                }
                if let Err(e) = self.stream.ack(&delivery.delivery_id).await {
                    warn!(error = %e, "Event ack failed");
                }
            }
            Err(e) => {
                // No ack: the message stays pending and will be retried.
                warn!(
                    event_id = %event.event_id,
                    event_type = %event.event_type,
                    error = %e,
                    "Event handler failed, leaving pending"
                );
            }
        }
    }

    /// Returns false when the event was a replay (already in the ledger).
    pub async fn process_event(&self, event: &SourceEvent) -> Result<bool> {
        if self.ledger.is_processed(event.event_id).await? {
            return Ok(false);
        }

        self.apply(event).await?;

        self.ledger
            .mark(event.event_id, event.source_id, &event.event_type.to_string())
            .await?;
        Ok(true)
    }

    async fn apply(&self, event: &SourceEvent) -> Result<()> {
        match event.event_type {
            EventType::SourceCreated => {
                let Some(source) = self.resolve_source(event).await? else {
                    debug!(source_id = %event.source_id, "Created source not resolvable, skipping");
                    return Ok(());
                };
                if source.enabled {
                    self.create_job(&source).await?;
                }
            }
            EventType::SourceUpdated => {
                let Some(source) = self.resolve_source(event).await? else {
                    debug!(source_id = %event.source_id, "Updated source not resolvable, skipping");
                    return Ok(());
                };
                match self.jobs.get(event.source_id).await? {
                    None if source.enabled => self.create_job(&source).await?,
                    None => {}
                    Some(job) => {
                        let schedule = compute_schedule(ScheduleInputs {
                            tier: source.priority,
                            rate_limit: source.rate_limit,
                            max_depth: source.max_depth.unwrap_or(0),
                            failure_count: job.failure_count.max(0) as u32,
                        });
                        self.jobs
                            .upsert(
                                source.source_id,
                                &source.name,
                                &source.base_url,
                                &schedule,
                                job.next_run_at,
                            )
                            .await?;
                        self.register_feed(&source).await?;
                    }
                }
            }
            EventType::SourceDeleted => {
                self.jobs.delete(event.source_id).await?;
                self.feeds.delete(event.source_id).await.context("feed cleanup")?;
                let killed = self
                    .frontier
                    .mark_source_dead(event.source_id)
                    .await
                    .context("frontier cleanup")?;
                info!(source_id = %event.source_id, killed, "Source deleted");
            }
            EventType::SourceDisabled => {
                self.jobs.pause(event.source_id).await?;
            }
            EventType::SourceEnabled => {
                match self.jobs.get(event.source_id).await? {
                    Some(_) => self.jobs.resume(event.source_id).await?,
                    None => {
                        if let Some(source) = self.resolve_source(event).await? {
                            self.create_job(&source).await?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    async fn create_job(&self, source: &Source) -> Result<()> {
        let schedule = compute_schedule(ScheduleInputs {
            tier: source.priority,
            rate_limit: source.rate_limit,
            max_depth: source.max_depth.unwrap_or(0),
            failure_count: 0,
        });
        let next_run_at =
            Utc::now() + chrono::Duration::minutes(schedule.initial_delay_minutes as i64);
        self.jobs
            .upsert(
                source.source_id,
                &source.name,
                &source.base_url,
                &schedule,
                next_run_at,
            )
            .await?;
        self.register_feed(source).await?;
        info!(
            source = %source.name,
            interval = schedule.interval_minutes,
            priority = schedule.priority,
            "Job scheduled"
        );
        Ok(())
    }

    async fn register_feed(&self, source: &Source) -> Result<()> {
        if let (true, Some(feed_url)) = (source.mode.polls_feed(), &source.feed_url) {
            self.feeds
                .upsert(source.source_id, feed_url)
                .await
                .context("feed registration")?;
        }
        Ok(())
    }

    /// The event payload usually carries the source snapshot; fall back to
    /// the catalog when it doesn't.
    async fn resolve_source(&self, event: &SourceEvent) -> Result<Option<Source>> {
        if let Ok(source) = serde_json::from_value::<Source>(event.payload.clone()) {
            return Ok(Some(source));
        }
        if let Some(embedded) = event.payload.get("source") {
            if let Ok(source) = serde_json::from_value::<Source>(embedded.clone()) {
                return Ok(Some(source));
            }
        }
        self.catalog.get(event.source_id).await
    }

    /// One drift-repair pass. Public so operators (and tests) can force it.
    pub async fn reconcile(&self) -> Result<()> {
        let sources = self.catalog.list_enabled().await?;
        let jobs = self.jobs.list_auto_managed().await?;

        let mut created = 0usize;
        for source in &sources {
            if self.jobs.get(source.source_id).await?.is_none() {
                self.create_job(source).await?;
                created += 1;
            }
        }

        let mut orphaned = 0usize;
        for job in &jobs {
            if job.status == "orphaned" {
                continue;
            }
            if self.catalog.get(job.source_id).await?.is_none() {
                self.jobs.mark_orphaned(job.source_id).await?;
                orphaned += 1;
            }
        }

        let evicted = self
            .ledger
            .evict_older_than_days(LEDGER_RETENTION_DAYS)
            .await?;

        if created > 0 || orphaned > 0 || evicted > 0 {
            info!(created, orphaned, evicted, "Reconciliation repaired drift");
        }
        Ok(())
    }
}
