//! The classified-content stream router.
//!
//! Stateless apart from the persisted cursor: any number of replicas can
//! run against the same cursor table, because the publish-history insert
//! is what makes delivery per-channel exactly-once. Restarts resume from
//! the cursor via `search_after`; re-encountered documents lose the
//! insert race and publish nothing.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use docstore_client::DocstoreClient;
use newsriver_common::Config;

use crate::article::Article;
use crate::bus::Publisher;
use crate::domains::route_article;
use crate::store::{ChannelStore, CursorStore, PublishHistoryStore};

const CLASSIFIED_INDEX_PATTERN: &str = "*_classified_content";

/// Bus publish attempts once the history insert is won. The winner is the
/// only replica that will ever deliver this channel, so it tries hard.
const PUBLISH_MAX_ATTEMPTS: u32 = 3;
/// Base backoff between publish attempts; doubles per attempt.
const PUBLISH_RETRY_BASE: Duration = Duration::from_millis(200);

pub struct StreamRouter {
    docstore: DocstoreClient,
    channels: ChannelStore,
    history: PublishHistoryStore,
    cursor: CursorStore,
    publisher: Arc<dyn Publisher>,
    config: Config,
    /// Discovered classified indexes; retained across transient discovery
    /// failures.
    indexes: Vec<String>,
}

impl StreamRouter {
    pub fn new(
        docstore: DocstoreClient,
        channels: ChannelStore,
        history: PublishHistoryStore,
        cursor: CursorStore,
        publisher: Arc<dyn Publisher>,
        config: Config,
    ) -> Self {
        Self {
            docstore,
            channels,
            history,
            cursor,
            publisher,
            config,
            indexes: Vec::new(),
        }
    }

    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            poll_secs = self.config.router_poll_interval.as_secs(),
            discovery_secs = self.config.router_discovery_interval.as_secs(),
            batch = self.config.router_batch_size,
            "Stream router started"
        );

        let mut last_discovery: Option<Instant> = None;
        loop {
            if *shutdown.borrow() {
                break;
            }

            let discovery_due = last_discovery
                .map(|t| t.elapsed() >= self.config.router_discovery_interval)
                .unwrap_or(true);
            if discovery_due {
                self.discover().await;
                last_discovery = Some(Instant::now());
            }

            if let Err(e) = self.poll().await {
                // Store trouble: do not advance anything, just retry later.
                warn!(error = %e, "Router poll failed");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.router_poll_interval) => {}
                _ = shutdown.changed() => {}
            }
        }
        info!("Stream router stopped");
    }

    /// Enumerate classified indexes. On failure the previous set stays in
    /// effect.
    async fn discover(&mut self) {
        match self.docstore.discover_indexes(CLASSIFIED_INDEX_PATTERN).await {
            Ok(found) => {
                if found != self.indexes {
                    info!(count = found.len(), "Classified index set changed");
                }
                self.indexes = found;
            }
            Err(e) => {
                warn!(error = %e, retained = self.indexes.len(), "Index discovery failed");
            }
        }
    }

    /// One polling pass: drain pages from the cursor until a short page.
    pub async fn poll(&self) -> Result<usize> {
        if self.indexes.is_empty() {
            return Ok(0);
        }

        // Channel configuration is a read-only snapshot per cycle.
        let channels = self.channels.list_enabled().await.context("channel snapshot")?;

        let mut cursor = self.cursor.get().await.context("cursor read")?;
        let mut total = 0usize;

        loop {
            let search_after = cursor
                .as_ref()
                .map(|c| (c.classified_at, c.doc_id.as_str()));
            let page = self
                .docstore
                .classified_page(&self.indexes, search_after, self.config.router_batch_size)
                .await
                .context("classified page")?;
            if page.is_empty() {
                break;
            }
            let page_len = page.len();

            for hit in &page {
                let Some(article) = Article::project(hit) else {
                    warn!(doc_id = %hit.id, index = %hit.index, "Document missing classified_at, skipping");
                    continue;
                };
                total += self.route_and_publish(&article, &channels).await;
            }

            // Advance and persist the cursor at the page boundary.
            if let Some(last) = page.last() {
                if let Some(article) = Article::project(last) {
                    self.cursor
                        .put(article.classified_at, &article.id)
                        .await
                        .context("cursor persist")?;
                    cursor = Some(crate::store::CursorRow {
                        classified_at: article.classified_at,
                        doc_id: article.id,
                    });
                }
            }

            if page_len < self.config.router_batch_size {
                break;
            }
        }

        if total > 0 {
            info!(published = total, "Routing pass complete");
        }
        Ok(total)
    }

    /// Route one article and publish each channel at most once. Returns
    /// the number of publishes that actually went to the bus.
    pub async fn route_and_publish(
        &self,
        article: &Article,
        channels: &[crate::store::Channel],
    ) -> usize {
        let routes = route_article(article, channels);
        if routes.len() > self.config.router_max_channels_per_article {
            warn!(
                doc_id = %article.id,
                channels = routes.len(),
                max = self.config.router_max_channels_per_article,
                "Article fans out past the channel guardrail"
            );
        }

        let mut published = 0usize;
        for route in routes {
            // Winning the history insert is what licenses the publish; a
            // replica that loses the race must stay silent.
            let won = match self
                .history
                .try_record(&article.id, &route.channel, route.channel_id)
                .await
            {
                Ok(won) => won,
                Err(e) => {
                    warn!(channel = %route.channel, error = %e, "Publish history unavailable");
                    continue;
                }
            };
            if !won {
                debug!(doc_id = %article.id, channel = %route.channel, "Already published, skipping");
                continue;
            }

            // Having won the insert, this replica is the only one that will
            // ever deliver this channel. Retry before giving up.
            match self
                .publish_with_retry(&route.channel, &article.payload)
                .await
            {
                Ok(()) => published += 1,
                Err(e) => {
                    // The history row is already committed, so no later pass
                    // retries this pair. The channel delivery is lost.
                    error!(
                        doc_id = %article.id,
                        channel = %route.channel,
                        error = %e,
                        "Publish failed after retries, channel delivery dropped"
                    );
                }
            }
        }
        published
    }

    async fn publish_with_retry(&self, channel: &str, payload: &Value) -> anyhow::Result<()> {
        let mut attempt = 0u32;
        loop {
            match self.publisher.publish(channel, payload).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    attempt += 1;
                    if attempt >= PUBLISH_MAX_ATTEMPTS {
                        return Err(e);
                    }
                    let backoff = PUBLISH_RETRY_BASE * 2u32.pow(attempt - 1);
                    warn!(channel, attempt, error = %e, "Bus publish failed, retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}
