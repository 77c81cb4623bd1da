//! Feed poller: scans due feeds and turns new entries into frontier
//! submissions with `origin = feed`.
//!
//! Conditional GETs keep bandwidth down; a 304 costs nothing. Errors back
//! off the failing feed only, so one broken feed never slows the rest.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use reqwest::header::{HeaderValue, IF_MODIFIED_SINCE, IF_NONE_MATCH};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use newsriver_common::{submit_priority, Config, Source, SourceCatalog, UrlOrigin};
use newsriver_frontier::{FeedState, FeedStore, FrontierStore, SubmitUrl};

const DEFAULT_POLL_INTERVAL_MINUTES: i32 = 30;
const DUE_SCAN_LIMIT: i64 = 200;

pub struct FeedPoller {
    feeds: FeedStore,
    frontier: FrontierStore,
    catalog: Arc<dyn SourceCatalog>,
    client: reqwest::Client,
    config: Config,
}

impl FeedPoller {
    pub fn new(
        feeds: FeedStore,
        frontier: FrontierStore,
        catalog: Arc<dyn SourceCatalog>,
        config: Config,
    ) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(config.fetcher_user_agent.clone())
            .timeout(config.fetcher_request_timeout)
            .build()
            .expect("Failed to build feed HTTP client");

        Self {
            feeds,
            frontier,
            catalog,
            client,
            config,
        }
    }

    /// Scan loop. Each cycle polls every due feed under the concurrency
    /// budget, then sleeps.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.feed_poller_poll_interval.as_secs(),
            max_concurrency = self.config.feed_poller_max_concurrency,
            "Feed poller started"
        );
        loop {
            if *shutdown.borrow() {
                break;
            }
            if let Err(e) = self.clone().scan().await {
                warn!(error = %e, "Feed scan failed");
            }
            tokio::select! {
                _ = tokio::time::sleep(self.config.feed_poller_poll_interval) => {}
                _ = shutdown.changed() => {}
            }
        }
        info!("Feed poller stopped");
    }

    async fn scan(self: Arc<Self>) -> Result<()> {
        let due = self.feeds.due(DUE_SCAN_LIMIT).await?;
        if due.is_empty() {
            return Ok(());
        }
        debug!(due = due.len(), "Polling due feeds");

        let semaphore = Arc::new(Semaphore::new(self.config.feed_poller_max_concurrency));
        let mut tasks = JoinSet::new();
        for feed in due {
            let poller = self.clone();
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire().await;
                if let Err(e) = poller.poll_feed(&feed).await {
                    warn!(feed_url = %feed.feed_url, error = %e, "Feed poll failed");
                }
            });
        }
        while tasks.join_next().await.is_some() {}
        Ok(())
    }

    async fn poll_feed(&self, feed: &FeedState) -> Result<()> {
        let Some(source) = self.catalog.get(feed.source_id).await? else {
            // The source is gone; its feed goes too.
            self.feeds.delete(feed.source_id).await?;
            return Ok(());
        };
        let interval = source
            .poll_interval_minutes
            .map(|m| m as i32)
            .unwrap_or(DEFAULT_POLL_INTERVAL_MINUTES);

        let mut req = self.client.get(&feed.feed_url);
        if let Some(etag) = &feed.etag {
            if let Ok(v) = HeaderValue::from_str(etag) {
                req = req.header(IF_NONE_MATCH, v);
            }
        }
        if let Some(lm) = &feed.last_modified {
            if let Ok(v) = HeaderValue::from_str(lm) {
                req = req.header(IF_MODIFIED_SINCE, v);
            }
        }

        let resp = match req.send().await {
            Ok(resp) => resp,
            Err(e) => {
                self.feeds
                    .mark_failed(feed.source_id, &e.to_string(), interval)
                    .await?;
                return Ok(());
            }
        };

        match resp.status().as_u16() {
            304 => {
                debug!(feed_url = %feed.feed_url, "Feed not modified");
                self.feeds
                    .mark_not_modified(feed.source_id, interval)
                    .await?;
            }
            200 => {
                let etag = resp
                    .headers()
                    .get(reqwest::header::ETAG)
                    .and_then(|v| v.to_str().ok())
                    .map(String::from);
                let last_modified = resp
                    .headers()
                    .get(reqwest::header::LAST_MODIFIED)
                    .and_then(|v| v.to_str().ok())
                    .map(String::from);

                let bytes = resp.bytes().await.context("Failed to read feed body")?;
                let parsed = match feed_rs::parser::parse(&bytes[..]) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        self.feeds
                            .mark_failed(feed.source_id, &format!("parse: {e}"), interval)
                            .await?;
                        return Ok(());
                    }
                };

                let links = entry_links(parsed);
                let count = links.len() as i32;
                let submitted = self.submit_links(&source, &links).await;
                info!(
                    feed_url = %feed.feed_url,
                    items = count,
                    submitted,
                    "Feed polled"
                );

                self.feeds
                    .mark_polled(
                        feed.source_id,
                        etag.as_deref(),
                        last_modified.as_deref(),
                        count,
                        interval,
                    )
                    .await?;
            }
            status => {
                self.feeds
                    .mark_failed(feed.source_id, &format!("http {status}"), interval)
                    .await?;
            }
        }

        Ok(())
    }

    async fn submit_links(&self, source: &Source, links: &[String]) -> usize {
        let priority = submit_priority(source.priority, UrlOrigin::Feed);
        let mut submitted = 0usize;
        for link in links {
            let submit = SubmitUrl {
                url: link.clone(),
                source_id: source.source_id,
                origin: UrlOrigin::Feed,
                parent_url: None,
                depth: 0,
                priority,
                next_fetch_at: Utc::now(),
            };
            match self.frontier.submit(submit).await {
                Ok(Some(_)) => submitted += 1,
                Ok(None) => {}
                Err(e) => debug!(link = %link, error = %e, "Feed link rejected"),
            }
        }
        submitted
    }
}

/// Canonical link per feed entry: the first link, falling back to an
/// http(s) entry id. Format (RSS vs Atom) was auto-detected by the parser.
pub fn entry_links(feed: feed_rs::model::Feed) -> Vec<String> {
    feed.entries
        .into_iter()
        .filter_map(|entry| {
            entry
                .links
                .first()
                .map(|l| l.href.clone())
                .or_else(|| entry.id.starts_with("http").then(|| entry.id.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rss_entries_yield_links() {
        let rss = r#"<?xml version="1.0"?>
            <rss version="2.0"><channel>
                <title>Example News</title>
                <item><title>One</title><link>https://example.com/one</link></item>
                <item><title>Two</title><link>https://example.com/two</link></item>
            </channel></rss>"#;
        let feed = feed_rs::parser::parse(rss.as_bytes()).unwrap();
        let links = entry_links(feed);
        assert_eq!(
            links,
            vec!["https://example.com/one", "https://example.com/two"]
        );
    }

    #[test]
    fn atom_entries_yield_links() {
        let atom = r#"<?xml version="1.0"?>
            <feed xmlns="http://www.w3.org/2005/Atom">
                <title>Example</title>
                <id>urn:example</id>
                <updated>2024-01-01T00:00:00Z</updated>
                <entry>
                    <title>Story</title>
                    <id>urn:item:1</id>
                    <link href="https://example.com/story"/>
                    <updated>2024-01-01T00:00:00Z</updated>
                </entry>
            </feed>"#;
        let feed = feed_rs::parser::parse(atom.as_bytes()).unwrap();
        assert_eq!(entry_links(feed), vec!["https://example.com/story"]);
    }

    #[test]
    fn linkless_entry_falls_back_to_http_id() {
        let rss = r#"<?xml version="1.0"?>
            <rss version="2.0"><channel><title>T</title>
                <item><title>Only guid</title><guid>https://example.com/via-guid</guid></item>
                <item><title>Nothing usable</title><guid>not-a-url</guid></item>
            </channel></rss>"#;
        let feed = feed_rs::parser::parse(rss.as_bytes()).unwrap();
        assert_eq!(entry_links(feed), vec!["https://example.com/via-guid"]);
    }

    #[test]
    fn malformed_feed_is_a_parse_error() {
        assert!(feed_rs::parser::parse(&b"this is not xml"[..]).is_err());
    }
}
