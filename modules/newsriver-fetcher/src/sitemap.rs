//! Sitemap discoverer: parses `<urlset>` and `<sitemapindex>` documents,
//! follows an index one level, and submits recent entries with
//! `origin = sitemap`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use newsriver_common::{submit_priority, Config, Source, SourceCatalog, UrlOrigin};
use newsriver_frontier::{FrontierStore, SubmitUrl};

/// How often the discoverer wakes to look for due sources.
const SCAN_INTERVAL: Duration = Duration::from_secs(600);
/// Per-source sitemap cadence.
const PER_SOURCE_INTERVAL_HOURS: i64 = 6;
/// One level of sitemap index is followed, at most this many children.
const MAX_CHILD_SITEMAPS: usize = 10;

/// A parsed sitemap document.
#[derive(Debug, PartialEq)]
pub enum Sitemap {
    UrlSet(Vec<SitemapEntry>),
    Index(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SitemapEntry {
    pub loc: String,
    pub lastmod: Option<DateTime<Utc>>,
}

/// Parse a sitemap or sitemap-index document.
pub fn parse_sitemap(xml: &str) -> Result<Sitemap> {
    let mut reader = Reader::from_str(xml);
    let mut buf_is_index = false;
    let mut saw_urlset = false;

    let mut entries: Vec<SitemapEntry> = Vec::new();
    let mut children: Vec<String> = Vec::new();

    let mut in_loc = false;
    let mut in_lastmod = false;
    let mut loc = String::new();
    let mut lastmod: Option<DateTime<Utc>> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match local_name(e.name().as_ref()) {
                b"sitemapindex" => buf_is_index = true,
                b"urlset" => saw_urlset = true,
                b"loc" => in_loc = true,
                b"lastmod" => in_lastmod = true,
                _ => {}
            },
            Ok(Event::Text(t)) => {
                let text = t.unescape().unwrap_or_default().trim().to_string();
                if in_loc {
                    loc = text;
                } else if in_lastmod {
                    lastmod = parse_lastmod(&text);
                }
            }
            Ok(Event::End(e)) => match local_name(e.name().as_ref()) {
                b"loc" => in_loc = false,
                b"lastmod" => in_lastmod = false,
                b"url" => {
                    if !loc.is_empty() {
                        entries.push(SitemapEntry {
                            loc: std::mem::take(&mut loc),
                            lastmod: lastmod.take(),
                        });
                    }
                }
                b"sitemap" => {
                    if !loc.is_empty() {
                        children.push(std::mem::take(&mut loc));
                    }
                    lastmod = None;
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => bail!("sitemap parse error: {e}"),
            _ => {}
        }
    }

    if buf_is_index {
        Ok(Sitemap::Index(children))
    } else if saw_urlset {
        Ok(Sitemap::UrlSet(entries))
    } else {
        bail!("not a sitemap document")
    }
}

fn local_name(name: &[u8]) -> &[u8] {
    match name.iter().rposition(|&b| b == b':') {
        Some(idx) => &name[idx + 1..],
        None => name,
    }
}

/// `<lastmod>` allows full RFC 3339 timestamps or bare dates.
fn parse_lastmod(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
}

/// Entries without a lastmod are kept; dated entries must be recent.
pub fn is_recent(entry: &SitemapEntry, max_age_days: i64, now: DateTime<Utc>) -> bool {
    match entry.lastmod {
        Some(lastmod) => now - lastmod <= chrono::Duration::days(max_age_days),
        None => true,
    }
}

pub struct SitemapDiscoverer {
    frontier: FrontierStore,
    catalog: Arc<dyn SourceCatalog>,
    client: reqwest::Client,
    config: Config,
}

impl SitemapDiscoverer {
    pub fn new(frontier: FrontierStore, catalog: Arc<dyn SourceCatalog>, config: Config) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(config.fetcher_user_agent.clone())
            .timeout(config.fetcher_request_timeout)
            .build()
            .expect("Failed to build sitemap HTTP client");

        Self {
            frontier,
            catalog,
            client,
            config,
        }
    }

    /// Scan loop: every source with a sitemap URL gets discovered on its
    /// cadence. Last-run bookkeeping is in memory; a restart just makes
    /// every sitemap due, which the frontier absorbs.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("Sitemap discoverer started");
        let mut last_run: HashMap<Uuid, DateTime<Utc>> = HashMap::new();
        loop {
            if *shutdown.borrow() {
                break;
            }
            match self.catalog.list_enabled().await {
                Ok(sources) => {
                    let now = Utc::now();
                    for source in sources {
                        if source.sitemap_url.is_none() {
                            continue;
                        }
                        let due = last_run
                            .get(&source.source_id)
                            .map(|t| now - *t >= chrono::Duration::hours(PER_SOURCE_INTERVAL_HOURS))
                            .unwrap_or(true);
                        if !due {
                            continue;
                        }
                        last_run.insert(source.source_id, now);
                        if let Err(e) = self.discover(&source).await {
                            warn!(source = %source.name, error = %e, "Sitemap discovery failed");
                        }
                    }
                }
                Err(e) => warn!(error = %e, "Source listing failed"),
            }
            tokio::select! {
                _ = tokio::time::sleep(SCAN_INTERVAL) => {}
                _ = shutdown.changed() => {}
            }
        }
        info!("Sitemap discoverer stopped");
    }

    /// Fetch the source's sitemap, follow one index level, submit recent
    /// entries.
    pub async fn discover(&self, source: &Source) -> Result<usize> {
        let Some(sitemap_url) = &source.sitemap_url else {
            return Ok(0);
        };

        let mut entries = Vec::new();
        match self.fetch_sitemap(sitemap_url).await? {
            Sitemap::UrlSet(found) => entries.extend(found),
            Sitemap::Index(children) => {
                for child in children.into_iter().take(MAX_CHILD_SITEMAPS) {
                    match self.fetch_sitemap(&child).await {
                        Ok(Sitemap::UrlSet(found)) => entries.extend(found),
                        Ok(Sitemap::Index(_)) => {
                            debug!(child = %child, "Nested sitemap index ignored");
                        }
                        Err(e) => warn!(child = %child, error = %e, "Child sitemap failed"),
                    }
                }
            }
        }

        let now = Utc::now();
        let priority = submit_priority(source.priority, UrlOrigin::Sitemap);
        let mut submitted = 0usize;
        for entry in entries
            .iter()
            .filter(|e| is_recent(e, self.config.sitemap_max_age_days, now))
        {
            let submit = SubmitUrl {
                url: entry.loc.clone(),
                source_id: source.source_id,
                origin: UrlOrigin::Sitemap,
                parent_url: None,
                depth: 0,
                priority,
                next_fetch_at: now,
            };
            match self.frontier.submit(submit).await {
                Ok(Some(_)) => submitted += 1,
                Ok(None) => {}
                Err(e) => debug!(loc = %entry.loc, error = %e, "Sitemap entry rejected"),
            }
        }

        info!(source = %source.name, submitted, "Sitemap discovered");
        Ok(submitted)
    }

    async fn fetch_sitemap(&self, url: &str) -> Result<Sitemap> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .context("sitemap fetch failed")?;
        if !resp.status().is_success() {
            bail!("sitemap fetch returned {}", resp.status());
        }
        let body = resp.text().await.context("sitemap body read failed")?;
        parse_sitemap(&body)
    }
}
