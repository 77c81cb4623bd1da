//! The fetcher worker pool.
//!
//! N identical workers share the frontier through the store: claim one
//! row, fetch it politely, hand the body to the extractor, index the raw
//! document, and record the outcome. Workers on other hosts coordinate
//! through the same tables; nothing here is process-local except caches.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use redis::aio::ConnectionManager;
use reqwest::header::{HeaderValue, IF_MODIFIED_SINCE, IF_NONE_MATCH, LOCATION};
use reqwest::StatusCode;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use docstore_client::DocstoreClient;
use newsriver_common::urlnorm::{content_hash, normalize};
use newsriver_common::{
    submit_priority, Config, FailureReason, RawDocument, Source, SourceCatalog, UrlOrigin,
};
use newsriver_frontier::{FrontierStore, FrontierUrl, HostStore, SubmitUrl};

use crate::extract::{extract_spider_links, Extractor};
use crate::robots::RobotsPolicy;

/// Everything a worker needs. One context is shared by the whole pool.
pub struct FetchContext {
    pub frontier: FrontierStore,
    pub hosts: HostStore,
    pub robots: RobotsPolicy,
    pub docstore: DocstoreClient,
    pub catalog: Arc<dyn SourceCatalog>,
    pub extractor: Arc<dyn Extractor>,
    pub config: Config,
    pub client: reqwest::Client,
    pub spider_seen: Option<SpiderSeen>,
}

impl FetchContext {
    /// HTTP client for page fetches: no automatic redirects; the worker
    /// follows hops itself so the limit and the final URL are exact.
    pub fn build_client(config: &Config) -> reqwest::Client {
        reqwest::Client::builder()
            .user_agent(config.fetcher_user_agent.clone())
            .timeout(config.fetcher_request_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("Failed to build fetcher HTTP client")
    }
}

/// Spawn the pool. Each worker runs until the shutdown flag flips.
pub fn spawn_pool(
    ctx: Arc<FetchContext>,
    workers: usize,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    (0..workers)
        .map(|id| {
            let worker = Worker {
                ctx: ctx.clone(),
                id,
            };
            let shutdown = shutdown.clone();
            tokio::spawn(async move { worker.run(shutdown).await })
        })
        .collect()
}

struct Worker {
    ctx: Arc<FetchContext>,
    id: usize,
}

impl Worker {
    async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(worker = self.id, "Fetcher worker started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            match self.iteration().await {
                Ok(true) => {}
                Ok(false) => {
                    // Nothing claimable; back off briefly.
                    tokio::select! {
                        _ = tokio::time::sleep(self.ctx.config.fetcher_claim_retry_delay) => {}
                        _ = shutdown.changed() => {}
                    }
                }
                Err(e) => {
                    warn!(worker = self.id, error = %e, "Fetch iteration failed");
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                        _ = shutdown.changed() => {}
                    }
                }
            }
        }
        info!(worker = self.id, "Fetcher worker stopped");
    }

    /// One claim-fetch-update cycle. `Ok(false)` means the frontier had
    /// nothing for us.
    async fn iteration(&self) -> Result<bool> {
        let Some(row) = self.ctx.frontier.claim().await? else {
            return Ok(false);
        };
        self.process(row).await?;
        Ok(true)
    }

    async fn process(&self, row: FrontierUrl) -> Result<()> {
        let ctx = &self.ctx;

        let Some(source) = ctx.catalog.get(row.source_id).await? else {
            debug!(url = %row.url, "Source vanished, killing row");
            ctx.frontier
                .update_dead(row.id, FailureReason::SourceDeleted)
                .await?;
            return Ok(());
        };

        if !ctx.robots.allows(&row.url, &row.host).await? {
            info!(url = %row.url, "Blocked by robots.txt");
            ctx.frontier
                .update_dead(row.id, FailureReason::RobotsBlocked)
                .await?;
            return Ok(());
        }

        let outcome = execute_request(
            &ctx.client,
            &row.url,
            row.etag.as_deref(),
            row.last_modified.as_deref(),
            &ctx.config,
        )
        .await;

        // The host was contacted (or we tried); the politeness clock ticks
        // either way.
        ctx.hosts.record_fetch(&row.host).await?;

        match outcome {
            Ok(FetchOutcome::Success {
                final_url,
                body,
                etag,
                last_modified,
            }) => {
                self.handle_success(&row, &source, &final_url, &body, etag, last_modified)
                    .await
            }
            Ok(FetchOutcome::NotModified) => {
                debug!(url = %row.url, "Not modified");
                ctx.frontier.update_fetched(row.id, None, None, None).await?;
                Ok(())
            }
            Ok(FetchOutcome::NotFound) => {
                ctx.frontier
                    .update_dead(row.id, FailureReason::NotFound)
                    .await?;
                Ok(())
            }
            Ok(FetchOutcome::Gone) => {
                ctx.frontier.update_dead(row.id, FailureReason::Gone).await?;
                Ok(())
            }
            Ok(FetchOutcome::TooManyRedirects) => {
                warn!(url = %row.url, "Redirect limit exceeded");
                ctx.frontier
                    .update_failed(
                        row.id,
                        FailureReason::TooManyRedirects,
                        ctx.config.fetcher_max_retries,
                    )
                    .await?;
                Ok(())
            }
            Ok(FetchOutcome::RateLimited) => {
                let delay = ctx.hosts.raise_min_delay(&row.host).await?;
                warn!(host = %row.host, min_delay_ms = delay, "Rate limited, raising host delay");
                ctx.frontier
                    .update_failed(
                        row.id,
                        FailureReason::HttpError,
                        ctx.config.fetcher_max_retries,
                    )
                    .await?;
                Ok(())
            }
            Ok(FetchOutcome::HttpError { status }) => {
                debug!(url = %row.url, status, "HTTP error");
                ctx.frontier
                    .update_failed(
                        row.id,
                        FailureReason::HttpError,
                        ctx.config.fetcher_max_retries,
                    )
                    .await?;
                Ok(())
            }
            Ok(FetchOutcome::UnsupportedContentType) => {
                ctx.frontier
                    .update_dead(row.id, FailureReason::UnsupportedContentType)
                    .await?;
                Ok(())
            }
            Ok(FetchOutcome::BodyTooLarge) => {
                ctx.frontier
                    .update_dead(row.id, FailureReason::BodyTooLarge)
                    .await?;
                Ok(())
            }
            Err(reason) => {
                debug!(url = %row.url, reason = %reason, "Transport failure");
                ctx.frontier
                    .update_failed(row.id, reason, ctx.config.fetcher_max_retries)
                    .await?;
                Ok(())
            }
        }
    }

    async fn handle_success(
        &self,
        row: &FrontierUrl,
        source: &Source,
        final_url: &str,
        body: &str,
        etag: Option<String>,
        last_modified: Option<String>,
    ) -> Result<()> {
        let ctx = &self.ctx;
        let extracted = ctx.extractor.extract(body, &source.selectors);

        // The final URL decides whether this row keeps its identity. A
        // server redirecting to something unparseable still gave us a
        // body; keep the claimed identity then.
        let final_norm = normalize(final_url).ok();
        let canonical_url = final_norm
            .as_ref()
            .map(|n| n.url.clone())
            .unwrap_or_else(|| row.url.clone());
        let doc_id = final_norm
            .as_ref()
            .map(|n| n.short_hash().to_string())
            .unwrap_or_else(|| row.url_hash.chars().take(16).collect());

        if extracted.body_text.is_empty() {
            // Extraction produced nothing. The fetch itself succeeded, so
            // the row is fetched; there is just no document to index.
            warn!(url = %row.url, "Extractor produced no body, skipping index");
            ctx.frontier
                .update_fetched(row.id, None, etag.as_deref(), last_modified.as_deref())
                .await?;
            return Ok(());
        }

        let hash = content_hash(&extracted.body_text);
        let raw_index = source.raw_index();

        let already_indexed = ctx
            .docstore
            .content_hash_exists(&raw_index, &hash)
            .await
            .context("content hash lookup")?;
        if already_indexed {
            debug!(url = %row.url, "Identical body already indexed, skipping");
        } else {
            let doc = RawDocument::new(
                canonical_url.clone(),
                extracted.title,
                extracted.body_text,
                source.source_id,
                source.name.clone(),
                hash.clone(),
                Utc::now(),
            );
            ctx.docstore
                .index_document(&raw_index, &doc_id, &doc)
                .await
                .context("raw document index")?;
            info!(url = %canonical_url, index = %raw_index, words = doc.word_count, "Indexed raw document");
        }

        match final_norm {
            Some(ref norm) if norm.hash != row.url_hash => {
                ctx.frontier
                    .update_fetched_with_final_url(
                        row.id,
                        norm,
                        Some(&hash),
                        etag.as_deref(),
                        last_modified.as_deref(),
                    )
                    .await?;
            }
            _ => {
                ctx.frontier
                    .update_fetched(
                        row.id,
                        Some(&hash),
                        etag.as_deref(),
                        last_modified.as_deref(),
                    )
                    .await?;
            }
        }

        self.emit_pipeline(&canonical_url, source, &hash);
        self.spider(row, source, &canonical_url, body).await;

        Ok(())
    }

    /// Submit same-host links discovered in the body, one level deeper.
    async fn spider(&self, row: &FrontierUrl, source: &Source, page_url: &str, body: &str) {
        if !source.mode.spiders() {
            return;
        }
        let max_depth = source
            .max_depth
            .unwrap_or(self.ctx.config.crawler_max_depth);
        if row.depth >= max_depth {
            return;
        }

        let priority = submit_priority(source.priority, UrlOrigin::Spider);
        let mut submitted = 0usize;
        for link in extract_spider_links(body, page_url) {
            let Ok(normalized) = normalize(&link) else {
                continue;
            };
            if let Some(seen) = &self.ctx.spider_seen {
                if !seen.first_sighting(&normalized.hash).await {
                    continue;
                }
            }
            let submit = SubmitUrl {
                url: normalized.url.clone(),
                source_id: source.source_id,
                origin: UrlOrigin::Spider,
                parent_url: Some(row.url.clone()),
                depth: row.depth + 1,
                priority,
                next_fetch_at: Utc::now(),
            };
            match self
                .ctx
                .frontier
                .submit_normalized(&normalized, submit)
                .await
            {
                Ok(Some(_)) => submitted += 1,
                Ok(None) => {}
                Err(e) => warn!(link = %normalized.url, error = %e, "Spider submit failed"),
            }
        }
        if submitted > 0 {
            debug!(page = %page_url, submitted, depth = row.depth + 1, "Spidered links");
        }
    }

    /// Fire-and-forget downstream notification. A no-op when no emission
    /// URL is configured.
    fn emit_pipeline(&self, url: &str, source: &Source, hash: &str) {
        let emit_url = self.ctx.config.pipeline_emit_url.clone();
        if emit_url.is_empty() {
            return;
        }
        let client = self.ctx.client.clone();
        let payload = serde_json::json!({
            "url": url,
            "source_id": source.source_id,
            "content_hash": hash,
        });
        tokio::spawn(async move {
            if let Err(e) = client.post(&emit_url).json(&payload).send().await {
                warn!(error = %e, "Pipeline emission failed");
            }
        });
    }
}

// --- HTTP execution ---

enum FetchOutcome {
    Success {
        final_url: String,
        body: String,
        etag: Option<String>,
        last_modified: Option<String>,
    },
    NotModified,
    NotFound,
    Gone,
    TooManyRedirects,
    RateLimited,
    HttpError { status: u16 },
    UnsupportedContentType,
    BodyTooLarge,
}

/// Issue the conditional GET, following redirects by hand so the hop limit
/// is exact and the final URL is known. Transport failures map onto the
/// canonical reasons.
async fn execute_request(
    client: &reqwest::Client,
    url: &str,
    etag: Option<&str>,
    last_modified: Option<&str>,
    config: &Config,
) -> std::result::Result<FetchOutcome, FailureReason> {
    let mut current = url.to_string();
    let mut hops = 0u32;

    loop {
        let mut req = client.get(&current);
        if let Some(etag) = etag {
            if let Ok(v) = HeaderValue::from_str(etag) {
                req = req.header(IF_NONE_MATCH, v);
            }
        }
        if let Some(lm) = last_modified {
            if let Ok(v) = HeaderValue::from_str(lm) {
                req = req.header(IF_MODIFIED_SINCE, v);
            }
        }

        let resp = req.send().await.map_err(classify_transport)?;
        let status = resp.status();

        if status.is_redirection() {
            if !config.fetcher_follow_redirects {
                return Ok(FetchOutcome::HttpError {
                    status: status.as_u16(),
                });
            }
            hops += 1;
            if hops > config.fetcher_max_redirects {
                return Ok(FetchOutcome::TooManyRedirects);
            }
            let Some(next) = resp
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|loc| url::Url::parse(&current).ok()?.join(loc).ok())
            else {
                return Ok(FetchOutcome::HttpError {
                    status: status.as_u16(),
                });
            };
            current = next.to_string();
            continue;
        }

        return match status {
            StatusCode::OK => {
                let content_type = resp
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("")
                    .to_lowercase();
                if !is_html_like(&content_type) {
                    return Ok(FetchOutcome::UnsupportedContentType);
                }
                if let Some(len) = resp.content_length() {
                    if len > config.fetcher_max_body_bytes {
                        return Ok(FetchOutcome::BodyTooLarge);
                    }
                }

                let etag = header_string(&resp, reqwest::header::ETAG);
                let last_modified = header_string(&resp, reqwest::header::LAST_MODIFIED);

                let body = read_capped(resp, config.fetcher_max_body_bytes)
                    .await
                    .map_err(|_| FailureReason::TransportError)?;
                let Some(body) = body else {
                    return Ok(FetchOutcome::BodyTooLarge);
                };

                Ok(FetchOutcome::Success {
                    final_url: current,
                    body,
                    etag,
                    last_modified,
                })
            }
            StatusCode::NOT_MODIFIED => Ok(FetchOutcome::NotModified),
            StatusCode::NOT_FOUND => Ok(FetchOutcome::NotFound),
            StatusCode::GONE => Ok(FetchOutcome::Gone),
            StatusCode::TOO_MANY_REQUESTS => Ok(FetchOutcome::RateLimited),
            other => Ok(FetchOutcome::HttpError {
                status: other.as_u16(),
            }),
        };
    }
}

fn classify_transport(e: reqwest::Error) -> FailureReason {
    if e.is_timeout() {
        FailureReason::Timeout
    } else {
        FailureReason::TransportError
    }
}

fn is_html_like(content_type: &str) -> bool {
    content_type.is_empty()
        || content_type.starts_with("text/html")
        || content_type.starts_with("application/xhtml")
}

fn header_string(resp: &reqwest::Response, name: reqwest::header::HeaderName) -> Option<String> {
    resp.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

/// Read the body up to the cap. Returns `None` when a server lied about
/// (or omitted) Content-Length and the stream overran the cap.
async fn read_capped(
    mut resp: reqwest::Response,
    max_bytes: u64,
) -> std::result::Result<Option<String>, reqwest::Error> {
    let mut buf: Vec<u8> = Vec::new();
    while let Some(chunk) = resp.chunk().await? {
        if buf.len() as u64 + chunk.len() as u64 > max_bytes {
            return Ok(None);
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

// --- Spider dedup cache ---

/// Short-lived Redis dedup for spider-discovered links. The frontier is
/// the real dedup; this just keeps re-spidered pages from hammering the
/// upsert path. Keys expire after the configured TTL.
pub struct SpiderSeen {
    conn: ConnectionManager,
    ttl_secs: u64,
}

impl SpiderSeen {
    pub fn new(conn: ConnectionManager, ttl: Duration) -> Self {
        Self {
            conn,
            ttl_secs: ttl.as_secs().max(1),
        }
    }

    /// True the first time a hash is seen inside the TTL window. On Redis
    /// trouble this says "first sighting"; the frontier dedups anyway.
    pub async fn first_sighting(&self, url_hash: &str) -> bool {
        let mut conn = self.conn.clone();
        let result: redis::RedisResult<Option<String>> = redis::cmd("SET")
            .arg(format!("spider_seen:{url_hash}"))
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(self.ttl_secs)
            .query_async(&mut conn)
            .await;
        match result {
            Ok(set) => set.is_some(),
            Err(e) => {
                warn!(error = %e, "Spider dedup cache unavailable");
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_content_types_accepted() {
        assert!(is_html_like("text/html; charset=utf-8"));
        assert!(is_html_like("application/xhtml+xml"));
        assert!(is_html_like(""));
        assert!(!is_html_like("application/pdf"));
        assert!(!is_html_like("image/png"));
        assert!(!is_html_like("application/json"));
    }
}
