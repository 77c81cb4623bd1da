//! Thin JSON/HTTP client for the search cluster used as a document store.
//!
//! The cluster is an external collaborator: this client covers only the
//! operations the pipeline needs: wildcard index discovery, sorted
//! `search_after` paging over classified content, idempotent document
//! indexing, and a content-hash existence check for body-level dedup.

pub mod error;

pub use error::{DocstoreError, Result};

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

pub struct DocstoreClient {
    client: reqwest::Client,
    base_url: String,
}

/// One hit from a classified-content search page.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchHit {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_index")]
    pub index: String,
    #[serde(rename = "_source")]
    pub source: Value,
    #[serde(default)]
    pub sort: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: HitsEnvelope,
}

#[derive(Debug, Deserialize)]
struct HitsEnvelope {
    hits: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct CatIndexRow {
    index: String,
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: u64,
}

impl DocstoreClient {
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build document store HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// List index names matching a wildcard pattern, e.g. `*_classified_content`.
    pub async fn discover_indexes(&self, pattern: &str) -> Result<Vec<String>> {
        let endpoint = format!("{}/_cat/indices/{pattern}?format=json", self.base_url);
        let resp = self.client.get(&endpoint).send().await?;

        let status = resp.status();
        // No index matches the pattern yet. An empty cluster, not an error.
        if status.as_u16() == 404 {
            return Ok(Vec::new());
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(DocstoreError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let rows: Vec<CatIndexRow> = resp.json().await?;
        let mut names: Vec<String> = rows.into_iter().map(|r| r.index).collect();
        names.sort();
        debug!(pattern, count = names.len(), "Discovered indexes");
        Ok(names)
    }

    /// One page of classified documents across `indexes`, sorted
    /// `(classified_at asc, _id asc)`, resuming after `search_after` when set.
    pub async fn classified_page(
        &self,
        indexes: &[String],
        search_after: Option<(DateTime<Utc>, &str)>,
        batch_size: usize,
    ) -> Result<Vec<SearchHit>> {
        if indexes.is_empty() {
            return Ok(Vec::new());
        }

        let mut body = json!({
            "size": batch_size,
            "query": {
                "bool": {
                    "filter": [
                        { "term": { "classification_status": "classified" } }
                    ]
                }
            },
            "sort": [
                { "classified_at": "asc" },
                { "_id": "asc" }
            ]
        });
        if let Some((classified_at, doc_id)) = search_after {
            body["search_after"] = json!([
                classified_at.to_rfc3339_opts(SecondsFormat::Millis, true),
                doc_id
            ]);
        }

        let endpoint = format!("{}/{}/_search", self.base_url, indexes.join(","));
        let resp = self.client.post(&endpoint).json(&body).send().await?;

        let status = resp.status();
        // An index deleted between discovery and poll is an empty page.
        if status.as_u16() == 404 {
            return Ok(Vec::new());
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(DocstoreError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: SearchResponse = resp.json().await?;
        Ok(parsed.hits.hits)
    }

    /// Index a document under an explicit id. Re-indexing the same id
    /// overwrites, so callers can use a content-derived id for idempotence.
    pub async fn index_document<T: serde::Serialize>(
        &self,
        index: &str,
        doc_id: &str,
        doc: &T,
    ) -> Result<()> {
        let endpoint = format!("{}/{index}/_doc/{doc_id}", self.base_url);
        let resp = self.client.put(&endpoint).json(doc).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(DocstoreError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }

    /// Whether any document in `index` already carries this content hash.
    /// A missing index means no.
    pub async fn content_hash_exists(&self, index: &str, content_hash: &str) -> Result<bool> {
        let endpoint = format!("{}/{index}/_count", self.base_url);
        let body = json!({
            "query": { "term": { "content_hash": content_hash } }
        });
        let resp = self.client.post(&endpoint).json(&body).send().await?;

        let status = resp.status();
        if status.as_u16() == 404 {
            return Ok(false);
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(DocstoreError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: CountResponse = resp.json().await?;
        Ok(parsed.count > 0)
    }
}
