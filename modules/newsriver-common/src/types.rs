use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Source model (read-only snapshot of external configuration) ---

/// How a source is ingested: by polling its feed, by spidering its site,
/// or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestionMode {
    Feed,
    Spider,
    Both,
}

impl IngestionMode {
    pub fn polls_feed(&self) -> bool {
        matches!(self, IngestionMode::Feed | IngestionMode::Both)
    }

    pub fn spiders(&self) -> bool {
        matches!(self, IngestionMode::Spider | IngestionMode::Both)
    }
}

impl std::fmt::Display for IngestionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestionMode::Feed => write!(f, "feed"),
            IngestionMode::Spider => write!(f, "spider"),
            IngestionMode::Both => write!(f, "both"),
        }
    }
}

impl std::str::FromStr for IngestionMode {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "feed" => Ok(Self::Feed),
            "spider" => Ok(Self::Spider),
            "both" => Ok(Self::Both),
            other => Err(format!("unknown IngestionMode: {other}")),
        }
    }
}

/// Priority tier configured on a source. Drives both frontier priority and
/// job schedule computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PriorityTier {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl PriorityTier {
    /// Base frontier priority for URLs of this source, before origin bonus.
    pub fn base_priority(&self) -> i32 {
        match self {
            PriorityTier::Low => 3,
            PriorityTier::Normal => 5,
            PriorityTier::High => 7,
            PriorityTier::Critical => 9,
        }
    }
}

impl std::fmt::Display for PriorityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PriorityTier::Low => write!(f, "low"),
            PriorityTier::Normal => write!(f, "normal"),
            PriorityTier::High => write!(f, "high"),
            PriorityTier::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for PriorityTier {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(format!("unknown PriorityTier: {other}")),
        }
    }
}

/// CSS-ish selectors the external extractor uses for this source.
/// The core passes these through untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionSelectors {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
}

/// Read-only snapshot of a configured source. Owned by the admin system;
/// the core consumes snapshots plus change events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub source_id: Uuid,
    pub name: String,
    pub base_url: String,
    pub feed_url: Option<String>,
    pub sitemap_url: Option<String>,
    pub mode: IngestionMode,
    /// Poll interval hint in minutes. The schedule computation may override.
    pub poll_interval_minutes: Option<u32>,
    pub enabled: bool,
    pub priority: PriorityTier,
    /// Requests per second the source tolerates.
    pub rate_limit: u32,
    pub max_depth: Option<i32>,
    #[serde(default)]
    pub selectors: ExtractionSelectors,
}

impl Source {
    /// Index name for raw extracted documents of this source.
    pub fn raw_index(&self) -> String {
        format!("{}_raw_content", index_token(&self.name))
    }
}

/// Lowercase a source name into an index-safe token (underscores, ascii).
pub fn index_token(name: &str) -> String {
    let lowered = name.to_lowercase();
    let cleaned: String = lowered
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect();
    cleaned.split_whitespace().collect::<Vec<&str>>().join("_")
}

// --- Frontier model ---

/// Where a frontier URL came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlOrigin {
    Feed,
    Sitemap,
    Spider,
    Manual,
}

impl UrlOrigin {
    /// Origin bonus added to the source's base priority. Feed links outrank
    /// sitemap links outrank spider-discovered links for the same source.
    pub fn priority_bonus(&self) -> i32 {
        match self {
            UrlOrigin::Feed => 2,
            UrlOrigin::Sitemap => 1,
            UrlOrigin::Spider | UrlOrigin::Manual => 0,
        }
    }
}

impl std::fmt::Display for UrlOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UrlOrigin::Feed => write!(f, "feed"),
            UrlOrigin::Sitemap => write!(f, "sitemap"),
            UrlOrigin::Spider => write!(f, "spider"),
            UrlOrigin::Manual => write!(f, "manual"),
        }
    }
}

impl std::str::FromStr for UrlOrigin {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "feed" => Ok(Self::Feed),
            "sitemap" => Ok(Self::Sitemap),
            "spider" => Ok(Self::Spider),
            "manual" => Ok(Self::Manual),
            other => Err(format!("unknown UrlOrigin: {other}")),
        }
    }
}

/// Frontier priority for a URL: tier base plus origin bonus, clamped to
/// the 1–10 scale.
pub fn submit_priority(tier: PriorityTier, origin: UrlOrigin) -> i32 {
    (tier.base_priority() + origin.priority_bonus()).clamp(1, 10)
}

/// Frontier row lifecycle. `Dead` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlStatus {
    Pending,
    Fetching,
    Fetched,
    Failed,
    Dead,
}

impl std::fmt::Display for UrlStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UrlStatus::Pending => write!(f, "pending"),
            UrlStatus::Fetching => write!(f, "fetching"),
            UrlStatus::Fetched => write!(f, "fetched"),
            UrlStatus::Failed => write!(f, "failed"),
            UrlStatus::Dead => write!(f, "dead"),
        }
    }
}

impl std::str::FromStr for UrlStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "fetching" => Ok(Self::Fetching),
            "fetched" => Ok(Self::Fetched),
            "failed" => Ok(Self::Failed),
            "dead" => Ok(Self::Dead),
            other => Err(format!("unknown UrlStatus: {other}")),
        }
    }
}

/// Canonical vocabulary for `last_error` on frontier rows. Stored as text;
/// parsed leniently so hand-written rows don't break listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    TooManyRedirects,
    RobotsBlocked,
    UnsupportedContentType,
    NotFound,
    Gone,
    HttpError,
    TransportError,
    Timeout,
    BodyTooLarge,
    SourceDeleted,
}

impl FailureReason {
    /// Reasons that kill a URL outright, with no retry budget.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            FailureReason::RobotsBlocked
                | FailureReason::UnsupportedContentType
                | FailureReason::NotFound
                | FailureReason::Gone
                | FailureReason::SourceDeleted
        )
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::TooManyRedirects => write!(f, "too_many_redirects"),
            FailureReason::RobotsBlocked => write!(f, "robots_blocked"),
            FailureReason::UnsupportedContentType => write!(f, "unsupported_content_type"),
            FailureReason::NotFound => write!(f, "not_found"),
            FailureReason::Gone => write!(f, "gone"),
            FailureReason::HttpError => write!(f, "http_error"),
            FailureReason::TransportError => write!(f, "transport_error"),
            FailureReason::Timeout => write!(f, "timeout"),
            FailureReason::BodyTooLarge => write!(f, "body_too_large"),
            FailureReason::SourceDeleted => write!(f, "source_deleted"),
        }
    }
}

impl std::str::FromStr for FailureReason {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "too_many_redirects" => Ok(Self::TooManyRedirects),
            "robots_blocked" => Ok(Self::RobotsBlocked),
            "unsupported_content_type" => Ok(Self::UnsupportedContentType),
            "not_found" => Ok(Self::NotFound),
            "gone" => Ok(Self::Gone),
            "http_error" => Ok(Self::HttpError),
            "transport_error" => Ok(Self::TransportError),
            "timeout" => Ok(Self::Timeout),
            "body_too_large" => Ok(Self::BodyTooLarge),
            "source_deleted" => Ok(Self::SourceDeleted),
            other => Err(format!("unknown FailureReason: {other}")),
        }
    }
}

// --- Raw document (fetcher → document store) ---

/// Extracted article written to the per-source `{source}_raw_content` index.
/// The external extractor owns field selection; this is the minimum schema
/// the core guarantees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDocument {
    pub canonical_url: String,
    pub title: String,
    pub body_text: String,
    pub fetched_at: DateTime<Utc>,
    pub word_count: usize,
    pub source_id: Uuid,
    pub source_name: String,
    pub classification_status: String,
    pub content_hash: String,
}

impl RawDocument {
    pub fn new(
        canonical_url: String,
        title: String,
        body_text: String,
        source_id: Uuid,
        source_name: String,
        content_hash: String,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        let word_count = body_text.split_whitespace().count();
        Self {
            canonical_url,
            title,
            body_text,
            fetched_at,
            word_count,
            source_id,
            source_name,
            classification_status: "pending".to_string(),
            content_hash,
        }
    }
}
