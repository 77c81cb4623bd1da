use std::env;
use std::time::Duration;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Stores
    pub database_url: String,
    pub redis_url: String,
    pub docstore_url: String,

    // Fetcher
    pub fetcher_workers: usize,
    pub fetcher_user_agent: String,
    pub fetcher_follow_redirects: bool,
    pub fetcher_max_redirects: u32,
    pub fetcher_request_timeout: Duration,
    pub fetcher_max_body_bytes: u64,
    pub fetcher_max_retries: i32,
    pub fetcher_claim_retry_delay: Duration,
    pub crawler_max_depth: i32,
    pub robots_ttl_hours: i64,
    /// TTL for the spider's recently-seen dedup keys in Redis.
    pub crawler_redis_storage_expires: Duration,
    /// When empty, fire-and-forget pipeline emission is a no-op.
    pub pipeline_emit_url: String,

    // Feed poller
    pub feed_poller_enabled: bool,
    pub feed_poller_poll_interval: Duration,
    pub feed_poller_max_concurrency: usize,
    pub sitemap_max_age_days: i64,

    // Job lifecycle & scheduler
    pub events_stream: String,
    pub events_group: String,
    pub events_consumer: String,
    pub scheduler_batch_size: i64,
    pub scheduler_max_running_minutes: i64,

    // Router
    pub router_discovery_interval: Duration,
    pub router_poll_interval: Duration,
    pub router_batch_size: usize,
    pub router_max_channels_per_article: usize,

    // Web server (admin API)
    pub web_host: String,
    pub web_port: u16,
}

impl Config {
    /// Config for the fetcher service (workers + feed poller).
    /// Panics with a clear message if required vars are missing.
    pub fn fetcher_from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            redis_url: env::var("REDIS_URL").unwrap_or_default(),
            docstore_url: required_env("DOCSTORE_URL"),
            ..Self::base_from_env()
        }
    }

    /// Config for the job lifecycle + interval scheduler service.
    pub fn jobs_from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            redis_url: required_env("REDIS_URL"),
            docstore_url: env::var("DOCSTORE_URL").unwrap_or_default(),
            ..Self::base_from_env()
        }
    }

    /// Config for the stream router service.
    pub fn router_from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            redis_url: required_env("REDIS_URL"),
            docstore_url: required_env("DOCSTORE_URL"),
            ..Self::base_from_env()
        }
    }

    /// Config for the admin API server.
    pub fn api_from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            redis_url: env::var("REDIS_URL").unwrap_or_default(),
            docstore_url: env::var("DOCSTORE_URL").unwrap_or_default(),
            ..Self::base_from_env()
        }
    }

    /// Defaults shared by every service; required store URLs are filled in
    /// by the per-service constructors.
    fn base_from_env() -> Self {
        Self {
            database_url: String::new(),
            redis_url: String::new(),
            docstore_url: String::new(),
            fetcher_workers: env_parse("FETCHER_WORKERS", 4),
            fetcher_user_agent: env::var("FETCHER_USER_AGENT")
                .unwrap_or_else(|_| "newsriver-fetcher/0.1".to_string()),
            fetcher_follow_redirects: env_parse("FETCHER_FOLLOW_REDIRECTS", true),
            fetcher_max_redirects: env_parse("FETCHER_MAX_REDIRECTS", 5),
            fetcher_request_timeout: Duration::from_secs(env_parse(
                "FETCHER_REQUEST_TIMEOUT_SECS",
                30,
            )),
            fetcher_max_body_bytes: env_parse("FETCHER_MAX_BODY_BYTES", 10 * 1024 * 1024),
            fetcher_max_retries: env_parse("FETCHER_MAX_RETRIES", 3),
            fetcher_claim_retry_delay: Duration::from_millis(env_parse(
                "FETCHER_CLAIM_RETRY_DELAY_MS",
                1000,
            )),
            crawler_max_depth: env_parse("CRAWLER_MAX_DEPTH", 3),
            robots_ttl_hours: env_parse("ROBOTS_TTL_HOURS", 24),
            crawler_redis_storage_expires: Duration::from_secs(env_parse(
                "CRAWLER_REDIS_STORAGE_EXPIRES",
                7 * 24 * 3600,
            )),
            pipeline_emit_url: env::var("PIPELINE_EMIT_URL").unwrap_or_default(),
            feed_poller_enabled: env_parse("FEED_POLLER_ENABLED", false),
            feed_poller_poll_interval: Duration::from_secs(env_parse(
                "FEED_POLLER_POLL_INTERVAL",
                30,
            )),
            feed_poller_max_concurrency: env_parse("FEED_POLLER_MAX_CONCURRENCY", 10),
            sitemap_max_age_days: env_parse("SITEMAP_MAX_AGE_DAYS", 7),
            events_stream: env::var("EVENTS_STREAM").unwrap_or_else(|_| "source-events".into()),
            events_group: env::var("EVENTS_GROUP").unwrap_or_else(|_| "newsriver-jobs".into()),
            events_consumer: env::var("EVENTS_CONSUMER").unwrap_or_else(|_| default_consumer_name()),
            scheduler_batch_size: env_parse("SCHEDULER_BATCH_SIZE", 10),
            scheduler_max_running_minutes: env_parse("SCHEDULER_MAX_RUNNING_MINUTES", 60),
            router_discovery_interval: Duration::from_secs(env_parse(
                "ROUTER_DISCOVERY_INTERVAL_SECS",
                300,
            )),
            router_poll_interval: Duration::from_secs(env_parse("ROUTER_POLL_INTERVAL_SECS", 30)),
            router_batch_size: env_parse("ROUTER_BATCH_SIZE", 100),
            router_max_channels_per_article: env_parse("ROUTER_MAX_CHANNELS_PER_ARTICLE", 30),
            web_host: env::var("WEB_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            web_port: env_parse("WEB_PORT", 3000),
        }
    }

    /// Log connection targets without credentials.
    pub fn log_redacted(&self) {
        let vars = [
            ("DATABASE_URL", &self.database_url),
            ("REDIS_URL", &self.redis_url),
            ("DOCSTORE_URL", &self.docstore_url),
        ];
        for (name, value) in vars {
            if value.is_empty() {
                tracing::info!("{name} = (empty)");
            } else {
                tracing::info!("{name} = ({} chars)", value.len());
            }
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn default_consumer_name() -> String {
    let host = env::var("HOSTNAME").unwrap_or_else(|_| "local".to_string());
    format!("consumer-{host}-{}", std::process::id())
}
