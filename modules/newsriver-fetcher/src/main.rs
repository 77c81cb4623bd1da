use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use redis::aio::ConnectionManager;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use docstore_client::DocstoreClient;
use newsriver_common::Config;
use newsriver_fetcher::{
    spawn_pool, BasicExtractor, FeedPoller, FetchContext, RobotsPolicy, SitemapDiscoverer,
    SpiderSeen,
};
use newsriver_frontier::{FeedStore, FrontierStore, HostStore, PgSourceCatalog};

/// Rows stuck in `fetching` longer than this go back to `pending`.
const STUCK_FETCH_RECLAIM_SECS: f64 = 1800.0;
const RECLAIM_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Parser)]
#[command(name = "newsriver-fetcher", about = "Frontier fetcher worker pool")]
struct Args {
    /// Override FETCHER_WORKERS.
    #[arg(long)]
    workers: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("newsriver=info".parse()?))
        .init();

    info!("Newsriver fetcher starting...");

    let args = Args::parse();
    let mut config = Config::fetcher_from_env();
    if let Some(workers) = args.workers {
        config.fetcher_workers = workers;
    }
    config.log_redacted();

    let pool = PgPoolOptions::new()
        .max_connections(16)
        .connect(&config.database_url)
        .await?;
    newsriver_frontier::migrate(&pool).await?;

    let frontier = FrontierStore::new(pool.clone());
    let hosts = HostStore::new(pool.clone());
    let feeds = FeedStore::new(pool.clone());
    let catalog = Arc::new(PgSourceCatalog::new(pool.clone()));

    let spider_seen = if config.redis_url.is_empty() {
        None
    } else {
        let client = redis::Client::open(config.redis_url.as_str())?;
        let conn = ConnectionManager::new(client).await?;
        Some(SpiderSeen::new(conn, config.crawler_redis_storage_expires))
    };

    let ctx = Arc::new(FetchContext {
        frontier: frontier.clone(),
        hosts: hosts.clone(),
        robots: RobotsPolicy::new(
            hosts.clone(),
            &config.fetcher_user_agent,
            config.robots_ttl_hours,
        ),
        docstore: DocstoreClient::new(&config.docstore_url),
        catalog: catalog.clone(),
        extractor: Arc::new(BasicExtractor),
        client: FetchContext::build_client(&config),
        spider_seen,
        config: config.clone(),
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut tasks = spawn_pool(ctx, config.fetcher_workers, shutdown_rx.clone());
    info!(workers = config.fetcher_workers, "Worker pool running");

    if config.feed_poller_enabled {
        let poller = Arc::new(FeedPoller::new(
            feeds,
            frontier.clone(),
            catalog.clone(),
            config.clone(),
        ));
        tasks.push(tokio::spawn(poller.run(shutdown_rx.clone())));

        let discoverer = SitemapDiscoverer::new(frontier.clone(), catalog, config.clone());
        tasks.push(tokio::spawn(discoverer.run(shutdown_rx.clone())));
    }

    // Recover rows whose worker died mid-fetch.
    {
        let frontier = frontier.clone();
        let mut shutdown = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            loop {
                if *shutdown.borrow() {
                    break;
                }
                if let Err(e) = frontier.reclaim_stuck(STUCK_FETCH_RECLAIM_SECS).await {
                    warn!(error = %e, "Stuck-row reclaim failed");
                }
                tokio::select! {
                    _ = tokio::time::sleep(RECLAIM_INTERVAL) => {}
                    _ = shutdown.changed() => {}
                }
            }
        }));
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    let _ = shutdown_tx.send(true);
    for task in tasks {
        let _ = task.await;
    }

    info!("Newsriver fetcher stopped");
    Ok(())
}
