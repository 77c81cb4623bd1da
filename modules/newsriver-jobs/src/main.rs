use std::sync::Arc;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use newsriver_common::Config;
use newsriver_events::RedisEventStream;
use newsriver_frontier::{FeedStore, FrontierStore, PgSourceCatalog};
use newsriver_jobs::{
    FrontierDispatch, IntervalScheduler, JobLifecycle, JobStore, ProcessedEventStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("newsriver=info".parse()?))
        .init();

    info!("Newsriver job service starting...");

    let config = Config::jobs_from_env();
    config.log_redacted();

    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect(&config.database_url)
        .await?;
    newsriver_frontier::migrate(&pool).await?;
    newsriver_jobs::migrate(&pool).await?;

    let stream = Arc::new(
        RedisEventStream::connect(
            &config.redis_url,
            &config.events_stream,
            &config.events_group,
            &config.events_consumer,
        )
        .await?,
    );

    let jobs = JobStore::new(pool.clone());
    let ledger = ProcessedEventStore::new(pool.clone());
    let catalog = Arc::new(PgSourceCatalog::new(pool.clone()));
    let frontier = FrontierStore::new(pool.clone());
    let feeds = FeedStore::new(pool.clone());

    let lifecycle = Arc::new(JobLifecycle::new(
        stream,
        jobs.clone(),
        ledger,
        catalog.clone(),
        frontier.clone(),
        feeds.clone(),
    ));

    let dispatch = Arc::new(FrontierDispatch::new(frontier, feeds));
    let scheduler = IntervalScheduler::new(jobs, catalog, dispatch, config.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let consumer = {
        let lifecycle = lifecycle.clone();
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { lifecycle.run(shutdown).await })
    };
    let reconciler = {
        let lifecycle = lifecycle.clone();
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { lifecycle.run_reconciliation(shutdown).await })
    };
    let dispatcher = {
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { scheduler.run(shutdown).await })
    };

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    let _ = shutdown_tx.send(true);
    let _ = consumer.await;
    let _ = reconciler.await;
    let _ = dispatcher.await;

    info!("Newsriver job service stopped");
    Ok(())
}
