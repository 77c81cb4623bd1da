use std::sync::Arc;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use docstore_client::DocstoreClient;
use newsriver_common::Config;
use newsriver_router::{
    ChannelStore, CursorStore, PublishHistoryStore, RedisPublisher, StreamRouter,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("newsriver=info".parse()?))
        .init();

    info!("Newsriver stream router starting...");

    let config = Config::router_from_env();
    config.log_redacted();

    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect(&config.database_url)
        .await?;
    newsriver_router::migrate(&pool).await?;

    let publisher = Arc::new(RedisPublisher::connect(&config.redis_url).await?);

    let mut router = StreamRouter::new(
        DocstoreClient::new(&config.docstore_url),
        ChannelStore::new(pool.clone()),
        PublishHistoryStore::new(pool.clone()),
        CursorStore::new(pool),
        publisher,
        config,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let run = tokio::spawn(async move { router.run(shutdown_rx).await });

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    let _ = shutdown_tx.send(true);
    let _ = run.await;

    info!("Newsriver stream router stopped");
    Ok(())
}
