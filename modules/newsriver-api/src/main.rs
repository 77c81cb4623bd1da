use std::sync::Arc;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use newsriver_api::{router, AppState};
use newsriver_common::Config;
use newsriver_frontier::{FrontierStore, PgSourceCatalog};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("newsriver=info".parse()?))
        .init();

    info!("Newsriver admin API starting...");

    let config = Config::api_from_env();
    config.log_redacted();

    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect(&config.database_url)
        .await?;
    newsriver_frontier::migrate(&pool).await?;

    let state = Arc::new(AppState {
        frontier: FrontierStore::new(pool.clone()),
        catalog: Arc::new(PgSourceCatalog::new(pool)),
    });

    let app = router(state).layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", config.web_host, config.web_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "Admin API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    info!("Newsriver admin API stopped");
    Ok(())
}
