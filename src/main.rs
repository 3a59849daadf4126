use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use portal::api;
use portal::bootstrap::{build_state, open_cache, open_storage};
use portal::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("portal=info")),
        )
        .init();

    let config = Config::from_env()?;
    info!("Loaded configuration");

    let storage = open_storage(&config.database).await?;

    info!("Initializing database...");
    storage.init().await?;
    info!("Database initialized successfully");

    let cache = open_cache(&config.cache).await?;

    if config.health.peers.is_empty() {
        info!("No peer services configured for health probes");
    } else {
        for peer in &config.health.peers {
            info!("Probing peer {} at {}", peer.name, peer.url);
        }
    }

    let state = Arc::new(build_state(&config, storage, cache)?);
    let router = api::create_api_router(state);

    let addr = format!("{}:{}", config.api_server.host, config.api_server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Portal API listening on http://{}", addr);

    axum::serve(listener, router).await?;

    Ok(())
}
