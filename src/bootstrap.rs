//! Wiring shared by the server and the admin CLI.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::analytics::{GeoAnalytics, Reporting};
use crate::api::AppState;
use crate::cache::{LookupCache, MemoryCache, RedisCache};
use crate::config::{CacheBackend, CacheConfig, Config, DatabaseBackend, DatabaseConfig};
use crate::health::HealthAggregator;
use crate::portal::CaptivePortal;
use crate::storage::{PostgresStorage, SqliteStorage, Storage};

pub async fn open_storage(config: &DatabaseConfig) -> Result<Arc<dyn Storage>> {
    let storage: Arc<dyn Storage> = match config.backend {
        DatabaseBackend::Sqlite => {
            info!("Using SQLite storage: {}", config.url);
            Arc::new(SqliteStorage::new(&config.url, config.max_connections).await?)
        }
        DatabaseBackend::Postgres => {
            info!("Using PostgreSQL storage: {}", config.url);
            Arc::new(PostgresStorage::new(&config.url, config.max_connections).await?)
        }
    };
    Ok(storage)
}

pub async fn open_cache(config: &CacheConfig) -> Result<Arc<dyn LookupCache>> {
    let cache: Arc<dyn LookupCache> = match config.backend {
        CacheBackend::Memory => {
            info!("Using in-process cache ({} entries)", config.max_entries);
            Arc::new(MemoryCache::new(config.max_entries))
        }
        CacheBackend::Redis => {
            let url = config
                .redis_url
                .as_deref()
                .context("CACHE_BACKEND=redis requires REDIS_URL")?;
            info!("Using Redis cache: {}", url);
            Arc::new(RedisCache::connect(url).await?)
        }
    };
    Ok(cache)
}

pub fn build_state(
    config: &Config,
    storage: Arc<dyn Storage>,
    cache: Arc<dyn LookupCache>,
) -> Result<AppState> {
    let health = HealthAggregator::new(
        Arc::clone(&storage),
        Arc::clone(&cache),
        config.health.peers.clone(),
        Duration::from_millis(config.health.probe_timeout_ms),
    )?;

    Ok(AppState {
        portal: CaptivePortal::new(Arc::clone(&storage), cache),
        geo: GeoAnalytics::new(Arc::clone(&storage), config.cluster_grid_deg),
        reporting: Reporting::new(storage, config.monetization, config.alerts),
        health,
    })
}
