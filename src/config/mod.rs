use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::analytics::geo::DEFAULT_GRID_DEG;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub api_server: ServerConfig,
    pub health: HealthConfig,
    pub monetization: MonetizationConfig,
    pub alerts: AlertThresholds,
    pub cluster_grid_deg: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Sqlite,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    #[serde(default)]
    pub redis_url: Option<String>,
    /// Capacity of the in-process cache
    pub max_entries: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Memory,
    Redis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// A peer service probed over HTTP by the health aggregator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerService {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    pub peers: Vec<PeerService>,
    #[serde(default = "HealthConfig::default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

impl HealthConfig {
    pub const fn default_probe_timeout_ms() -> u64 {
        2000
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            peers: Vec::new(),
            probe_timeout_ms: Self::default_probe_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MonetizationConfig {
    /// Dollars per 1000 impressions
    pub cpm: f64,
    /// Dollars per click
    pub cpc: f64,
}

impl Default for MonetizationConfig {
    fn default() -> Self {
        Self {
            cpm: 2.0,
            cpc: 0.05,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AlertThresholds {
    pub min_sessions_today: i64,
    pub min_impressions_today: i64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            min_sessions_today: 10,
            min_impressions_today: 20,
        }
    }
}

/// Parse `name=url` pairs separated by commas.
pub fn parse_peer_services(raw: &str) -> anyhow::Result<Vec<PeerService>> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let Some((name, url)) = pair.split_once('=') else {
                bail!("peer service '{pair}' must look like name=url");
            };
            let (name, url) = (name.trim(), url.trim());
            if name.is_empty() || url.is_empty() {
                bail!("peer service '{pair}' has an empty name or url");
            }
            Ok(PeerService {
                name: name.to_string(),
                url: url.to_string(),
            })
        })
        .collect()
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value '{raw}'")),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let backend_str =
            std::env::var("DATABASE_BACKEND").unwrap_or_else(|_| "sqlite".to_string());

        let backend = match backend_str.to_lowercase().as_str() {
            "postgres" | "postgresql" => DatabaseBackend::Postgres,
            _ => DatabaseBackend::Sqlite,
        };

        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://./portal.db".to_string());
        let max_connections = env_or("DATABASE_MAX_CONNECTIONS", 10u32)?;

        let cache_backend = match std::env::var("CACHE_BACKEND")
            .unwrap_or_else(|_| "memory".to_string())
            .to_lowercase()
            .as_str()
        {
            "redis" => CacheBackend::Redis,
            "memory" => CacheBackend::Memory,
            other => {
                tracing::warn!(
                    "Unknown CACHE_BACKEND '{other}', falling back to 'memory'. Supported values: memory, redis"
                );
                CacheBackend::Memory
            }
        };

        let redis_url = match cache_backend {
            CacheBackend::Redis => Some(
                std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            ),
            CacheBackend::Memory => None,
        };

        let api_host = std::env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let api_port = env_or("API_PORT", 3001u16)?;

        let peers = match std::env::var("PEER_SERVICES") {
            Ok(raw) => parse_peer_services(&raw).context("PEER_SERVICES is malformed")?,
            Err(_) => Vec::new(),
        };

        let cluster_grid_deg = env_or("CLUSTER_GRID_DEG", DEFAULT_GRID_DEG)?;
        if !(cluster_grid_deg.is_finite() && cluster_grid_deg > 0.0) {
            bail!("CLUSTER_GRID_DEG must be a positive number of degrees");
        }

        let monetization_defaults = MonetizationConfig::default();
        let alert_defaults = AlertThresholds::default();

        Ok(Config {
            database: DatabaseConfig {
                backend,
                url: database_url,
                max_connections,
            },
            cache: CacheConfig {
                backend: cache_backend,
                redis_url,
                max_entries: env_or("CACHE_MAX_ENTRIES", 100_000u64)?,
            },
            api_server: ServerConfig {
                host: api_host,
                port: api_port,
            },
            health: HealthConfig {
                peers,
                probe_timeout_ms: env_or(
                    "HEALTH_PROBE_TIMEOUT_MS",
                    HealthConfig::default_probe_timeout_ms(),
                )?,
            },
            monetization: MonetizationConfig {
                cpm: env_or("MONETIZATION_CPM", monetization_defaults.cpm)?,
                cpc: env_or("MONETIZATION_CPC", monetization_defaults.cpc)?,
            },
            alerts: AlertThresholds {
                min_sessions_today: env_or(
                    "ALERT_MIN_SESSIONS_TODAY",
                    alert_defaults.min_sessions_today,
                )?,
                min_impressions_today: env_or(
                    "ALERT_MIN_IMPRESSIONS_TODAY",
                    alert_defaults.min_impressions_today,
                )?,
            },
            cluster_grid_deg,
        })
    }
}
