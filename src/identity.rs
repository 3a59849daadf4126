//! Identity resolution: visit signal -> durable user id.
//!
//! Reads go cache first, then the durable store; every store read refreshes the
//! cache entry. A first visit creates the user row. Two concurrent first visits
//! with the same token race on `users.anon_id UNIQUE`; the loser re-reads.

use anyhow::anyhow;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::{self, LookupCache};
use crate::clock;
use crate::error::{PortalError, PortalResult};
use crate::storage::{Storage, StorageError};

/// The per-visit signal a visitor arrives with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisitSignal {
    MacAddress(String),
    AnonToken(String),
    /// Nothing usable; a fresh token is generated
    Anonymous,
}

impl VisitSignal {
    /// A MAC address wins over a supplied token. Blank values count as absent;
    /// anything else is kept exactly as supplied.
    pub fn from_parts(mac_address: Option<&str>, anon_id: Option<&str>) -> Self {
        fn non_blank(v: Option<&str>) -> Option<&str> {
            v.filter(|v| !v.trim().is_empty())
        }

        match (non_blank(mac_address), non_blank(anon_id)) {
            (Some(mac), _) => Self::MacAddress(mac.to_string()),
            (None, Some(token)) => Self::AnonToken(token.to_string()),
            (None, None) => Self::Anonymous,
        }
    }

    /// Canonical anon token for this signal.
    pub fn anon_token(&self) -> String {
        match self {
            Self::MacAddress(mac) => format!("mac_{mac}"),
            Self::AnonToken(token) => token.clone(),
            Self::Anonymous => generate_anon_token(),
        }
    }
}

fn generate_anon_token() -> String {
    format!("anon_{}_{:016x}", clock::now_millis(), rand::random::<u64>())
}

/// Where a resolution was answered from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionSource {
    Cache,
    Store,
    Created,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub user_id: i64,
    pub anon_id: String,
    pub source: ResolutionSource,
}

pub struct IdentityResolver {
    storage: Arc<dyn Storage>,
    cache: Arc<dyn LookupCache>,
}

impl IdentityResolver {
    pub fn new(storage: Arc<dyn Storage>, cache: Arc<dyn LookupCache>) -> Self {
        Self { storage, cache }
    }

    pub async fn resolve(&self, signal: &VisitSignal) -> PortalResult<Resolution> {
        self.resolve_token(signal.anon_token()).await
    }

    pub async fn resolve_token(&self, anon_id: String) -> PortalResult<Resolution> {
        let key = cache::user_key(&anon_id);

        if let Some(cached) = self.cache.get(&key).await? {
            match cached.parse::<i64>() {
                Ok(user_id) => {
                    return Ok(Resolution {
                        user_id,
                        anon_id,
                        source: ResolutionSource::Cache,
                    })
                }
                Err(_) => warn!("Ignoring unparseable cache entry {}: {:?}", key, cached),
            }
        }

        let (user_id, source) = match self.storage.find_user_id(&anon_id).await? {
            Some(user_id) => (user_id, ResolutionSource::Store),
            None => self.create_user(&anon_id).await?,
        };

        self.cache
            .set(&key, &user_id.to_string(), cache::USER_TTL)
            .await?;

        Ok(Resolution {
            user_id,
            anon_id,
            source,
        })
    }

    async fn create_user(&self, anon_id: &str) -> PortalResult<(i64, ResolutionSource)> {
        match self.storage.create_user(anon_id, clock::now()).await {
            Ok(user_id) => {
                debug!("Created user {} for {}", user_id, anon_id);
                Ok((user_id, ResolutionSource::Created))
            }
            Err(StorageError::Conflict) => {
                debug!("Lost user insert race for {}, re-reading", anon_id);
                let user_id = self
                    .storage
                    .find_user_id(anon_id)
                    .await?
                    .ok_or_else(|| anyhow!("user {anon_id} conflicted on insert but is missing"))?;
                Ok((user_id, ResolutionSource::Store))
            }
            Err(StorageError::Other(e)) => Err(PortalError::DependencyUnavailable(e)),
        }
    }
}
