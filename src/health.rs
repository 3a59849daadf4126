//! Liveness of the store, the cache and peer services, rolled into one report.

use anyhow::bail;
use futures::future::{join_all, BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cache::LookupCache;
use crate::config::PeerService;
use crate::storage::Storage;

pub const DATABASE_SERVICE: &str = "database";
pub const CACHE_SERVICE: &str = "cache";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Service,
    Kpi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub severity: Severity,
    pub message: String,
}

impl Alert {
    pub fn service_down(name: &str, detail: &str) -> Self {
        Self {
            kind: AlertKind::Service,
            severity: Severity::Critical,
            message: format!("{name} is down ({detail})"),
        }
    }

    pub fn kpi(message: impl Into<String>) -> Self {
        Self {
            kind: AlertKind::Kpi,
            severity: Severity::Warning,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub services: BTreeMap<String, ServiceState>,
    pub alerts: Vec<Alert>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.services.values().all(|s| *s == ServiceState::Up)
    }
}

struct ProbeOutcome {
    name: String,
    failure: Option<String>,
}

/// Run one probe under its own deadline.
async fn guarded<F>(name: String, timeout: Duration, probe: F) -> ProbeOutcome
where
    F: Future<Output = anyhow::Result<()>>,
{
    let failure = match tokio::time::timeout(timeout, probe).await {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(format!("{e:#}")),
        Err(_) => Some(format!("no answer within {} ms", timeout.as_millis())),
    };
    ProbeOutcome { name, failure }
}

pub struct HealthAggregator {
    storage: Arc<dyn Storage>,
    cache: Arc<dyn LookupCache>,
    peers: Vec<PeerService>,
    client: reqwest::Client,
    probe_timeout: Duration,
}

impl HealthAggregator {
    pub fn new(
        storage: Arc<dyn Storage>,
        cache: Arc<dyn LookupCache>,
        peers: Vec<PeerService>,
        probe_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(probe_timeout).build()?;

        Ok(Self {
            storage,
            cache,
            peers,
            client,
            probe_timeout,
        })
    }

    async fn probe_peer(&self, url: &str) -> anyhow::Result<()> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            bail!("HTTP {}", response.status().as_u16());
        }
        Ok(())
    }

    /// Probe everything concurrently. Never fails: a probe that errors or
    /// times out marks its service down and adds a critical alert.
    pub async fn status(&self) -> HealthReport {
        let timeout = self.probe_timeout;

        let mut probes: Vec<BoxFuture<'_, ProbeOutcome>> = vec![
            guarded(DATABASE_SERVICE.to_string(), timeout, self.storage.ping()).boxed(),
            guarded(CACHE_SERVICE.to_string(), timeout, self.cache.ping()).boxed(),
        ];
        for peer in &self.peers {
            probes.push(guarded(peer.name.clone(), timeout, self.probe_peer(&peer.url)).boxed());
        }

        let mut report = HealthReport {
            services: BTreeMap::new(),
            alerts: Vec::new(),
        };

        for outcome in join_all(probes).await {
            let state = match outcome.failure {
                None => {
                    debug!("{} is up", outcome.name);
                    ServiceState::Up
                }
                Some(detail) => {
                    warn!("{} is down: {}", outcome.name, detail);
                    report.alerts.push(Alert::service_down(&outcome.name, &detail));
                    ServiceState::Down
                }
            };
            report.services.insert(outcome.name, state);
        }

        report
    }
}
