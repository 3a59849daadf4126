//! Visit flow: resolve the visitor, open a session, pick the ads to serve.

use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::analytics::Reporting;
use crate::cache::LookupCache;
use crate::clock;
use crate::error::{PortalError, PortalResult};
use crate::health::{Alert, HealthAggregator};
use crate::identity::{IdentityResolver, VisitSignal};
use crate::models::{AdPayload, Campaign, NewSession, Survey};
use crate::session::SessionManager;
use crate::storage::Storage;
use crate::targeting::{match_campaigns, VisitContext};

/// A device arriving through an access point.
#[derive(Debug, Clone, Default)]
pub struct CaptiveVisit {
    pub ap_id: Option<String>,
    pub mac_address: Option<String>,
    pub anon_id: Option<String>,
    pub device_type: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptiveSession {
    pub session_id: i64,
    pub user_id: i64,
    pub ads: Vec<AdPayload>,
    /// The visitor has never submitted the survey
    pub survey_required: bool,
}

/// A session reported by a tracking client that already knows its location.
#[derive(Debug, Clone, Default)]
pub struct TrackedVisit {
    pub mac_address: Option<String>,
    pub anon_id: Option<String>,
    pub location_id: Option<i64>,
    pub device_type: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedSession {
    pub session_id: i64,
    pub user_id: i64,
    pub is_first_time: bool,
}

pub struct CaptivePortal {
    storage: Arc<dyn Storage>,
    identity: IdentityResolver,
    sessions: SessionManager,
}

impl CaptivePortal {
    pub fn new(storage: Arc<dyn Storage>, cache: Arc<dyn LookupCache>) -> Self {
        Self {
            identity: IdentityResolver::new(Arc::clone(&storage), Arc::clone(&cache)),
            sessions: SessionManager::new(Arc::clone(&storage), cache),
            storage,
        }
    }

    async fn location_for_ap(&self, ap_id: Option<&str>) -> PortalResult<Option<i64>> {
        let Some(ap_id) = ap_id.map(str::trim).filter(|a| !a.is_empty()) else {
            return Ok(None);
        };

        let location = self.storage.find_location_by_ap(ap_id).await?;
        if location.is_none() {
            debug!("No location registered for access point {}", ap_id);
        }
        Ok(location.map(|l| l.id))
    }

    /// Full captive-portal entry: identity, session, then targeted ads.
    pub async fn start_captive_session(&self, visit: CaptiveVisit) -> PortalResult<CaptiveSession> {
        let location_id = self.location_for_ap(visit.ap_id.as_deref()).await?;

        let signal = VisitSignal::from_parts(visit.mac_address.as_deref(), visit.anon_id.as_deref());
        let resolution = self.identity.resolve(&signal).await?;

        let opened = self
            .sessions
            .open(NewSession {
                user_id: resolution.user_id,
                location_id,
                device_type: visit.device_type.clone(),
                user_agent: visit.user_agent,
            })
            .await?;

        let ctx = VisitContext {
            location_id,
            device_type: visit.device_type,
            is_first_time: opened.is_first_time,
        };
        let ads = self.active_ads(&ctx).await?;

        info!(
            "Captive session {} for user {} ({:?}), {} ads",
            opened.session.id,
            resolution.user_id,
            resolution.source,
            ads.len()
        );

        Ok(CaptiveSession {
            session_id: opened.session.id,
            user_id: resolution.user_id,
            ads,
            survey_required: opened.is_first_time,
        })
    }

    pub async fn start_tracking_session(&self, visit: TrackedVisit) -> PortalResult<TrackedSession> {
        let signal = VisitSignal::from_parts(visit.mac_address.as_deref(), visit.anon_id.as_deref());
        let resolution = self.identity.resolve(&signal).await?;

        let opened = self
            .sessions
            .open(NewSession {
                user_id: resolution.user_id,
                location_id: visit.location_id,
                device_type: visit.device_type,
                user_agent: visit.user_agent,
            })
            .await?;

        Ok(TrackedSession {
            session_id: opened.session.id,
            user_id: resolution.user_id,
            is_first_time: opened.is_first_time,
        })
    }

    pub async fn end_session(&self, session_id: i64) -> PortalResult<bool> {
        self.sessions.close(session_id).await
    }

    /// Missing answers are stored as an empty document.
    pub async fn submit_survey(
        &self,
        session_id: i64,
        answers: Option<Value>,
    ) -> PortalResult<Survey> {
        let answers = answers.unwrap_or_else(|| json!({}));
        self.sessions.submit_survey(session_id, answers).await
    }

    async fn ensure_campaign(&self, campaign_id: i64) -> PortalResult<()> {
        match self.storage.get_campaign(campaign_id).await? {
            Some(_) => Ok(()),
            None => Err(PortalError::NotFound("campaign")),
        }
    }

    pub async fn record_impression(
        &self,
        campaign_id: i64,
        session_id: Option<i64>,
    ) -> PortalResult<()> {
        self.ensure_campaign(campaign_id).await?;
        self.storage
            .record_impression(campaign_id, session_id, clock::now())
            .await?;
        Ok(())
    }

    pub async fn record_click(&self, campaign_id: i64, session_id: Option<i64>) -> PortalResult<()> {
        self.ensure_campaign(campaign_id).await?;
        self.storage
            .record_click(campaign_id, session_id, clock::now())
            .await?;
        Ok(())
    }

    /// Active campaigns admitted by `ctx`, newest first.
    pub async fn active_campaigns(&self, ctx: &VisitContext) -> PortalResult<Vec<Campaign>> {
        let campaigns = self.storage.list_active_campaigns(clock::now()).await?;
        Ok(campaigns
            .into_iter()
            .filter(|c| c.targeting.admits(ctx))
            .collect())
    }

    pub async fn active_ads(&self, ctx: &VisitContext) -> PortalResult<Vec<AdPayload>> {
        let campaigns = self.storage.list_active_campaigns(clock::now()).await?;
        Ok(match_campaigns(&campaigns, ctx))
    }
}

/// KPI warnings followed by critical service alerts.
///
/// A store failure while computing KPIs drops the KPI part; the health probe
/// reports the store itself.
pub async fn collect_alerts(reporting: &Reporting, health: &HealthAggregator) -> Vec<Alert> {
    let (kpi, report) = tokio::join!(reporting.kpi_alerts(), health.status());

    let mut alerts = match kpi {
        Ok(alerts) => alerts,
        Err(e) => {
            warn!("Skipping KPI alerts: {}", e);
            Vec::new()
        }
    };
    alerts.extend(report.alerts);
    alerts
}
