//! Engagement counters, segmentation, campaign CTR and revenue estimates.

use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::clock;
use crate::config::{AlertThresholds, MonetizationConfig};
use crate::error::{PortalError, PortalResult};
use crate::health::Alert;
use crate::models::{EngagementCounts, SegmentCount, SessionListing, SurveyListing};
use crate::storage::Storage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KpiSummary {
    pub totals: EngagementCounts,
    pub today: EngagementCounts,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segments {
    pub device: Vec<SegmentCount>,
    pub first_time: Vec<SegmentCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignStats {
    pub campaign_id: i64,
    pub impressions: i64,
    pub clicks: i64,
    /// Percent, two decimals
    pub ctr: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonetizationSummary {
    pub impressions: i64,
    pub clicks: i64,
    pub cpm: f64,
    pub cpc: f64,
    pub estimated_revenue: f64,
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Clicks per impression in percent, 0 without impressions.
pub fn click_through_rate(impressions: i64, clicks: i64) -> f64 {
    if impressions <= 0 {
        return 0.0;
    }
    round_cents(clicks as f64 / impressions as f64 * 100.0)
}

pub fn estimated_revenue(impressions: i64, clicks: i64, rates: &MonetizationConfig) -> f64 {
    round_cents(impressions as f64 / 1000.0 * rates.cpm + clicks as f64 * rates.cpc)
}

/// KPI warnings for today's counters.
pub fn kpi_alerts_for(today: &EngagementCounts, thresholds: &AlertThresholds) -> Vec<Alert> {
    let mut alerts = Vec::new();

    if today.sessions < thresholds.min_sessions_today {
        alerts.push(Alert::kpi(format!("Low sessions today ({})", today.sessions)));
    }
    if today.impressions < thresholds.min_impressions_today {
        alerts.push(Alert::kpi(format!(
            "Low impressions today ({})",
            today.impressions
        )));
    }
    if today.clicks == 0 && today.impressions > 0 {
        alerts.push(Alert::kpi("No clicks recorded today"));
    }

    alerts
}

pub struct Reporting {
    storage: Arc<dyn Storage>,
    monetization: MonetizationConfig,
    thresholds: AlertThresholds,
}

impl Reporting {
    pub fn new(
        storage: Arc<dyn Storage>,
        monetization: MonetizationConfig,
        thresholds: AlertThresholds,
    ) -> Self {
        Self {
            storage,
            monetization,
            thresholds,
        }
    }

    async fn today(&self) -> PortalResult<EngagementCounts> {
        let since = clock::start_of_day(clock::now());
        Ok(self.storage.engagement_counts(Some(since)).await?)
    }

    pub async fn kpi(&self) -> PortalResult<KpiSummary> {
        let totals = self.storage.engagement_counts(None).await?;
        let today = self.today().await?;
        Ok(KpiSummary { totals, today })
    }

    pub async fn segments(&self) -> PortalResult<Segments> {
        Ok(Segments {
            device: self.storage.device_segments().await?,
            first_time: self.storage.visitor_segments().await?,
        })
    }

    /// Newest sessions first; callers clamp `limit` and `offset`
    pub async fn sessions(&self, limit: i64, offset: i64) -> PortalResult<Vec<SessionListing>> {
        Ok(self.storage.list_sessions(limit, offset).await?)
    }

    pub async fn surveys(&self) -> PortalResult<Vec<SurveyListing>> {
        Ok(self.storage.list_surveys().await?)
    }

    pub async fn campaign_stats(&self, campaign_id: i64) -> PortalResult<CampaignStats> {
        if self.storage.get_campaign(campaign_id).await?.is_none() {
            return Err(PortalError::NotFound("campaign"));
        }

        let (impressions, clicks) = self.storage.campaign_engagement(campaign_id).await?;

        Ok(CampaignStats {
            campaign_id,
            impressions,
            clicks,
            ctr: click_through_rate(impressions, clicks),
        })
    }

    /// Revenue estimate over all-time counts
    pub async fn monetization(&self) -> PortalResult<MonetizationSummary> {
        let totals = self.storage.engagement_counts(None).await?;

        Ok(MonetizationSummary {
            impressions: totals.impressions,
            clicks: totals.clicks,
            cpm: self.monetization.cpm,
            cpc: self.monetization.cpc,
            estimated_revenue: estimated_revenue(
                totals.impressions,
                totals.clicks,
                &self.monetization,
            ),
        })
    }

    pub async fn kpi_alerts(&self) -> PortalResult<Vec<Alert>> {
        let today = self.today().await?;
        let alerts = kpi_alerts_for(&today, &self.thresholds);
        debug!("{} KPI alerts for today", alerts.len());
        Ok(alerts)
    }
}
