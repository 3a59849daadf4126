use crate::models::{
    Campaign, EngagementCounts, Location, LocationStats, NewCampaign, NewLocation, NewSession,
    SegmentCount, Session, SessionListing, Survey, SurveyListing,
};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    /// A uniqueness constraint rejected the insert (`users.anon_id`, `surveys.user_id`).
    #[error("row already exists")]
    Conflict,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Durable store: the source of truth for visitors, sessions and campaigns.
///
/// Timestamps are supplied by the caller as Unix seconds.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Initialize the storage (create tables, indexes)
    async fn init(&self) -> Result<()>;

    /// Trivial liveness query
    async fn ping(&self) -> Result<()>;

    async fn find_user_id(&self, anon_id: &str) -> Result<Option<i64>>;

    /// Insert a user; `Conflict` when the anon id is already taken
    async fn create_user(&self, anon_id: &str, created_at: i64) -> StorageResult<i64>;

    async fn create_session(&self, session: &NewSession, started_at: i64) -> Result<Session>;

    async fn get_session(&self, session_id: i64) -> Result<Option<Session>>;

    /// Stamp `ended_at` on an open session. A session that is already closed
    /// keeps its first timestamp. Returns false if the id is unknown.
    async fn end_session(&self, session_id: i64, ended_at: i64) -> Result<bool>;

    /// Sessions newest first, joined with visitor and location
    async fn list_sessions(&self, limit: i64, offset: i64) -> Result<Vec<SessionListing>>;

    async fn has_survey(&self, user_id: i64) -> Result<bool>;

    /// Insert a survey; `Conflict` when the user already has one
    async fn create_survey(
        &self,
        user_id: i64,
        session_id: i64,
        answers: &Value,
        submitted_at: i64,
    ) -> StorageResult<Survey>;

    /// Every survey newest first, with the visitor and the start of its session
    async fn list_surveys(&self) -> Result<Vec<SurveyListing>>;

    async fn create_location(&self, location: &NewLocation, created_at: i64) -> Result<Location>;

    async fn find_location_by_ap(&self, ap_identifier: &str) -> Result<Option<Location>>;

    /// Located sites (non-null coordinates) with sessions started at or after `since`
    async fn location_session_counts(&self, since: i64) -> Result<Vec<LocationStats>>;

    async fn create_campaign(&self, campaign: &NewCampaign, created_at: i64) -> Result<Campaign>;

    async fn get_campaign(&self, campaign_id: i64) -> Result<Option<Campaign>>;

    /// Campaigns active at `now`, newest-created first
    async fn list_active_campaigns(&self, now: i64) -> Result<Vec<Campaign>>;

    async fn record_impression(
        &self,
        campaign_id: i64,
        session_id: Option<i64>,
        shown_at: i64,
    ) -> Result<()>;

    async fn record_click(
        &self,
        campaign_id: i64,
        session_id: Option<i64>,
        clicked_at: i64,
    ) -> Result<()>;

    /// Impression, click and session counts since `since` (all time when None)
    async fn engagement_counts(&self, since: Option<i64>) -> Result<EngagementCounts>;

    /// (impressions, clicks) for one campaign
    async fn campaign_engagement(&self, campaign_id: i64) -> Result<(i64, i64)>;

    /// Session counts by device type, `unknown` for sessions without one
    async fn device_segments(&self) -> Result<Vec<SegmentCount>>;

    /// Session counts split into `first_time` and `repeat` visitors
    async fn visitor_segments(&self) -> Result<Vec<SegmentCount>>;
}

pub(crate) fn decode_campaigns(rows: Vec<crate::models::CampaignRow>) -> Vec<Campaign> {
    rows.into_iter()
        .filter_map(|row| {
            let id = row.id;
            match Campaign::try_from(row) {
                Ok(campaign) => Some(campaign),
                Err(e) => {
                    tracing::warn!("Skipping campaign {} with malformed documents: {}", id, e);
                    None
                }
            }
        })
        .collect()
}
