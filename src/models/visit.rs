use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: i64,
    pub user_id: i64,
    pub location_id: Option<i64>,
    pub device_type: Option<String>,
    pub user_agent: Option<String>,
    pub started_at: i64,
    pub ended_at: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct NewSession {
    pub user_id: i64,
    pub location_id: Option<i64>,
    pub device_type: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Survey {
    pub id: i64,
    pub user_id: i64,
    pub session_id: Option<i64>,
    pub answers: Json<Value>,
    pub submitted_at: i64,
}

/// Session row joined with its visitor and location, for admin listings
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SessionListing {
    pub id: i64,
    pub user_id: i64,
    pub anon_id: Option<String>,
    pub location_id: Option<i64>,
    pub location_name: Option<String>,
    pub brand_id: Option<i64>,
    pub device_type: Option<String>,
    pub user_agent: Option<String>,
    pub started_at: i64,
    pub ended_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SurveyListing {
    pub id: i64,
    pub user_id: i64,
    pub anon_id: String,
    pub session_id: Option<i64>,
    pub answers: Json<Value>,
    pub submitted_at: i64,
    /// Null when the survey's session is unknown
    pub session_started_at: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, FromRow)]
pub struct EngagementCounts {
    pub impressions: i64,
    pub clicks: i64,
    pub sessions: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct SegmentCount {
    pub segment: String,
    pub sessions: i64,
}
