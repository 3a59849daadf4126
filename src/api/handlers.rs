use axum::{
    extract::{Query, State},
    http::{header, HeaderMap},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::analytics::{GeoAnalytics, Reporting};
use crate::error::PortalResult;
use crate::health::HealthAggregator;
use crate::models::Campaign;
use crate::portal::{CaptivePortal, CaptiveSession, CaptiveVisit, TrackedSession, TrackedVisit};
use crate::targeting::VisitContext;

pub struct AppState {
    pub portal: CaptivePortal,
    pub geo: GeoAnalytics,
    pub reporting: Reporting,
    pub health: HealthAggregator,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
}

#[derive(Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Debug, Deserialize)]
pub struct StartCaptiveRequest {
    #[serde(alias = "apId")]
    pub ap_id: Option<String>,
    #[serde(alias = "macAddress")]
    pub mac_address: Option<String>,
    #[serde(alias = "anonId")]
    pub anon_id: Option<String>,
    #[serde(alias = "deviceType")]
    pub device_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitSurveyRequest {
    #[serde(alias = "sessionId")]
    pub session_id: i64,
    #[serde(default)]
    pub answers: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitSurveyResponse {
    pub success: bool,
    pub survey_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTrackingRequest {
    pub anon_id: Option<String>,
    #[serde(alias = "mac_address")]
    pub mac_address: Option<String>,
    pub location_id: Option<i64>,
    pub device_type: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EndSessionRequest {
    #[serde(alias = "sessionId")]
    pub session_id: i64,
}

#[derive(Debug, Serialize)]
pub struct EndSessionResponse {
    pub ok: bool,
    /// False when the session id is unknown
    pub ended: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementRequest {
    #[serde(alias = "campaign_id")]
    pub campaign_id: i64,
    #[serde(default, alias = "session_id")]
    pub session_id: Option<i64>,
}

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        service: "portal",
    })
}

/// Captive portal entry: resolve the visitor, open a session, return ads
pub async fn start_captive_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<StartCaptiveRequest>,
) -> PortalResult<Json<CaptiveSession>> {
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let session = state
        .portal
        .start_captive_session(CaptiveVisit {
            ap_id: payload.ap_id,
            mac_address: payload.mac_address,
            anon_id: payload.anon_id,
            device_type: payload.device_type,
            user_agent,
        })
        .await?;

    Ok(Json(session))
}

pub async fn submit_survey(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SubmitSurveyRequest>,
) -> PortalResult<Json<SubmitSurveyResponse>> {
    let survey = state
        .portal
        .submit_survey(payload.session_id, payload.answers)
        .await?;

    Ok(Json(SubmitSurveyResponse {
        success: true,
        survey_id: survey.id,
    }))
}

pub async fn start_tracking_session(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<StartTrackingRequest>,
) -> PortalResult<Json<TrackedSession>> {
    let session = state
        .portal
        .start_tracking_session(TrackedVisit {
            mac_address: payload.mac_address,
            anon_id: payload.anon_id,
            location_id: payload.location_id,
            device_type: payload.device_type,
            user_agent: payload.user_agent,
        })
        .await?;

    Ok(Json(session))
}

pub async fn end_session(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<EndSessionRequest>,
) -> PortalResult<Json<EndSessionResponse>> {
    let ended = state.portal.end_session(payload.session_id).await?;
    Ok(Json(EndSessionResponse { ok: true, ended }))
}

pub async fn record_impression(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<EngagementRequest>,
) -> PortalResult<Json<OkResponse>> {
    state
        .portal
        .record_impression(payload.campaign_id, payload.session_id)
        .await?;
    Ok(Json(OkResponse { ok: true }))
}

pub async fn record_click(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<EngagementRequest>,
) -> PortalResult<Json<OkResponse>> {
    state
        .portal
        .record_click(payload.campaign_id, payload.session_id)
        .await?;
    Ok(Json(OkResponse { ok: true }))
}

/// Active campaigns admitted by the targeting context in the query string
pub async fn active_campaigns(
    State(state): State<Arc<AppState>>,
    Query(ctx): Query<VisitContext>,
) -> PortalResult<Json<Vec<Campaign>>> {
    Ok(Json(state.portal.active_campaigns(&ctx).await?))
}
