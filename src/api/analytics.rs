//! Analytics, monetization and monitoring handlers

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::analytics::{
    CampaignStats, Cluster, GeofenceReport, KpiSummary, MonetizationSummary, Segments,
};
use crate::error::{PortalError, PortalResult};
use crate::health::{Alert, HealthReport};
use crate::models::{LocationStats, SessionListing, SurveyListing};
use crate::portal::collect_alerts;

use super::handlers::AppState;

#[derive(Debug, Deserialize)]
pub struct GeofenceQuery {
    pub center_lat: Option<f64>,
    pub center_lng: Option<f64>,
    /// Kilometres (default: 1)
    #[serde(default = "default_radius_km")]
    pub radius_km: f64,
}

fn default_radius_km() -> f64 {
    1.0
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    100
}

#[derive(Debug, Deserialize)]
pub struct ClusterQuery {
    /// Grid size in degrees, overrides the configured one
    pub grid: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct AlertsResponse {
    pub alerts: Vec<Alert>,
}

pub async fn kpi(State(state): State<Arc<AppState>>) -> PortalResult<Json<KpiSummary>> {
    Ok(Json(state.reporting.kpi().await?))
}

pub async fn heatmap(State(state): State<Arc<AppState>>) -> PortalResult<Json<Vec<LocationStats>>> {
    Ok(Json(state.geo.heatmap().await?))
}

/// Missing or unparseable parameters are `InvalidInput`
pub async fn geofence(
    State(state): State<Arc<AppState>>,
    params: Result<Query<GeofenceQuery>, QueryRejection>,
) -> PortalResult<Json<GeofenceReport>> {
    let Query(params) = params?;
    let (Some(center_lat), Some(center_lng)) = (params.center_lat, params.center_lng) else {
        return Err(PortalError::InvalidInput(
            "center_lat and center_lng are required".to_string(),
        ));
    };

    let report = state
        .geo
        .geofence(center_lat, center_lng, params.radius_km)
        .await?;
    Ok(Json(report))
}

pub async fn clusters(
    State(state): State<Arc<AppState>>,
    params: Result<Query<ClusterQuery>, QueryRejection>,
) -> PortalResult<Json<Vec<Cluster>>> {
    let Query(params) = params?;
    Ok(Json(state.geo.clusters(params.grid).await?))
}

pub async fn sessions(
    State(state): State<Arc<AppState>>,
    params: Result<Query<ListQuery>, QueryRejection>,
) -> PortalResult<Json<Vec<SessionListing>>> {
    let Query(params) = params?;
    let limit = params.limit.min(1000).max(1);
    let offset = params.offset.max(0);
    Ok(Json(state.reporting.sessions(limit, offset).await?))
}

pub async fn surveys(State(state): State<Arc<AppState>>) -> PortalResult<Json<Vec<SurveyListing>>> {
    Ok(Json(state.reporting.surveys().await?))
}

pub async fn segments(State(state): State<Arc<AppState>>) -> PortalResult<Json<Segments>> {
    Ok(Json(state.reporting.segments().await?))
}

pub async fn campaign_stats(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<i64>,
) -> PortalResult<Json<CampaignStats>> {
    Ok(Json(state.reporting.campaign_stats(campaign_id).await?))
}

pub async fn monetization_summary(
    State(state): State<Arc<AppState>>,
) -> PortalResult<Json<MonetizationSummary>> {
    Ok(Json(state.reporting.monetization().await?))
}

/// Always 200; failed probes show up as `down` services
pub async fn monitoring_status(State(state): State<Arc<AppState>>) -> Json<HealthReport> {
    Json(state.health.status().await)
}

pub async fn alerts(State(state): State<Arc<AppState>>) -> Json<AlertsResponse> {
    Json(AlertsResponse {
        alerts: collect_alerts(&state.reporting, &state.health).await,
    })
}
