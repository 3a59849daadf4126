use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::analytics::{
    alerts, campaign_stats, clusters, geofence, heatmap, kpi, monetization_summary,
    monitoring_status, segments, sessions, surveys,
};
use super::handlers::{
    active_campaigns, end_session, health_check, record_click, record_impression,
    start_captive_session, start_tracking_session, submit_survey, AppState,
};

pub fn create_api_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let visit_routes = Router::new()
        .route("/api/captive/start-session", post(start_captive_session))
        .route("/api/captive/submit-survey", post(submit_survey))
        .route("/api/tracking/session-start", post(start_tracking_session))
        .route("/api/tracking/session-end", post(end_session))
        .route("/api/tracking/impression", post(record_impression))
        .route("/api/tracking/click", post(record_click))
        .route("/campaigns/active", get(active_campaigns));

    let analytics_routes = Router::new()
        .route("/api/analytics/kpi", get(kpi))
        .route("/api/analytics/heatmap", get(heatmap))
        .route("/api/analytics/geofence", get(geofence))
        .route("/api/analytics/clusters", get(clusters))
        .route("/api/analytics/segments", get(segments))
        .route("/api/analytics/sessions", get(sessions))
        .route("/api/analytics/surveys", get(surveys))
        .route("/api/analytics/campaigns/{id}", get(campaign_stats))
        .route("/api/monetization/summary", get(monetization_summary))
        .route("/api/monitoring/status", get(monitoring_status))
        .route("/alerts", get(alerts));

    Router::new()
        .route("/health", get(health_check))
        .merge(visit_routes)
        .merge(analytics_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
