//! API integration tests driving the router in-process

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use portal::api::{self, AppState};
use portal::bootstrap::build_state;
use portal::cache::MemoryCache;
use portal::config::{
    AlertThresholds, CacheBackend, CacheConfig, Config, DatabaseBackend, DatabaseConfig,
    HealthConfig, MonetizationConfig, ServerConfig,
};
use portal::models::{NewCampaign, NewLocation, Targeting};
use portal::storage::{SqliteStorage, Storage};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

/// Helper to create test storage
async fn create_test_storage() -> Arc<dyn Storage> {
    let storage = SqliteStorage::new("sqlite::memory:", 5).await.unwrap();
    storage.init().await.unwrap();
    Arc::new(storage)
}

/// Helper to create test config
fn create_test_config() -> Config {
    Config {
        database: DatabaseConfig {
            backend: DatabaseBackend::Sqlite,
            url: "sqlite::memory:".to_string(),
            max_connections: 5,
        },
        cache: CacheConfig {
            backend: CacheBackend::Memory,
            redis_url: None,
            max_entries: 1000,
        },
        api_server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 3001,
        },
        health: HealthConfig::default(),
        monetization: MonetizationConfig::default(),
        alerts: AlertThresholds::default(),
        cluster_grid_deg: 0.02,
    }
}

async fn create_test_app() -> (Router, Arc<dyn Storage>) {
    let storage = create_test_storage().await;
    let state: AppState = build_state(
        &create_test_config(),
        Arc::clone(&storage),
        Arc::new(MemoryCache::new(1000)),
    )
    .unwrap();
    (api::create_api_router(Arc::new(state)), storage)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _) = create_test_app().await;
    let (status, body) = send(&app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
}

#[tokio::test]
async fn test_captive_flow_over_http() {
    let (app, storage) = create_test_app().await;
    storage
        .create_location(
            &NewLocation {
                name: "Cafe".to_string(),
                ap_identifier: Some("ap-cafe".to_string()),
                latitude: Some(10.77),
                longitude: Some(106.70),
                ..Default::default()
            },
            0,
        )
        .await
        .unwrap();
    let mut welcome = NewCampaign::active("Welcome");
    welcome.targeting = Targeting {
        first_time_only: Some(true),
        ..Default::default()
    };
    storage.create_campaign(&welcome, 0).await.unwrap();

    let request = Request::builder()
        .method("POST")
        .uri("/api/captive/start-session")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::USER_AGENT, "test-agent/1.0")
        .body(Body::from(
            json!({ "ap_id": "ap-cafe", "mac_address": "AA:BB:CC", "device_type": "mobile" })
                .to_string(),
        ))
        .unwrap();
    let (status, first) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["surveyRequired"], true);
    assert_eq!(first["ads"][0]["name"], "Welcome");
    assert_eq!(first["ads"][0]["content"], json!({ "text": "Welcome" }));
    let session_id = first["sessionId"].as_i64().unwrap();

    let session = storage.get_session(session_id).await.unwrap().unwrap();
    assert_eq!(session.user_agent.as_deref(), Some("test-agent/1.0"));

    let (status, body) = send(
        &app,
        post_json(
            "/api/captive/submit-survey",
            json!({ "session_id": session_id, "answers": { "q1": "a" } }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, body) = send(
        &app,
        post_json(
            "/api/captive/submit-survey",
            json!({ "session_id": session_id, "answers": {} }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Survey already submitted");

    let (_, second) = send(
        &app,
        post_json(
            "/api/captive/start-session",
            json!({ "ap_id": "ap-cafe", "mac_address": "AA:BB:CC", "device_type": "mobile" }),
        ),
    )
    .await;
    assert_eq!(second["surveyRequired"], false);
    assert_eq!(second["userId"], first["userId"]);
    assert_eq!(second["ads"], json!([]));
}

#[tokio::test]
async fn test_survey_for_missing_session_is_404() {
    let (app, _) = create_test_app().await;
    let (status, body) = send(
        &app,
        post_json("/api/captive/submit-survey", json!({ "session_id": 999 })),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("session"));
}

#[tokio::test]
async fn test_tracking_endpoints() {
    let (app, storage) = create_test_app().await;
    let campaign = storage
        .create_campaign(&NewCampaign::active("Tracked"), 0)
        .await
        .unwrap();

    let (status, started) = send(
        &app,
        post_json(
            "/api/tracking/session-start",
            json!({ "anonId": "tracker-9", "deviceType": "desktop" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(started["isFirstTime"], true);
    let session_id = started["sessionId"].as_i64().unwrap();

    let (status, _) = send(
        &app,
        post_json(
            "/api/tracking/impression",
            json!({ "campaignId": campaign.id, "sessionId": session_id }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        post_json("/api/tracking/click", json!({ "campaignId": campaign.id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        post_json("/api/tracking/click", json!({ "campaignId": campaign.id + 50 })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, ended) = send(
        &app,
        post_json("/api/tracking/session-end", json!({ "session_id": session_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ended["ended"], true);

    let (_, stats) = send(
        &app,
        get(&format!("/api/analytics/campaigns/{}", campaign.id)),
    )
    .await;
    assert_eq!(stats["impressions"], 1);
    assert_eq!(stats["clicks"], 1);
    assert_eq!(stats["ctr"], 100.0);
}

#[tokio::test]
async fn test_active_campaigns_query() {
    let (app, storage) = create_test_app().await;

    let mut mobile = NewCampaign::active("Mobile only");
    mobile.targeting = Targeting {
        device_types: Some(vec!["mobile".to_string()]),
        ..Default::default()
    };
    storage.create_campaign(&mobile, 0).await.unwrap();
    storage
        .create_campaign(&NewCampaign::active("Everyone"), 0)
        .await
        .unwrap();

    let (status, body) = send(&app, get("/campaigns/active?deviceType=desktop")).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Everyone"]);

    let (_, body) = send(&app, get("/campaigns/active")).await;
    assert_eq!(body.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_analytics_endpoints() {
    let (app, _) = create_test_app().await;

    let (status, kpi) = send(&app, get("/api/analytics/kpi")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(kpi["totals"]["sessions"], 0);

    let (status, segments) = send(&app, get("/api/analytics/segments")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(segments["device"].is_array());
    assert!(segments["first_time"].is_array());

    let (status, money) = send(&app, get("/api/monetization/summary")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(money["estimated_revenue"], 0.0);

    let (status, _) = send(
        &app,
        get("/api/analytics/geofence?center_lat=10.77&center_lng=106.70&radius_km=2"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        get("/api/analytics/geofence?center_lat=123&center_lng=106.70"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("latitude"));

    let (status, clusters) = send(&app, get("/api/analytics/clusters?grid=0.05")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(clusters, json!([]));

    let (status, _) = send(&app, get("/api/analytics/campaigns/404")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_geofence_missing_or_malformed_center_is_json_400() {
    let (app, _) = create_test_app().await;

    let (status, body) = send(&app, get("/api/analytics/geofence?center_lng=106.7")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("center_lat"));

    let (status, body) = send(&app, get("/api/analytics/geofence")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("invalid input"));

    let (status, body) = send(
        &app,
        get("/api/analytics/geofence?center_lat=abc&center_lng=106.7"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("invalid input"));

    let (status, body) = send(&app, get("/api/analytics/clusters?grid=wide")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_session_and_survey_listings() {
    let (app, _) = create_test_app().await;

    let mut session_ids = vec![];
    for mac in ["AA:01", "AA:02", "AA:03"] {
        let (_, started) = send(
            &app,
            post_json("/api/captive/start-session", json!({ "mac_address": mac })),
        )
        .await;
        session_ids.push(started["sessionId"].as_i64().unwrap());
    }
    send(
        &app,
        post_json(
            "/api/captive/submit-survey",
            json!({ "session_id": session_ids[0], "answers": { "q1": "b" } }),
        ),
    )
    .await;

    let (status, all) = send(&app, get("/api/analytics/sessions")).await;
    assert_eq!(status, StatusCode::OK);
    let listed: Vec<i64> = all
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["id"].as_i64().unwrap())
        .collect();
    // Newest first; ties on the start second fall back to the higher id
    assert_eq!(listed, vec![session_ids[2], session_ids[1], session_ids[0]]);
    assert_eq!(all[2]["anonId"], "mac_AA:01");

    let (_, page) = send(&app, get("/api/analytics/sessions?limit=1&offset=1")).await;
    assert_eq!(page.as_array().unwrap().len(), 1);
    assert_eq!(page[0]["id"], session_ids[1]);

    // Out-of-range paging is clamped rather than rejected
    let (status, clamped) = send(&app, get("/api/analytics/sessions?limit=0&offset=-5")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(clamped.as_array().unwrap().len(), 1);

    let (status, _) = send(&app, get("/api/analytics/sessions?limit=many")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, surveys) = send(&app, get("/api/analytics/surveys")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(surveys.as_array().unwrap().len(), 1);
    assert_eq!(surveys[0]["anonId"], "mac_AA:01");
    assert_eq!(surveys[0]["sessionId"], session_ids[0]);
    assert_eq!(surveys[0]["answers"], json!({ "q1": "b" }));
    assert!(surveys[0]["sessionStartedAt"].is_i64());
}

#[tokio::test]
async fn test_monitoring_and_alerts() {
    let (app, _) = create_test_app().await;

    let (status, report) = send(&app, get("/api/monitoring/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["services"]["database"], "up");
    assert_eq!(report["services"]["cache"], "up");
    assert_eq!(report["alerts"], json!([]));

    let (status, body) = send(&app, get("/alerts")).await;
    assert_eq!(status, StatusCode::OK);
    let alerts = body["alerts"].as_array().unwrap();
    // Empty day: low sessions and low impressions
    assert_eq!(alerts.len(), 2);
    assert!(alerts.iter().all(|a| a["type"] == "kpi"));
}
