//! Geo analytics and KPI reporting over an in-memory SQLite store

use portal::analytics::{GeoAnalytics, Reporting};
use portal::clock;
use portal::config::{AlertThresholds, MonetizationConfig};
use portal::error::PortalError;
use portal::health::AlertKind;
use portal::models::{NewCampaign, NewLocation, NewSession};
use portal::storage::{SqliteStorage, Storage};
use std::sync::Arc;

/// Helper to create test storage
async fn create_test_storage() -> Arc<dyn Storage> {
    let storage = SqliteStorage::new("sqlite::memory:", 5).await.unwrap();
    storage.init().await.unwrap();
    Arc::new(storage)
}

async fn add_site(storage: &Arc<dyn Storage>, name: &str, lat: Option<f64>, lng: Option<f64>) -> i64 {
    storage
        .create_location(
            &NewLocation {
                name: name.to_string(),
                latitude: lat,
                longitude: lng,
                ..Default::default()
            },
            0,
        )
        .await
        .unwrap()
        .id
}

/// Open `count` sessions at a site, each for a new user
async fn add_sessions(storage: &Arc<dyn Storage>, location_id: i64, count: usize, started_at: i64) {
    for _ in 0..count {
        let anon = format!("visitor_{:016x}", rand::random::<u64>());
        let user_id = storage.create_user(&anon, started_at).await.unwrap();
        storage
            .create_session(
                &NewSession {
                    user_id,
                    location_id: Some(location_id),
                    ..Default::default()
                },
                started_at,
            )
            .await
            .unwrap();
    }
}

fn reporting(storage: &Arc<dyn Storage>) -> Reporting {
    Reporting::new(
        Arc::clone(storage),
        MonetizationConfig::default(),
        AlertThresholds::default(),
    )
}

#[tokio::test]
async fn test_heatmap_counts_today_only() {
    let storage = create_test_storage().await;
    let now = clock::now();

    let busy = add_site(&storage, "busy", Some(10.77), Some(106.70)).await;
    let quiet = add_site(&storage, "quiet", Some(10.80), Some(106.72)).await;
    let unlocated = add_site(&storage, "unlocated", None, None).await;

    add_sessions(&storage, busy, 3, now).await;
    add_sessions(&storage, quiet, 1, now).await;
    add_sessions(&storage, quiet, 5, clock::start_of_day(now) - 3600).await;
    add_sessions(&storage, unlocated, 2, now).await;

    let geo = GeoAnalytics::new(Arc::clone(&storage), 0.02);
    let heatmap = geo.heatmap().await.unwrap();

    let rows: Vec<(i64, i64)> = heatmap.iter().map(|s| (s.id, s.sessions_today)).collect();
    assert_eq!(rows, vec![(busy, 3), (quiet, 1)]);
}

#[tokio::test]
async fn test_geofence_zero_radius_on_site() {
    let storage = create_test_storage().await;
    let site = add_site(&storage, "exact", Some(10.7769), Some(106.7009)).await;
    add_site(&storage, "near", Some(10.7800), Some(106.7009)).await;

    let geo = GeoAnalytics::new(Arc::clone(&storage), 0.02);

    let exact = geo.geofence(10.7769, 106.7009, 0.0).await.unwrap();
    assert_eq!(exact.locations.len(), 1);
    assert_eq!(exact.locations[0].location.id, site);

    let wider = geo.geofence(10.7769, 106.7009, 1.0).await.unwrap();
    assert_eq!(wider.locations.len(), 2);
    assert!(wider.locations[0].distance_km <= wider.locations[1].distance_km);
}

#[tokio::test]
async fn test_geofence_rejects_bad_input() {
    let storage = create_test_storage().await;
    let geo = GeoAnalytics::new(storage, 0.02);

    assert!(matches!(
        geo.geofence(91.0, 0.0, 1.0).await,
        Err(PortalError::InvalidInput(_))
    ));
    assert!(matches!(
        geo.geofence(0.0, 0.0, -1.0).await,
        Err(PortalError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn test_clusters_sum_sessions() {
    let storage = create_test_storage().await;
    let now = clock::now();

    let a = add_site(&storage, "a", Some(10.755), Some(106.700)).await;
    let b = add_site(&storage, "b", Some(10.765), Some(106.705)).await;
    let far = add_site(&storage, "far", Some(10.90), Some(106.80)).await;
    add_sessions(&storage, a, 2, now).await;
    add_sessions(&storage, b, 3, now).await;
    add_sessions(&storage, far, 1, now).await;

    let geo = GeoAnalytics::new(Arc::clone(&storage), 0.02);
    let clusters = geo.clusters(None).await.unwrap();

    assert_eq!(clusters.len(), 2);
    let merged = clusters.iter().find(|c| c.locations.len() == 2).unwrap();
    assert_eq!(merged.sessions_today, 5);

    // A coarse grid swallows everything
    let coarse = geo.clusters(Some(10.0)).await.unwrap();
    assert_eq!(coarse.len(), 1);
    assert_eq!(coarse[0].sessions_today, 6);

    assert!(matches!(
        geo.clusters(Some(0.0)).await,
        Err(PortalError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn test_kpi_and_monetization() {
    let storage = create_test_storage().await;
    let now = clock::now();

    let site = add_site(&storage, "hall", None, None).await;
    add_sessions(&storage, site, 2, now).await;
    add_sessions(&storage, site, 1, now - 3 * 86_400).await;

    let campaign = storage
        .create_campaign(&NewCampaign::active("promo"), now)
        .await
        .unwrap();
    for _ in 0..3 {
        storage.record_impression(campaign.id, None, now).await.unwrap();
    }
    storage
        .record_impression(campaign.id, None, now - 3 * 86_400)
        .await
        .unwrap();
    storage.record_click(campaign.id, None, now).await.unwrap();

    let reporting = reporting(&storage);

    let kpi = reporting.kpi().await.unwrap();
    assert_eq!(
        (kpi.totals.sessions, kpi.totals.impressions, kpi.totals.clicks),
        (3, 4, 1)
    );
    assert_eq!(
        (kpi.today.sessions, kpi.today.impressions, kpi.today.clicks),
        (2, 3, 1)
    );

    let stats = reporting.campaign_stats(campaign.id).await.unwrap();
    assert_eq!((stats.impressions, stats.clicks), (4, 1));
    assert_eq!(stats.ctr, 25.0);

    let money = reporting.monetization().await.unwrap();
    // 4/1000 * 2.0 + 1 * 0.05 = 0.058
    assert_eq!(money.estimated_revenue, 0.06);
    assert_eq!(money.cpm, 2.0);
}

#[tokio::test]
async fn test_campaign_stats_unknown_campaign() {
    let storage = create_test_storage().await;
    let err = reporting(&storage).campaign_stats(77).await.unwrap_err();
    assert!(matches!(err, PortalError::NotFound("campaign")));
}

#[tokio::test]
async fn test_kpi_alerts_on_empty_day() {
    let storage = create_test_storage().await;
    let alerts = reporting(&storage).kpi_alerts().await.unwrap();

    assert_eq!(alerts.len(), 2);
    assert!(alerts.iter().all(|a| a.kind == AlertKind::Kpi));
    assert_eq!(alerts[0].message, "Low sessions today (0)");
}
