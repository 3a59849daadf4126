//! Geofencing and grid clustering over located sites.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::clock;
use crate::error::{PortalError, PortalResult};
use crate::models::LocationStats;
use crate::storage::Storage;

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Roughly 2 km of latitude
pub const DEFAULT_GRID_DEG: f64 = 0.02;

/// Great-circle distance between two points in decimal degrees.
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_KM * a.sqrt().atan2((1.0 - a).sqrt())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationDistance {
    #[serde(flatten)]
    pub location: LocationStats,
    pub distance_km: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeofenceReport {
    pub center_lat: f64,
    pub center_lng: f64,
    pub radius_km: f64,
    pub locations: Vec<LocationDistance>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    pub cluster_id: String,
    pub locations: Vec<LocationStats>,
    pub sessions_today: i64,
}

/// Sites within `radius_km` of the center, nearest first. Equal distances keep
/// input order.
pub fn within_radius(
    locations: Vec<LocationStats>,
    center_lat: f64,
    center_lng: f64,
    radius_km: f64,
) -> Vec<LocationDistance> {
    let mut within: Vec<LocationDistance> = locations
        .into_iter()
        .map(|location| {
            let distance_km =
                haversine_km(center_lat, center_lng, location.latitude, location.longitude);
            LocationDistance {
                location,
                distance_km,
            }
        })
        .filter(|l| l.distance_km <= radius_km)
        .collect();

    within.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
    within
}

/// Index of the nearest grid line; halves round up.
fn grid_cell(value: f64, grid_size_deg: f64) -> i64 {
    (value / grid_size_deg + 0.5).floor() as i64
}

/// Group sites whose coordinates round to the same grid point.
pub fn cluster_by_grid(locations: Vec<LocationStats>, grid_size_deg: f64) -> Vec<Cluster> {
    let mut cells: BTreeMap<(i64, i64), Cluster> = BTreeMap::new();

    for location in locations {
        let cell = (
            grid_cell(location.latitude, grid_size_deg),
            grid_cell(location.longitude, grid_size_deg),
        );

        let cluster = cells.entry(cell).or_insert_with(|| Cluster {
            cluster_id: format!(
                "{}_{}",
                cell.0 as f64 * grid_size_deg,
                cell.1 as f64 * grid_size_deg
            ),
            locations: Vec::new(),
            sessions_today: 0,
        });

        cluster.sessions_today += location.sessions_today;
        cluster.locations.push(location);
    }

    cells.into_values().collect()
}

fn validate_coordinates(lat: f64, lng: f64) -> PortalResult<()> {
    if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
        return Err(PortalError::InvalidInput(format!("latitude {lat} out of range")));
    }
    if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
        return Err(PortalError::InvalidInput(format!("longitude {lng} out of range")));
    }
    Ok(())
}

pub struct GeoAnalytics {
    storage: Arc<dyn Storage>,
    grid_size_deg: f64,
}

impl GeoAnalytics {
    pub fn new(storage: Arc<dyn Storage>, grid_size_deg: f64) -> Self {
        Self {
            storage,
            grid_size_deg,
        }
    }

    async fn located_sites_today(&self) -> PortalResult<Vec<LocationStats>> {
        let since = clock::start_of_day(clock::now());
        Ok(self.storage.location_session_counts(since).await?)
    }

    pub async fn geofence(
        &self,
        center_lat: f64,
        center_lng: f64,
        radius_km: f64,
    ) -> PortalResult<GeofenceReport> {
        validate_coordinates(center_lat, center_lng)?;
        if !radius_km.is_finite() || radius_km < 0.0 {
            return Err(PortalError::InvalidInput(format!(
                "radius {radius_km} km must be a non-negative number"
            )));
        }

        let sites = self.located_sites_today().await?;

        Ok(GeofenceReport {
            center_lat,
            center_lng,
            radius_km,
            locations: within_radius(sites, center_lat, center_lng, radius_km),
        })
    }

    /// Clusters on the configured grid unless `grid_size_deg` overrides it.
    pub async fn clusters(&self, grid_size_deg: Option<f64>) -> PortalResult<Vec<Cluster>> {
        let grid = grid_size_deg.unwrap_or(self.grid_size_deg);
        if !grid.is_finite() || grid <= 0.0 {
            return Err(PortalError::InvalidInput(format!(
                "grid size {grid} must be a positive number of degrees"
            )));
        }

        let sites = self.located_sites_today().await?;
        Ok(cluster_by_grid(sites, grid))
    }

    /// Located sites by sessions today, busiest first.
    pub async fn heatmap(&self) -> PortalResult<Vec<LocationStats>> {
        let mut sites = self.located_sites_today().await?;
        sites.sort_by(|a, b| b.sessions_today.cmp(&a.sessions_today));
        Ok(sites)
    }
}
