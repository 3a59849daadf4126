//! Read-only analytics over locations, sessions and engagement.
//!
//! Nothing here writes; every query can run concurrently with the visit path.

pub mod geo;
pub mod reporting;

pub use geo::{Cluster, GeoAnalytics, GeofenceReport, LocationDistance};
pub use reporting::{CampaignStats, KpiSummary, MonetizationSummary, Reporting, Segments};
