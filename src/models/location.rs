use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub id: i64,
    pub brand_id: Option<i64>,
    pub name: String,
    pub ap_identifier: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLocation {
    pub brand_id: Option<i64>,
    pub name: String,
    pub ap_identifier: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// A located site together with the number of sessions started there today.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LocationStats {
    pub id: i64,
    pub name: String,
    #[serde(rename = "lat")]
    pub latitude: f64,
    #[serde(rename = "lng")]
    pub longitude: f64,
    pub sessions_today: i64,
}
