use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::FromRow;

pub const STATUS_ACTIVE: &str = "active";
pub const STATUS_DRAFT: &str = "draft";

/// Optional predicates attached to a campaign.
///
/// An absent key places no restriction on the visit. A document with no keys
/// at all (or no document) matches every visitor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Targeting {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_ids: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_types: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_time_only: Option<bool>,
}

impl Targeting {
    pub fn is_empty(&self) -> bool {
        self.location_ids.is_none() && self.device_types.is_none() && self.first_time_only.is_none()
    }
}

/// Raw campaign row; the JSON documents are decoded separately so one
/// malformed row cannot poison the whole listing.
#[derive(Debug, Clone, FromRow)]
pub struct CampaignRow {
    pub id: i64,
    pub brand_id: Option<i64>,
    pub name: String,
    pub status: String,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub targeting: Option<Json<Value>>,
    pub ab_test_variants: Option<Json<Value>>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: i64,
    pub brand_id: Option<i64>,
    pub name: String,
    pub status: String,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub targeting: Targeting,
    pub ab_test_variants: Vec<Value>,
    pub created_at: i64,
}

impl TryFrom<CampaignRow> for Campaign {
    type Error = serde_json::Error;

    fn try_from(row: CampaignRow) -> Result<Self, Self::Error> {
        let targeting = match row.targeting {
            Some(Json(Value::Null)) | None => Targeting::default(),
            Some(Json(doc)) => serde_json::from_value(doc)?,
        };

        let ab_test_variants = match row.ab_test_variants {
            Some(Json(Value::Array(variants))) => variants,
            Some(Json(Value::Null)) | None => Vec::new(),
            Some(Json(other)) => serde_json::from_value(other)?,
        };

        Ok(Self {
            id: row.id,
            brand_id: row.brand_id,
            name: row.name,
            status: row.status,
            start_time: row.start_time,
            end_time: row.end_time,
            targeting,
            ab_test_variants,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCampaign {
    pub brand_id: Option<i64>,
    pub name: String,
    #[serde(default = "NewCampaign::default_status")]
    pub status: String,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    #[serde(default)]
    pub targeting: Targeting,
    #[serde(default)]
    pub ab_test_variants: Vec<Value>,
}

impl NewCampaign {
    fn default_status() -> String {
        STATUS_DRAFT.to_string()
    }

    /// An active, unbounded campaign with no targeting and no variants.
    pub fn active(name: impl Into<String>) -> Self {
        Self {
            brand_id: None,
            name: name.into(),
            status: STATUS_ACTIVE.to_string(),
            start_time: None,
            end_time: None,
            targeting: Targeting::default(),
            ab_test_variants: Vec::new(),
        }
    }
}

/// One ad served to a visitor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdPayload {
    pub id: i64,
    pub name: String,
    pub content: Value,
}
