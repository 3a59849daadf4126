//! Campaign targeting.
//!
//! Input campaigns are already filtered to the active window. Each targeting
//! key is an independent predicate and all present predicates must hold. When
//! the visit does not carry the value a predicate needs (no location, no device
//! type) the predicate does not exclude the campaign.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::models::{AdPayload, Campaign, Targeting};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitContext {
    pub location_id: Option<i64>,
    pub device_type: Option<String>,
    #[serde(default)]
    pub is_first_time: bool,
}

impl Targeting {
    pub fn admits(&self, ctx: &VisitContext) -> bool {
        if let (Some(location_ids), Some(location_id)) = (&self.location_ids, ctx.location_id) {
            if !location_ids.contains(&location_id) {
                return false;
            }
        }

        if let (Some(device_types), Some(device_type)) = (&self.device_types, &ctx.device_type) {
            if !device_types.iter().any(|d| d == device_type) {
                return false;
            }
        }

        if let Some(first_time_only) = self.first_time_only {
            if first_time_only != ctx.is_first_time {
                return false;
            }
        }

        true
    }
}

/// Ads for every campaign admitted by `ctx`, in input order.
pub fn match_campaigns(campaigns: &[Campaign], ctx: &VisitContext) -> Vec<AdPayload> {
    campaigns
        .iter()
        .filter(|campaign| campaign.targeting.admits(ctx))
        .map(|campaign| AdPayload {
            id: campaign.id,
            name: campaign.name.clone(),
            content: served_content(campaign),
        })
        .collect()
}

/// Content of the served variant.
///
/// Always the first variant: there is no randomized or weighted split yet.
/// Its `content` field is used when present, otherwise the variant document
/// itself. Campaigns without variants serve `{"text": <name>}`.
pub fn served_content(campaign: &Campaign) -> Value {
    match campaign.ab_test_variants.first() {
        Some(variant) => match variant.get("content") {
            Some(content) if !content.is_null() => content.clone(),
            _ => variant.clone(),
        },
        None => json!({ "text": campaign.name }),
    }
}
