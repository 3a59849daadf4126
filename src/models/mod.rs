pub mod campaign;
pub mod location;
pub mod visit;

pub use campaign::{AdPayload, Campaign, CampaignRow, NewCampaign, Targeting};
pub use location::{Location, LocationStats, NewLocation};
pub use visit::{
    EngagementCounts, NewSession, SegmentCount, Session, SessionListing, Survey, SurveyListing,
};
