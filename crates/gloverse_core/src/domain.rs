//! crates/gloverse_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use uuid::Uuid;

// Represents a user - used throughout app
#[derive(Debug, Clone)]
pub struct User {
    pub user_id: Uuid,
    pub email: Option<String>,
}

// Only used internally for login/signup - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub email: String,
    pub hashed_password: String,
}

/// An uploaded video. `media_url` is directly playable by the client.
#[derive(Debug, Clone)]
pub struct Video {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub description: String,
    pub media_url: String,
    pub created_at: DateTime<Utc>,
}

/// A ledger account that pays for ad impressions.
/// Balances are kept in minor currency units (cents).
#[derive(Debug, Clone)]
pub struct Advertiser {
    pub id: Uuid,
    pub name: String,
    pub balance_cents: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CampaignStatus {
    Active,
    Inactive,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Active => "active",
            CampaignStatus::Inactive => "inactive",
        }
    }

    /// Parses the stored representation. Unknown values are treated as inactive
    /// so that a bad row can never be shown as an ad.
    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("active") {
            CampaignStatus::Active
        } else {
            CampaignStatus::Inactive
        }
    }
}

/// An advertiser-supplied media asset eligible for pre-roll display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdCampaign {
    pub id: Uuid,
    pub media_url: String,
    pub advertiser_id: Uuid,
    pub status: CampaignStatus,
}

impl AdCampaign {
    pub fn is_active(&self) -> bool {
        self.status == CampaignStatus::Active
    }
}

/// A single billed playback of a campaign.
#[derive(Debug, Clone)]
pub struct AdImpression {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub advertiser_id: Uuid,
    pub amount_cents: i64,
    pub charged_at: DateTime<Utc>,
}
