//! crates/gloverse_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases.

use crate::domain::{
    AdCampaign, AdImpression, Advertiser, CampaignStatus, User, UserCredentials, Video,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Player Collaborator Ports
//=========================================================================================

/// Source of pre-roll ad campaigns.
#[async_trait]
pub trait AdInventoryService: Send + Sync {
    /// Returns the campaigns currently eligible for display (`status == Active`).
    async fn active_campaigns(&self) -> PortResult<Vec<AdCampaign>>;
}

/// Balance-bearing accounts keyed by advertiser.
#[async_trait]
pub trait BillingLedgerService: Send + Sync {
    /// Debits `amount_cents` from the advertiser and records the impression.
    ///
    /// The read and the write happen in one transaction so concurrent debits
    /// from other sessions cannot lose updates. Returns the new balance.
    async fn charge_impression(
        &self,
        advertiser_id: Uuid,
        campaign_id: Uuid,
        amount_cents: i64,
    ) -> PortResult<i64>;
}

/// Resolves a content id into a directly playable media URL.
#[async_trait]
pub trait ContentResolver: Send + Sync {
    async fn resolve_media_url(&self, content_id: Uuid) -> PortResult<String>;
}

//=========================================================================================
// Persistence Port for the REST Surface
//=========================================================================================

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- Auth Methods ---
    async fn create_user_with_email(
        &self,
        email: &str,
        hashed_password: &str,
    ) -> PortResult<User>;

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;

    // --- Videos ---
    async fn create_video(
        &self,
        owner_id: Uuid,
        title: &str,
        description: &str,
        media_url: &str,
    ) -> PortResult<Video>;

    async fn get_video_by_id(&self, video_id: Uuid) -> PortResult<Video>;

    /// Case-insensitive title prefix search, newest first.
    async fn search_videos_by_prefix(&self, prefix: &str, limit: i64) -> PortResult<Vec<Video>>;

    // --- Advertisers and Campaigns ---
    async fn create_advertiser(&self, name: &str, balance_cents: i64) -> PortResult<Advertiser>;

    async fn get_advertiser(&self, advertiser_id: Uuid) -> PortResult<Advertiser>;

    async fn create_campaign(
        &self,
        advertiser_id: Uuid,
        media_url: &str,
        status: CampaignStatus,
    ) -> PortResult<AdCampaign>;

    async fn list_impressions(&self, advertiser_id: Uuid) -> PortResult<Vec<AdImpression>>;
}
