//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, the concrete implementation of the
//! `DatabaseService`, `AdInventoryService`, `BillingLedgerService` and
//! `ContentResolver` ports from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gloverse_core::domain::{
    AdCampaign, AdImpression, Advertiser, CampaignStatus, User, UserCredentials, Video,
};
use gloverse_core::ports::{
    AdInventoryService, BillingLedgerService, ContentResolver, DatabaseService, PortError,
    PortResult,
};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the persistence ports.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn not_found_or_unexpected(what: String) -> impl FnOnce(sqlx::Error) -> PortError {
    move |e| match e {
        sqlx::Error::RowNotFound => PortError::NotFound(what),
        _ => PortError::Unexpected(e.to_string()),
    }
}

/// Escapes `LIKE` wildcards so user input only ever matches literally.
fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// The balance after one impression. Balances may go negative; only an
/// arithmetic overflow is refused.
fn debited_balance(balance: i64, amount_cents: i64) -> PortResult<i64> {
    balance.checked_sub(amount_cents).ok_or_else(|| {
        PortError::Unexpected(format!(
            "Debiting {} cents from a balance of {} overflows",
            amount_cents, balance
        ))
    })
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    user_id: Uuid,
    email: Option<String>,
}
impl UserRecord {
    fn to_domain(self) -> User {
        User {
            user_id: self.user_id,
            email: self.email,
        }
    }
}

#[derive(FromRow)]
struct CredentialsRecord {
    user_id: Uuid,
    email: String,
    hashed_password: String,
}
impl CredentialsRecord {
    fn to_domain(self) -> UserCredentials {
        UserCredentials {
            user_id: self.user_id,
            email: self.email,
            hashed_password: self.hashed_password,
        }
    }
}

#[derive(FromRow)]
struct VideoRecord {
    id: Uuid,
    owner_id: Uuid,
    title: String,
    description: String,
    media_url: String,
    created_at: DateTime<Utc>,
}
impl VideoRecord {
    fn to_domain(self) -> Video {
        Video {
            id: self.id,
            owner_id: self.owner_id,
            title: self.title,
            description: self.description,
            media_url: self.media_url,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct AdvertiserRecord {
    id: Uuid,
    name: String,
    balance_cents: i64,
}
impl AdvertiserRecord {
    fn to_domain(self) -> Advertiser {
        Advertiser {
            id: self.id,
            name: self.name,
            balance_cents: self.balance_cents,
        }
    }
}

#[derive(FromRow)]
struct CampaignRecord {
    id: Uuid,
    advertiser_id: Uuid,
    media_url: String,
    status: String,
}
impl CampaignRecord {
    fn to_domain(self) -> AdCampaign {
        AdCampaign {
            id: self.id,
            media_url: self.media_url,
            advertiser_id: self.advertiser_id,
            status: CampaignStatus::parse(&self.status),
        }
    }
}

#[derive(FromRow)]
struct ImpressionRecord {
    id: Uuid,
    campaign_id: Uuid,
    advertiser_id: Uuid,
    amount_cents: i64,
    charged_at: DateTime<Utc>,
}
impl ImpressionRecord {
    fn to_domain(self) -> AdImpression {
        AdImpression {
            id: self.id,
            campaign_id: self.campaign_id,
            advertiser_id: self.advertiser_id,
            amount_cents: self.amount_cents,
            charged_at: self.charged_at,
        }
    }
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn create_user_with_email(
        &self,
        email: &str,
        hashed_password: &str,
    ) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "INSERT INTO users (user_id, email, hashed_password) VALUES ($1, $2, $3) RETURNING user_id, email",
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(hashed_password)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "SELECT user_id, email, hashed_password FROM users WHERE email = $1 AND hashed_password IS NOT NULL",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or_unexpected(format!("User with email {} not found", email)))?;
        Ok(record.to_domain())
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(session_id)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        let user_id: Option<Uuid> = sqlx::query_scalar(
            "SELECT user_id FROM auth_sessions WHERE id = $1 AND expires_at > now()",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        user_id.ok_or(PortError::Unauthorized)
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn create_video(
        &self,
        owner_id: Uuid,
        title: &str,
        description: &str,
        media_url: &str,
    ) -> PortResult<Video> {
        let record = sqlx::query_as::<_, VideoRecord>(
            "INSERT INTO videos (id, owner_id, title, description, media_url) VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, owner_id, title, description, media_url, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(owner_id)
        .bind(title)
        .bind(description)
        .bind(media_url)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn get_video_by_id(&self, video_id: Uuid) -> PortResult<Video> {
        let record = sqlx::query_as::<_, VideoRecord>(
            "SELECT id, owner_id, title, description, media_url, created_at FROM videos WHERE id = $1",
        )
        .bind(video_id)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or_unexpected(format!("Video {} not found", video_id)))?;
        Ok(record.to_domain())
    }

    async fn search_videos_by_prefix(&self, prefix: &str, limit: i64) -> PortResult<Vec<Video>> {
        let pattern = format!("{}%", escape_like(&prefix.to_lowercase()));
        let records = sqlx::query_as::<_, VideoRecord>(
            "SELECT id, owner_id, title, description, media_url, created_at FROM videos \
             WHERE lower(title) LIKE $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn create_advertiser(&self, name: &str, balance_cents: i64) -> PortResult<Advertiser> {
        let record = sqlx::query_as::<_, AdvertiserRecord>(
            "INSERT INTO advertisers (id, name, balance_cents) VALUES ($1, $2, $3) RETURNING id, name, balance_cents",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(balance_cents)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn get_advertiser(&self, advertiser_id: Uuid) -> PortResult<Advertiser> {
        let record = sqlx::query_as::<_, AdvertiserRecord>(
            "SELECT id, name, balance_cents FROM advertisers WHERE id = $1",
        )
        .bind(advertiser_id)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or_unexpected(format!("Advertiser {} not found", advertiser_id)))?;
        Ok(record.to_domain())
    }

    async fn create_campaign(
        &self,
        advertiser_id: Uuid,
        media_url: &str,
        status: CampaignStatus,
    ) -> PortResult<AdCampaign> {
        let record = sqlx::query_as::<_, CampaignRecord>(
            "INSERT INTO ad_campaigns (id, advertiser_id, media_url, status) VALUES ($1, $2, $3, $4) \
             RETURNING id, advertiser_id, media_url, status",
        )
        .bind(Uuid::new_v4())
        .bind(advertiser_id)
        .bind(media_url)
        .bind(status.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn list_impressions(&self, advertiser_id: Uuid) -> PortResult<Vec<AdImpression>> {
        let records = sqlx::query_as::<_, ImpressionRecord>(
            "SELECT id, campaign_id, advertiser_id, amount_cents, charged_at FROM ad_impressions \
             WHERE advertiser_id = $1 ORDER BY charged_at ASC",
        )
        .bind(advertiser_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }
}

//=========================================================================================
// Player Collaborator Implementations
//=========================================================================================

#[async_trait]
impl AdInventoryService for DbAdapter {
    async fn active_campaigns(&self) -> PortResult<Vec<AdCampaign>> {
        let records = sqlx::query_as::<_, CampaignRecord>(
            "SELECT id, advertiser_id, media_url, status FROM ad_campaigns WHERE status = $1",
        )
        .bind(CampaignStatus::Active.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }
}

#[async_trait]
impl BillingLedgerService for DbAdapter {
    async fn charge_impression(
        &self,
        advertiser_id: Uuid,
        campaign_id: Uuid,
        amount_cents: i64,
    ) -> PortResult<i64> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        // The row lock serialises concurrent debits against the same advertiser.
        let balance: Option<i64> = sqlx::query_scalar(
            "SELECT balance_cents FROM advertisers WHERE id = $1 FOR UPDATE",
        )
        .bind(advertiser_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(unexpected)?;
        let balance = balance
            .ok_or_else(|| PortError::NotFound(format!("Advertiser {} not found", advertiser_id)))?;

        let new_balance = debited_balance(balance, amount_cents)?;

        sqlx::query("UPDATE advertisers SET balance_cents = $1 WHERE id = $2")
            .bind(new_balance)
            .bind(advertiser_id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;

        sqlx::query(
            "INSERT INTO ad_impressions (id, campaign_id, advertiser_id, amount_cents) VALUES ($1, $2, $3, $4)",
        )
        .bind(Uuid::new_v4())
        .bind(campaign_id)
        .bind(advertiser_id)
        .bind(amount_cents)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;

        tx.commit().await.map_err(unexpected)?;
        Ok(new_balance)
    }
}

#[async_trait]
impl ContentResolver for DbAdapter {
    async fn resolve_media_url(&self, content_id: Uuid) -> PortResult<String> {
        let media_url: Option<String> =
            sqlx::query_scalar("SELECT media_url FROM videos WHERE id = $1")
                .bind(content_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(unexpected)?;
        media_url.ok_or_else(|| PortError::NotFound(format!("Video {} not found", content_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::{debited_balance, escape_like};
    use gloverse_core::ports::PortError;

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("100%_fun"), "100\\%\\_fun");
        assert_eq!(escape_like("back\\slash"), "back\\\\slash");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[test]
    fn underfunded_advertiser_is_still_debited() {
        assert_eq!(debited_balance(5, 10).unwrap(), -5);
        assert_eq!(debited_balance(0, 10).unwrap(), -10);
        assert_eq!(debited_balance(1_000, 10).unwrap(), 990);
    }

    #[test]
    fn overflowing_debit_is_refused() {
        assert!(matches!(
            debited_balance(i64::MIN, 10),
            Err(PortError::Unexpected(_))
        ));
    }
}
