//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::auth::{AuthResponse, LoginRequest, SignupRequest};
use crate::web::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use chrono::{DateTime, Utc};
use gloverse_core::domain::{AdCampaign, AdImpression, Advertiser, CampaignStatus, Video};
use gloverse_core::ports::PortError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::{IntoParams, OpenApi, ToSchema};
use uuid::Uuid;

/// Upper bound for search results per request.
const MAX_SEARCH_RESULTS: i64 = 50;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::web::auth::signup_handler,
        crate::web::auth::login_handler,
        crate::web::auth::logout_handler,
        create_video_handler,
        get_video_handler,
        search_videos_handler,
        create_advertiser_handler,
        get_advertiser_handler,
        list_impressions_handler,
        create_campaign_handler,
        list_campaigns_handler,
    ),
    components(
        schemas(
            SignupRequest,
            LoginRequest,
            AuthResponse,
            CreateVideoRequest,
            VideoResponse,
            CreateAdvertiserRequest,
            AdvertiserResponse,
            ImpressionResponse,
            CreateCampaignRequest,
            CampaignResponse,
        )
    ),
    tags(
        (name = "GloVerse API", description = "Videos, advertisers and ad campaigns behind the GloVerse player.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct CreateVideoRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub media_url: String,
}

#[derive(Serialize, ToSchema)]
pub struct VideoResponse {
    id: Uuid,
    owner_id: Uuid,
    title: String,
    description: String,
    media_url: String,
    created_at: DateTime<Utc>,
}

impl From<Video> for VideoResponse {
    fn from(video: Video) -> Self {
        Self {
            id: video.id,
            owner_id: video.owner_id,
            title: video.title,
            description: video.description,
            media_url: video.media_url,
            created_at: video.created_at,
        }
    }
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchQuery {
    /// Case-insensitive title prefix. Empty matches everything.
    #[serde(default)]
    prefix: String,
    limit: Option<i64>,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateAdvertiserRequest {
    pub name: String,
    /// Opening balance in cents.
    #[serde(default)]
    pub balance_cents: i64,
}

#[derive(Serialize, ToSchema)]
pub struct AdvertiserResponse {
    id: Uuid,
    name: String,
    balance_cents: i64,
}

impl From<Advertiser> for AdvertiserResponse {
    fn from(advertiser: Advertiser) -> Self {
        Self {
            id: advertiser.id,
            name: advertiser.name,
            balance_cents: advertiser.balance_cents,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ImpressionResponse {
    id: Uuid,
    campaign_id: Uuid,
    amount_cents: i64,
    charged_at: DateTime<Utc>,
}

impl From<AdImpression> for ImpressionResponse {
    fn from(impression: AdImpression) -> Self {
        Self {
            id: impression.id,
            campaign_id: impression.campaign_id,
            amount_cents: impression.amount_cents,
            charged_at: impression.charged_at,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct CreateCampaignRequest {
    pub advertiser_id: Uuid,
    pub media_url: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Serialize, ToSchema)]
pub struct CampaignResponse {
    id: Uuid,
    advertiser_id: Uuid,
    media_url: String,
    active: bool,
}

impl From<AdCampaign> for CampaignResponse {
    fn from(campaign: AdCampaign) -> Self {
        Self {
            active: campaign.is_active(),
            id: campaign.id,
            advertiser_id: campaign.advertiser_id,
            media_url: campaign.media_url,
        }
    }
}

/// Maps a port failure onto a response, logging anything unexpected.
fn port_failure(context: &str, e: PortError) -> (StatusCode, String) {
    match e {
        PortError::NotFound(what) => (StatusCode::NOT_FOUND, what),
        PortError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
        other => {
            error!("{}: {:?}", context, other);
            (StatusCode::INTERNAL_SERVER_ERROR, context.to_string())
        }
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<(), (StatusCode, String)> {
    if value.trim().is_empty() {
        Err((StatusCode::BAD_REQUEST, format!("{} must not be empty", field)))
    } else {
        Ok(())
    }
}

//=========================================================================================
// Video Handlers
//=========================================================================================

/// Publish a video for the signed-in user.
#[utoipa::path(
    post,
    path = "/videos",
    request_body = CreateVideoRequest,
    responses(
        (status = 201, description = "Video created", body = VideoResponse),
        (status = 400, description = "Missing title or media URL"),
        (status = 401, description = "Not signed in"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn create_video_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<CreateVideoRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    require_non_empty("title", &req.title)?;
    require_non_empty("media_url", &req.media_url)?;

    let video = app_state
        .db
        .create_video(user_id, req.title.trim(), &req.description, &req.media_url)
        .await
        .map_err(|e| port_failure("Failed to create video", e))?;
    info!("User {} published video {}", user_id, video.id);
    Ok((StatusCode::CREATED, Json(VideoResponse::from(video))))
}

/// Fetch one video.
#[utoipa::path(
    get,
    path = "/videos/{video_id}",
    params(("video_id" = Uuid, Path, description = "The video's id.")),
    responses(
        (status = 200, description = "The video", body = VideoResponse),
        (status = 404, description = "No such video")
    )
)]
pub async fn get_video_handler(
    State(app_state): State<Arc<AppState>>,
    Path(video_id): Path<Uuid>,
) -> Result<Json<VideoResponse>, (StatusCode, String)> {
    let video = app_state
        .db
        .get_video_by_id(video_id)
        .await
        .map_err(|e| port_failure("Failed to load video", e))?;
    Ok(Json(video.into()))
}

/// Search videos by title prefix, newest first.
#[utoipa::path(
    get,
    path = "/videos",
    params(SearchQuery),
    responses(
        (status = 200, description = "Matching videos", body = [VideoResponse])
    )
)]
pub async fn search_videos_handler(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<VideoResponse>>, (StatusCode, String)> {
    let limit = query
        .limit
        .unwrap_or(MAX_SEARCH_RESULTS)
        .clamp(1, MAX_SEARCH_RESULTS);
    let videos = app_state
        .db
        .search_videos_by_prefix(query.prefix.trim(), limit)
        .await
        .map_err(|e| port_failure("Failed to search videos", e))?;
    Ok(Json(videos.into_iter().map(VideoResponse::from).collect()))
}

//=========================================================================================
// Advertiser Handlers
//=========================================================================================

/// Open a ledger account for an advertiser.
#[utoipa::path(
    post,
    path = "/advertisers",
    request_body = CreateAdvertiserRequest,
    responses(
        (status = 201, description = "Advertiser created", body = AdvertiserResponse),
        (status = 400, description = "Invalid name or balance")
    )
)]
pub async fn create_advertiser_handler(
    State(app_state): State<Arc<AppState>>,
    Json(req): Json<CreateAdvertiserRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    require_non_empty("name", &req.name)?;
    if req.balance_cents < 0 {
        return Err((
            StatusCode::BAD_REQUEST,
            "balance_cents must not be negative".to_string(),
        ));
    }
    let advertiser = app_state
        .db
        .create_advertiser(req.name.trim(), req.balance_cents)
        .await
        .map_err(|e| port_failure("Failed to create advertiser", e))?;
    Ok((StatusCode::CREATED, Json(AdvertiserResponse::from(advertiser))))
}

/// Fetch an advertiser and its current balance.
#[utoipa::path(
    get,
    path = "/advertisers/{advertiser_id}",
    params(("advertiser_id" = Uuid, Path, description = "The advertiser's id.")),
    responses(
        (status = 200, description = "The advertiser", body = AdvertiserResponse),
        (status = 404, description = "No such advertiser")
    )
)]
pub async fn get_advertiser_handler(
    State(app_state): State<Arc<AppState>>,
    Path(advertiser_id): Path<Uuid>,
) -> Result<Json<AdvertiserResponse>, (StatusCode, String)> {
    let advertiser = app_state
        .db
        .get_advertiser(advertiser_id)
        .await
        .map_err(|e| port_failure("Failed to load advertiser", e))?;
    Ok(Json(advertiser.into()))
}

/// List the billed impressions of an advertiser, oldest first.
#[utoipa::path(
    get,
    path = "/advertisers/{advertiser_id}/impressions",
    params(("advertiser_id" = Uuid, Path, description = "The advertiser's id.")),
    responses(
        (status = 200, description = "Billed impressions", body = [ImpressionResponse])
    )
)]
pub async fn list_impressions_handler(
    State(app_state): State<Arc<AppState>>,
    Path(advertiser_id): Path<Uuid>,
) -> Result<Json<Vec<ImpressionResponse>>, (StatusCode, String)> {
    let impressions = app_state
        .db
        .list_impressions(advertiser_id)
        .await
        .map_err(|e| port_failure("Failed to list impressions", e))?;
    Ok(Json(
        impressions.into_iter().map(ImpressionResponse::from).collect(),
    ))
}

//=========================================================================================
// Campaign Handlers
//=========================================================================================

/// Register a pre-roll campaign.
#[utoipa::path(
    post,
    path = "/campaigns",
    request_body = CreateCampaignRequest,
    responses(
        (status = 201, description = "Campaign created", body = CampaignResponse),
        (status = 400, description = "Missing media URL"),
        (status = 404, description = "No such advertiser")
    )
)]
pub async fn create_campaign_handler(
    State(app_state): State<Arc<AppState>>,
    Json(req): Json<CreateCampaignRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    require_non_empty("media_url", &req.media_url)?;

    // Surfaces a 404 instead of a foreign key violation.
    app_state
        .db
        .get_advertiser(req.advertiser_id)
        .await
        .map_err(|e| port_failure("Failed to load advertiser", e))?;

    let status = if req.active {
        CampaignStatus::Active
    } else {
        CampaignStatus::Inactive
    };
    let campaign = app_state
        .db
        .create_campaign(req.advertiser_id, &req.media_url, status)
        .await
        .map_err(|e| port_failure("Failed to create campaign", e))?;
    Ok((StatusCode::CREATED, Json(CampaignResponse::from(campaign))))
}

/// List the campaigns currently eligible for pre-roll.
#[utoipa::path(
    get,
    path = "/campaigns",
    responses(
        (status = 200, description = "Active campaigns", body = [CampaignResponse])
    )
)]
pub async fn list_campaigns_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<Vec<CampaignResponse>>, (StatusCode, String)> {
    let campaigns = app_state
        .player
        .inventory
        .active_campaigns()
        .await
        .map_err(|e| port_failure("Failed to list campaigns", e))?;
    Ok(Json(
        campaigns.into_iter().map(CampaignResponse::from).collect(),
    ))
}
