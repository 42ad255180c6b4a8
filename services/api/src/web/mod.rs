pub mod auth;
pub mod middleware;
pub mod player_task;
pub mod protocol;
pub mod rest;
pub mod state;
pub mod ws_handler;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

// Re-export the main WebSocket handler and the player task so that the
// binary and the integration tests can reach them directly.
pub use middleware::require_auth;
pub use player_task::player_process;
pub use ws_handler::ws_handler;

use state::AppState;

/// Builds the API router: public reads and auth endpoints, plus the routes
/// that need a signed-in user.
pub fn api_router(app_state: Arc<AppState>) -> Router {
    let public_routes = Router::new()
        .route("/auth/signup", post(auth::signup_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/logout", post(auth::logout_handler))
        .route("/videos", get(rest::search_videos_handler))
        .route("/videos/{video_id}", get(rest::get_video_handler))
        .route("/campaigns", get(rest::list_campaigns_handler))
        .route("/advertisers/{advertiser_id}", get(rest::get_advertiser_handler))
        .route(
            "/advertisers/{advertiser_id}/impressions",
            get(rest::list_impressions_handler),
        );

    let protected_routes = Router::new()
        .route("/videos", post(rest::create_video_handler))
        .route("/advertisers", post(rest::create_advertiser_handler))
        .route("/campaigns", post(rest::create_campaign_handler))
        .route("/ws/player", get(ws_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(app_state)
}
