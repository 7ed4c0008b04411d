pub mod middleware;
pub mod protocol;
pub mod rest;
pub mod state;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

pub use middleware::require_identity;
pub use rest::ApiDoc;
pub use state::{AppState, Identity};

/// Builds the API routes. CORS and Swagger UI are layered on by the binary.
pub fn router(state: Arc<AppState>) -> Router {
    // Routes that need to know who is calling
    let identified_routes = Router::new()
        .route("/sessions/{kind}/start", post(rest::start_session_handler))
        .route("/sessions/{kind}/current", get(rest::current_item_handler))
        .route("/sessions/{kind}/answer", post(rest::answer_handler))
        .route("/sessions/{kind}/next", post(rest::next_handler))
        .route("/sessions/{kind}/save", post(rest::save_handler))
        .route("/sessions/{kind}/restart", post(rest::restart_handler))
        .route("/sessions/{kind}/submit-all", post(rest::submit_all_handler))
        .route("/progress/summary", get(rest::progress_summary_handler))
        .route("/stats/daily", get(rest::daily_stats_handler))
        .layer(axum_middleware::from_fn(require_identity));

    // Public routes
    let public_routes = Router::new().route("/check", post(rest::check_handler));

    Router::new()
        .merge(identified_routes)
        .merge(public_routes)
        .with_state(state)
}
