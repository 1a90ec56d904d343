//! Router configuration for the track service.

use super::health::{metrics, readiness_check};
use super::state::AppState;
use super::tracks;
use axum::{
    Router,
    routing::{get, post},
};
use enrollment_web::{correlation_id_layer, handlers::health_check};
use tower_http::trace::TraceLayer;

/// Build the complete router: track endpoints, health, metrics, request
/// tracing and correlation ids.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/tracks", post(tracks::create_track).get(tracks::list_tracks))
        .route("/tracks/search", get(tracks::search_tracks))
        .route("/tracks/:id", get(tracks::get_track).delete(tracks::delete_track))
        .route("/tracks/:id/availability", get(tracks::availability))
        .route("/tracks/:id/adjust", post(tracks::adjust))
        .route(
            "/tracks/:id/adjustments/:token/void",
            post(tracks::void_adjustment),
        )
        .route("/health", get(health_check))
        .route("/health/ready", get(readiness_check))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .layer(correlation_id_layer())
        .with_state(state)
}
