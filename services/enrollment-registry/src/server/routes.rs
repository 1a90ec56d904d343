//! Router configuration for the enrollment service.

use super::health::{metrics, readiness_check};
use super::state::AppState;
use super::{participants, reconciliations};
use axum::{
    Router,
    routing::{get, post},
};
use enrollment_web::{correlation_id_layer, handlers::health_check};
use tower_http::trace::TraceLayer;

/// Build the complete router: participant and reconciliation endpoints,
/// health, metrics, request tracing and correlation ids.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/participants",
            post(participants::enroll).get(participants::find_participants),
        )
        .route(
            "/participants/:id",
            get(participants::get_participant).delete(participants::withdraw),
        )
        .route(
            "/reconciliations",
            get(reconciliations::list_reconciliations),
        )
        .route(
            "/reconciliations/run",
            post(reconciliations::run_reconciliation),
        )
        .route("/health", get(health_check))
        .route("/health/ready", get(readiness_check))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .layer(correlation_id_layer())
        .with_state(state)
}
