//! Readiness and metrics endpoints.

use super::state::AppState;
use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use enrollment_core::track::TrackId;
use enrollment_runtime::{HealthCheck, HealthReport};
use enrollment_web::handlers::readiness;
use std::time::Duration;

const READINESS_TIMEOUT: Duration = Duration::from_secs(2);

/// `GET /health/ready`: the track store answers a lookup.
///
/// A lookup of an unknown id that comes back `NotFound` proves the store is
/// reachable.
pub async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let lookup = tokio::time::timeout(READINESS_TIMEOUT, state.tracks.get_track(TrackId::new())).await;

    let check = match lookup {
        Ok(Ok(_)) => HealthCheck::healthy("track_store"),
        Ok(Err(err)) if err.is_not_found() => HealthCheck::healthy("track_store"),
        Ok(Err(err)) => HealthCheck::unhealthy("track_store", err.to_string()),
        Err(_) => HealthCheck::unhealthy("track_store", "lookup timed out"),
    };

    readiness(vec![check.with_metadata("backend", state.backend)])
}

/// `GET /metrics`: Prometheus text format, 404 when metrics are disabled.
pub async fn metrics(State(state): State<AppState>) -> Response {
    match state.metrics.as_ref().and_then(enrollment_runtime::metrics::MetricsRecorder::render) {
        Some(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
