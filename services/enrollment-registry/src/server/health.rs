//! Readiness and metrics endpoints.

use super::state::AppState;
use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use enrollment_core::track::TrackId;
use enrollment_runtime::metrics::{EnrollmentMetrics, MetricsRecorder};
use enrollment_runtime::{HealthCheck, HealthReport};
use enrollment_web::handlers::readiness;
use std::time::Duration;

const READINESS_TIMEOUT: Duration = Duration::from_secs(2);

/// `GET /health/ready`
///
/// - `coordinator`: unhealthy once shutdown has begun
/// - `reconciliation`: degraded while records are pending
/// - `track_service`: degraded while the Track Store cannot be reached
pub async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let coordinator = state
        .coordinator
        .health()
        .with_metadata("in_flight", state.coordinator.in_flight().await.to_string());

    let reconciliation = match state.reconciler.pending().await {
        Ok(0) => HealthCheck::healthy("reconciliation").with_metadata("backend", state.backend),
        Ok(pending) => {
            EnrollmentMetrics::set_pending(pending);
            HealthCheck::degraded("reconciliation", format!("{pending} records pending"))
                .with_metadata("pending", pending.to_string())
                .with_metadata("backend", state.backend)
        },
        Err(e) => HealthCheck::unhealthy("reconciliation", e.to_string()),
    };

    let tracks = match tokio::time::timeout(READINESS_TIMEOUT, state.tracks.get_track(TrackId::new())).await {
        Ok(Ok(_)) => HealthCheck::healthy("track_service"),
        Ok(Err(e)) if e.is_not_found() => HealthCheck::healthy("track_service"),
        Ok(Err(e)) => HealthCheck::degraded("track_service", e.to_string()),
        Err(_) => HealthCheck::degraded("track_service", "lookup timed out"),
    };

    readiness(vec![coordinator, reconciliation, tracks])
}

/// `GET /metrics`: Prometheus text format, 404 when metrics are disabled.
pub async fn metrics(State(state): State<AppState>) -> Response {
    match state.metrics.as_ref().and_then(MetricsRecorder::render) {
        Some(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
