//! Health check endpoints.
//!
//! `GET /health` is a liveness check and touches nothing. `GET /health/ready`
//! is built by each service from its own component checks.

use axum::{Json, http::StatusCode};
use enrollment_runtime::{HealthCheck, HealthReport, HealthStatus};

/// Liveness check.
///
/// ```text
/// GET /health -> 200 "ok"
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Readiness answer for a set of component checks.
///
/// - 200 OK: every component healthy or degraded
/// - 503 Service Unavailable: any component unhealthy
///
/// ```json
/// {
///   "status": "degraded",
///   "checks": [{ "component": "reconciliation", "status": "degraded", "message": "2 pending" }],
///   "timestamp": "2025-01-01T00:00:00Z"
/// }
/// ```
#[must_use]
pub fn readiness(checks: Vec<HealthCheck>) -> (StatusCode, Json<HealthReport>) {
    let report = HealthReport::new(checks);
    let status = match report.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(report))
}
