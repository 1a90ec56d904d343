//! Mapping of coordinator errors onto HTTP answers.

use axum::http::StatusCode;
use enrollment_coordinator::EnrollmentError;
use enrollment_web::AppError;

/// HTTP answer for a rejected Enroll or Withdraw.
///
/// | Error | Status |
/// |-------|--------|
/// | `TrackNotFound`, `ParticipantNotFound` | 404 |
/// | `CapacityExhausted` | 400 |
/// | `Conflict` | 409 |
/// | `Invalid` | 422 |
/// | `Unavailable` | 502 |
/// | `StoreWriteFailed`, `Coordinator` | 503 |
pub fn enrollment_error(err: EnrollmentError) -> AppError {
    let message = err.to_string();
    match err {
        EnrollmentError::TrackNotFound(id) => AppError::not_found("track", id),
        EnrollmentError::ParticipantNotFound(id) => AppError::not_found("participant", id),
        EnrollmentError::CapacityExhausted(_) => {
            AppError::capacity_exhausted(StatusCode::BAD_REQUEST, message)
        },
        EnrollmentError::Conflict(reason) => AppError::conflict(reason),
        EnrollmentError::Invalid(reason) => AppError::validation(reason),
        EnrollmentError::Unavailable(_) => AppError::upstream(message),
        EnrollmentError::StoreWriteFailed(_) => {
            AppError::new(StatusCode::SERVICE_UNAVAILABLE, "STORE_WRITE_FAILED", message)
        },
        EnrollmentError::Coordinator(_) => AppError::unavailable(message),
    }
}
