//! Error type for web handlers.
//!
//! [`AppError`] carries an HTTP status, a stable machine-readable code and a
//! user-facing message, and renders as `{"code": ..., "message": ...}`.
//! Server errors are logged when the response is built.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use enrollment_core::error::StorageError;
use serde::Serialize;
use std::fmt;

/// Application error type for web handlers.
///
/// # Examples
///
/// ```ignore
/// async fn get_track(Path(id): Path<TrackId>) -> Result<Json<Track>, AppError> {
///     let track = store.get_track(id).await?;
///     Ok(Json(track))
/// }
/// ```
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    code: &'static str,
    /// Internal error, logged but never sent to the client
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            code,
            source: None,
        }
    }

    /// Attach the underlying error for logging.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// HTTP status of this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }

    /// 404 Not Found.
    #[must_use]
    pub fn not_found(resource: impl fmt::Display, id: impl fmt::Display) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{resource} with id {id} not found"),
        )
    }

    /// 409 Conflict.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "CONFLICT", message)
    }

    /// No seat left on a track, reported with `status`.
    ///
    /// The Track service answers 409, the Enrollment service 400.
    #[must_use]
    pub fn capacity_exhausted(status: StatusCode, message: impl Into<String>) -> Self {
        Self::new(status, "CAPACITY_EXHAUSTED", message)
    }

    /// 422 Unprocessable Entity.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR", message)
    }

    /// 502 Bad Gateway: a service this one depends on failed.
    #[must_use]
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, "UPSTREAM_FAILURE", message)
    }

    /// 503 Service Unavailable.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            match &self.source {
                Some(source) => tracing::error!(
                    status = %self.status,
                    code = self.code,
                    message = %self.message,
                    error = %source,
                    "Request failed"
                ),
                None => tracing::error!(
                    status = %self.status,
                    code = self.code,
                    message = %self.message,
                    "Request failed"
                ),
            }
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

/// Store errors as answered by the service that owns the store.
impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        let message = err.to_string();
        match err {
            StorageError::NotFound { entity, id } => Self::not_found(entity, id),
            StorageError::CapacityExhausted(_) => {
                Self::capacity_exhausted(StatusCode::CONFLICT, message)
            },
            StorageError::TokenConflict { .. } => {
                Self::new(StatusCode::CONFLICT, "TOKEN_CONFLICT", message)
            },
            StorageError::AdjustmentVoided(_) => {
                Self::new(StatusCode::CONFLICT, "ADJUSTMENT_VOIDED", message)
            },
            StorageError::Invalid(reason) => Self::validation(reason),
            StorageError::Unavailable(_) | StorageError::Timeout(_) => {
                Self::unavailable("storage is temporarily unavailable")
                    .with_source(anyhow::anyhow!(message))
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use enrollment_core::track::{AdjustmentToken, TrackId};

    #[test]
    fn display_includes_code() {
        let err = AppError::conflict("Participant already withdrawn");
        assert_eq!(err.to_string(), "[CONFLICT] Participant already withdrawn");
    }

    #[test]
    fn storage_errors_map_to_track_service_statuses() {
        let id = TrackId::new();
        let cases = [
            (StorageError::track_not_found(id), StatusCode::NOT_FOUND, "NOT_FOUND"),
            (StorageError::CapacityExhausted(id), StatusCode::CONFLICT, "CAPACITY_EXHAUSTED"),
            (
                StorageError::TokenConflict {
                    token: AdjustmentToken::new("t"),
                },
                StatusCode::CONFLICT,
                "TOKEN_CONFLICT",
            ),
            (
                StorageError::AdjustmentVoided(AdjustmentToken::new("t")),
                StatusCode::CONFLICT,
                "ADJUSTMENT_VOIDED",
            ),
            (StorageError::Invalid("bad".into()), StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            (
                StorageError::Unavailable("down".into()),
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
            ),
        ];

        for (err, status, code) in cases {
            let app = AppError::from(err);
            assert_eq!(app.status(), status);
            assert_eq!(app.code(), code);
        }
    }

    #[test]
    fn not_found_names_the_entity() {
        let err = AppError::from(StorageError::participant_not_found("42"));
        assert_eq!(err.to_string(), "[NOT_FOUND] participant with id 42 not found");
    }

    #[tokio::test]
    async fn response_body_has_code_and_message() {
        let response = AppError::upstream("track service down").into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap_or_default();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap_or_default();
        assert_eq!(body["code"], "UPSTREAM_FAILURE");
        assert_eq!(body["message"], "track service down");
    }
}
