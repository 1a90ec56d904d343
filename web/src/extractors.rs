//! Custom Axum extractors.

use crate::middleware::from_header;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

/// Correlation ID for request tracing.
///
/// Taken from the request extensions when [`crate::correlation_id_layer`]
/// is installed, otherwise from the `X-Correlation-ID` header, otherwise
/// freshly generated.
///
/// ```ignore
/// async fn enroll(correlation_id: CorrelationId, Json(body): Json<EnrollRequest>) { ... }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrelationId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for CorrelationId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(id) = parts.extensions.get::<Self>() {
            return Ok(*id);
        }
        Ok(Self(from_header(&parts.headers).unwrap_or_else(Uuid::new_v4)))
    }
}
