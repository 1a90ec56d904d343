//! HTTP client for the Track service.
//!
//! [`TrackServiceClient`] implements [`TrackStore`] and [`CapacityQuery`] so
//! the coordinator talks to a remote Track service exactly as it would to a
//! co-located store. HTTP answers are mapped back onto [`StorageError`]:
//!
//! | Answer | Error |
//! |--------|-------|
//! | 404 | `NotFound` |
//! | 409 `CAPACITY_EXHAUSTED` | `CapacityExhausted` |
//! | 409 `TOKEN_CONFLICT` | `TokenConflict` |
//! | 409 `ADJUSTMENT_VOIDED` | `AdjustmentVoided` |
//! | 400 / 422 | `Invalid` |
//! | 408 / 429 / 5xx, connection failure | `Unavailable` (transient) |
//! | request timeout | `Timeout` (transient) |

use enrollment_core::error::StorageError;
use enrollment_core::stores::{CapacityQuery, StoreFuture, TrackStore};
use enrollment_core::track::{
    AdjustOutcome, AdjustmentToken, Availability, CapacityAdjustment, Track, TrackFilter, TrackId,
    VoidOutcome,
};
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors building a [`TrackServiceClient`].
#[derive(Error, Debug)]
pub enum ClientError {
    /// Base URL could not be parsed or cannot carry a path
    #[error("invalid track service URL {url}: {reason}")]
    InvalidUrl {
        /// URL as configured
        url: String,
        /// Why it was refused
        reason: String,
    },

    /// HTTP client could not be built
    #[error("failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

/// Error body written by the Track service.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Serialize)]
struct AdjustBody<'a> {
    delta: i32,
    token: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateBody<'a> {
    name: &'a str,
    capacity: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchQuery<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    min_capacity: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_capacity: Option<u32>,
}

/// What a request was about, used to rebuild typed errors from HTTP answers.
#[derive(Debug, Clone, Copy)]
enum Subject<'a> {
    Tracks,
    Track(TrackId),
    Adjustment(TrackId, &'a AdjustmentToken),
}

/// Track Store backed by the Track service's HTTP API.
///
/// # Example
///
/// ```no_run
/// use enrollment_core::stores::CapacityQuery;
/// use enrollment_core::track::TrackId;
/// use enrollment_registry::TrackServiceClient;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = TrackServiceClient::new("http://localhost:3001", Duration::from_secs(2))?;
/// let availability = client.check_available(TrackId::new()).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TrackServiceClient {
    http: reqwest::Client,
    base_url: Url,
    timeout: Duration,
}

impl TrackServiceClient {
    /// Client for the Track service at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] if the URL is not an `http(s)` base URL or the
    /// HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let invalid = |reason: String| ClientError::InvalidUrl {
            url: base_url.to_string(),
            reason,
        };
        let parsed = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
        if parsed.cannot_be_a_base() || !matches!(parsed.scheme(), "http" | "https") {
            return Err(invalid("expected an http(s) base URL".to_string()));
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: parsed,
            timeout,
        })
    }

    /// Base URL requests are sent to.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `base_url` with `segments` appended, each percent-encoded.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Run `request` and decode a successful answer.
    ///
    /// Once the service has answered 2xx the write may have happened, so a
    /// body that cannot be read or decoded is reported as transient, never as
    /// a rejection.
    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        subject: Subject<'_>,
    ) -> Result<T, StorageError> {
        let response = self.execute(request).await?;
        if !response.status().is_success() {
            return Err(Self::rejection(response, subject).await);
        }
        let body = response.bytes().await.map_err(|e| self.transport_error(&e))?;
        serde_json::from_slice(&body).map_err(|e| {
            StorageError::Unavailable(format!("malformed track service response: {e}"))
        })
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Response, StorageError> {
        request.send().await.map_err(|e| self.transport_error(&e))
    }

    fn transport_error(&self, err: &reqwest::Error) -> StorageError {
        if err.is_timeout() {
            StorageError::Timeout(self.timeout)
        } else {
            StorageError::Unavailable(format!("track service unreachable: {err}"))
        }
    }

    async fn rejection(response: Response, subject: Subject<'_>) -> StorageError {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        let body = serde_json::from_str::<ErrorBody>(&text).unwrap_or_else(|_| ErrorBody {
            code: String::new(),
            message: text,
        });
        classify(status, body, subject)
    }
}

fn classify(status: StatusCode, body: ErrorBody, subject: Subject<'_>) -> StorageError {
    let message = if body.message.is_empty() {
        status.to_string()
    } else {
        body.message
    };

    match (status, body.code.as_str(), subject) {
        (StatusCode::NOT_FOUND, _, Subject::Track(id) | Subject::Adjustment(id, _)) => {
            StorageError::track_not_found(id)
        },
        (
            StatusCode::CONFLICT,
            "CAPACITY_EXHAUSTED",
            Subject::Track(id) | Subject::Adjustment(id, _),
        ) => StorageError::CapacityExhausted(id),
        (StatusCode::CONFLICT, "TOKEN_CONFLICT", Subject::Adjustment(_, token)) => {
            StorageError::TokenConflict {
                token: token.clone(),
            }
        },
        (StatusCode::CONFLICT, "ADJUSTMENT_VOIDED", Subject::Adjustment(_, token)) => {
            StorageError::AdjustmentVoided(token.clone())
        },
        (StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS, _, _) => {
            StorageError::Unavailable(format!("track service answered {status}: {message}"))
        },
        (s, _, _) if s.is_server_error() => {
            StorageError::Unavailable(format!("track service answered {status}: {message}"))
        },
        _ => StorageError::Invalid(format!("track service answered {status}: {message}")),
    }
}

impl TrackStore for TrackServiceClient {
    fn create_track(&self, track: Track) -> StoreFuture<'_, Track> {
        Box::pin(async move {
            let request = self.http.post(self.url(&["tracks"])).json(&CreateBody {
                name: &track.name,
                capacity: track.total_capacity,
            });
            self.send(request, Subject::Tracks).await
        })
    }

    fn get_track(&self, id: TrackId) -> StoreFuture<'_, Track> {
        Box::pin(async move {
            let id_text = id.to_string();
            let request = self.http.get(self.url(&["tracks", &id_text]));
            self.send(request, Subject::Track(id)).await
        })
    }

    fn list_tracks(&self, filter: TrackFilter) -> StoreFuture<'_, Vec<Track>> {
        Box::pin(async move {
            let request = self
                .http
                .get(self.url(&["tracks", "search"]))
                .query(&SearchQuery {
                    name: filter.name.as_deref(),
                    min_capacity: filter.min_capacity,
                    max_capacity: filter.max_capacity,
                });
            self.send(request, Subject::Tracks).await
        })
    }

    fn adjust_capacity(&self, adjustment: CapacityAdjustment) -> StoreFuture<'_, AdjustOutcome> {
        Box::pin(async move {
            let id_text = adjustment.track_id.to_string();
            let request = self
                .http
                .post(self.url(&["tracks", &id_text, "adjust"]))
                .json(&AdjustBody {
                    delta: adjustment.delta,
                    token: adjustment.token.as_str(),
                });
            self.send(
                request,
                Subject::Adjustment(adjustment.track_id, &adjustment.token),
            )
            .await
        })
    }

    fn void_adjustment(
        &self,
        track_id: TrackId,
        token: AdjustmentToken,
    ) -> StoreFuture<'_, VoidOutcome> {
        Box::pin(async move {
            let id_text = track_id.to_string();
            let request = self.http.post(self.url(&[
                "tracks",
                &id_text,
                "adjustments",
                token.as_str(),
                "void",
            ]));
            self.send(request, Subject::Adjustment(track_id, &token)).await
        })
    }

    fn delete_track(&self, id: TrackId) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let id_text = id.to_string();
            let request = self.http.delete(self.url(&["tracks", &id_text]));
            let response = self.execute(request).await?;
            if response.status().is_success() {
                Ok(())
            } else {
                Err(Self::rejection(response, Subject::Track(id)).await)
            }
        })
    }
}

impl CapacityQuery for TrackServiceClient {
    fn check_available(&self, track_id: TrackId) -> StoreFuture<'_, Availability> {
        Box::pin(async move {
            let id_text = track_id.to_string();
            let request = self
                .http
                .get(self.url(&["tracks", &id_text, "availability"]));
            self.send(request, Subject::Track(track_id)).await
        })
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    fn body(code: &str) -> ErrorBody {
        ErrorBody {
            code: code.to_string(),
            message: "refused".to_string(),
        }
    }

    #[test]
    fn rejects_non_http_urls() {
        let timeout = Duration::from_secs(1);
        assert!(matches!(
            TrackServiceClient::new("not a url", timeout),
            Err(ClientError::InvalidUrl { .. })
        ));
        assert!(matches!(
            TrackServiceClient::new("mailto:tracks@example.com", timeout),
            Err(ClientError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn url_segments_are_encoded_under_the_base_path() {
        let client =
            TrackServiceClient::new("http://tracks.internal:3001/api/", Duration::from_secs(1))
                .expect("valid base URL");
        let url = client.url(&["tracks", "abc", "adjustments", "p 1:debit", "void"]);
        assert_eq!(
            url.as_str(),
            "http://tracks.internal:3001/api/tracks/abc/adjustments/p%201:debit/void"
        );
    }

    #[test]
    fn conflicts_are_classified_by_code() {
        let id = TrackId::new();
        let token = AdjustmentToken::new("p:debit");
        let subject = Subject::Adjustment(id, &token);

        assert_eq!(
            classify(StatusCode::CONFLICT, body("CAPACITY_EXHAUSTED"), subject),
            StorageError::CapacityExhausted(id)
        );
        assert_eq!(
            classify(StatusCode::CONFLICT, body("TOKEN_CONFLICT"), subject),
            StorageError::TokenConflict {
                token: token.clone()
            }
        );
        assert_eq!(
            classify(StatusCode::CONFLICT, body("ADJUSTMENT_VOIDED"), subject),
            StorageError::AdjustmentVoided(token.clone())
        );
        assert!(matches!(
            classify(StatusCode::CONFLICT, body("SOMETHING_ELSE"), subject),
            StorageError::Invalid(_)
        ));
    }

    #[test]
    fn statuses_are_classified() {
        let id = TrackId::new();
        assert!(classify(StatusCode::NOT_FOUND, body("NOT_FOUND"), Subject::Track(id)).is_not_found());
        assert!(
            classify(StatusCode::SERVICE_UNAVAILABLE, ErrorBody::default(), Subject::Track(id))
                .is_transient()
        );
        assert!(classify(StatusCode::TOO_MANY_REQUESTS, ErrorBody::default(), Subject::Tracks).is_transient());
        assert!(matches!(
            classify(StatusCode::UNPROCESSABLE_ENTITY, body("VALIDATION_ERROR"), Subject::Tracks),
            StorageError::Invalid(msg) if msg.contains("refused")
        ));
    }
}
