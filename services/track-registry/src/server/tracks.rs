//! Track endpoints.

use super::state::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use enrollment_core::error::StorageError;
use enrollment_core::track::{
    AdjustOutcome, AdjustmentToken, Availability, CapacityAdjustment, NewTrack, Track,
    TrackFilter, TrackId, VoidOutcome,
};
use enrollment_runtime::metrics::TrackMetrics;
use enrollment_web::{AppError, WebResult};
use serde::Deserialize;

/// Body of `POST /tracks/:id/adjust`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustRequest {
    /// Signed change to remaining capacity
    pub delta: i32,
    /// Idempotency token
    pub token: String,
}

/// `POST /tracks`
pub async fn create_track(
    State(state): State<AppState>,
    Json(request): Json<NewTrack>,
) -> WebResult<(StatusCode, Json<Track>)> {
    let track = request.into_track().map_err(AppError::validation)?;
    let track = state.tracks.create_track(track).await?;

    tracing::info!(track_id = %track.id, name = %track.name, capacity = track.total_capacity, "Track created");
    Ok((StatusCode::CREATED, Json(track)))
}

/// `GET /tracks`
pub async fn list_tracks(State(state): State<AppState>) -> WebResult<Json<Vec<Track>>> {
    Ok(Json(state.tracks.list_tracks(TrackFilter::default()).await?))
}

/// `GET /tracks/search?name=&minCapacity=&maxCapacity=`
///
/// Bounds apply to remaining capacity and are inclusive.
pub async fn search_tracks(
    State(state): State<AppState>,
    Query(filter): Query<TrackFilter>,
) -> WebResult<Json<Vec<Track>>> {
    if let (Some(min), Some(max)) = (filter.min_capacity, filter.max_capacity) {
        if min > max {
            return Err(AppError::validation(format!(
                "minCapacity ({min}) must not exceed maxCapacity ({max})"
            )));
        }
    }
    Ok(Json(state.tracks.list_tracks(filter).await?))
}

/// `GET /tracks/:id`
pub async fn get_track(
    State(state): State<AppState>,
    Path(id): Path<TrackId>,
) -> WebResult<Json<Track>> {
    Ok(Json(state.tracks.get_track(id).await?))
}

/// `GET /tracks/:id/availability`
pub async fn availability(
    State(state): State<AppState>,
    Path(id): Path<TrackId>,
) -> WebResult<Json<Availability>> {
    let track = state.tracks.get_track(id).await?;
    Ok(Json(Availability {
        available: track.has_capacity(),
    }))
}

/// `POST /tracks/:id/adjust`
pub async fn adjust(
    State(state): State<AppState>,
    Path(id): Path<TrackId>,
    Json(request): Json<AdjustRequest>,
) -> WebResult<Json<AdjustOutcome>> {
    if request.delta == 0 {
        return Err(AppError::validation("delta must not be zero"));
    }
    let token = request.token.trim();
    if token.is_empty() {
        return Err(AppError::validation("token must not be empty"));
    }

    let adjustment = CapacityAdjustment {
        track_id: id,
        delta: request.delta,
        token: AdjustmentToken::new(token),
    };
    let result = state.tracks.adjust_capacity(adjustment).await;
    TrackMetrics::record_adjust(adjust_label(&result));

    match &result {
        Ok(outcome) => tracing::debug!(
            track_id = %id,
            delta = request.delta,
            token,
            remaining = outcome.remaining_capacity,
            replayed = outcome.replayed,
            "Capacity adjusted"
        ),
        Err(err) => tracing::debug!(track_id = %id, delta = request.delta, token, error = %err, "Adjustment refused"),
    }

    Ok(Json(result?))
}

/// `POST /tracks/:id/adjustments/:token/void`
pub async fn void_adjustment(
    State(state): State<AppState>,
    Path((id, token)): Path<(TrackId, String)>,
) -> WebResult<Json<VoidOutcome>> {
    let outcome = state
        .tracks
        .void_adjustment(id, AdjustmentToken::new(token.clone()))
        .await?;

    tracing::info!(track_id = %id, token = %token, ?outcome, "Adjustment voided");
    Ok(Json(outcome))
}

/// `DELETE /tracks/:id`
pub async fn delete_track(
    State(state): State<AppState>,
    Path(id): Path<TrackId>,
) -> WebResult<StatusCode> {
    state.tracks.delete_track(id).await?;
    tracing::info!(track_id = %id, "Track deleted");
    Ok(StatusCode::OK)
}

const fn adjust_label(result: &Result<AdjustOutcome, StorageError>) -> &'static str {
    match result {
        Ok(AdjustOutcome { replayed: true, .. }) => "replayed",
        Ok(_) => "applied",
        Err(StorageError::CapacityExhausted(_)) => "capacity_exhausted",
        Err(StorageError::TokenConflict { .. }) => "token_conflict",
        Err(StorageError::AdjustmentVoided(_)) => "voided",
        Err(StorageError::NotFound { .. }) => "not_found",
        Err(_) => "error",
    }
}
