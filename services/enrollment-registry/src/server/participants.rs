//! Participant endpoints.

use super::errors::enrollment_error;
use super::state::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use enrollment_coordinator::{DegradedNotice, EnrollOutcome, WithdrawOutcome};
use enrollment_core::participant::{Participant, ParticipantFilter, ParticipantId};
use enrollment_core::track::TrackId;
use enrollment_web::{AppError, CorrelationId, WebResult};
use serde::{Deserialize, Serialize};

/// Body of `POST /participants`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollRequest {
    /// Display name
    pub name: String,
    /// Track to enroll into
    pub track_id: TrackId,
}

/// Body of a `202 Accepted` answer.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationPending {
    /// Always `reconciliation_pending`
    pub status: &'static str,
    /// What was left behind
    #[serde(flatten)]
    pub notice: DegradedNotice,
}

fn accepted(notice: DegradedNotice) -> Response {
    (
        StatusCode::ACCEPTED,
        Json(ReconciliationPending {
            status: "reconciliation_pending",
            notice,
        }),
    )
        .into_response()
}

/// `POST /participants`
pub async fn enroll(
    State(state): State<AppState>,
    correlation_id: CorrelationId,
    Json(request): Json<EnrollRequest>,
) -> WebResult<Response> {
    let outcome = state
        .coordinator
        .enroll(&request.name, request.track_id)
        .await
        .map_err(enrollment_error)?;

    match outcome {
        EnrollOutcome::Enrolled(participant) => {
            tracing::info!(
                correlation_id = %correlation_id.0,
                participant_id = %participant.id,
                track_id = %participant.track_id,
                "Participant enrolled"
            );
            Ok((StatusCode::CREATED, Json(participant)).into_response())
        },
        EnrollOutcome::Degraded(notice) => {
            tracing::warn!(
                correlation_id = %correlation_id.0,
                participant_id = %notice.participant_id,
                kind = notice.kind.as_str(),
                reason = %notice.reason,
                "Enrollment accepted with reconciliation pending"
            );
            Ok(accepted(notice))
        },
    }
}

/// `DELETE /participants/:id`
///
/// Withdrawing an already withdrawn participant succeeds again.
pub async fn withdraw(
    State(state): State<AppState>,
    correlation_id: CorrelationId,
    Path(id): Path<ParticipantId>,
) -> WebResult<Response> {
    let outcome = state
        .coordinator
        .withdraw(id)
        .await
        .map_err(enrollment_error)?;

    match outcome {
        WithdrawOutcome::Withdrawn(participant) => {
            tracing::info!(
                correlation_id = %correlation_id.0,
                participant_id = %participant.id,
                track_id = %participant.track_id,
                "Participant withdrawn"
            );
            Ok((StatusCode::OK, Json(participant)).into_response())
        },
        WithdrawOutcome::Degraded(notice) => {
            tracing::warn!(
                correlation_id = %correlation_id.0,
                participant_id = %notice.participant_id,
                reason = %notice.reason,
                "Withdrawal accepted with credit pending"
            );
            Ok(accepted(notice))
        },
    }
}

/// `GET /participants/:id`
///
/// Withdrawn participants are kept as tombstones but read as absent.
pub async fn get_participant(
    State(state): State<AppState>,
    Path(id): Path<ParticipantId>,
) -> WebResult<Json<Participant>> {
    let participant = state.participants.get_participant(id).await?;
    if participant.is_released() {
        return Err(AppError::not_found("participant", id));
    }
    Ok(Json(participant))
}

/// `GET /participants?name=&trackId=`
pub async fn find_participants(
    State(state): State<AppState>,
    Query(filter): Query<ParticipantFilter>,
) -> WebResult<Json<Vec<Participant>>> {
    Ok(Json(state.participants.find_participants(filter).await?))
}
