//! Errors returned to callers of the coordinator.

use enrollment_core::error::StorageError;
use enrollment_core::participant::ParticipantId;
use enrollment_core::track::TrackId;
use enrollment_runtime::StoreError;
use thiserror::Error;

/// Why an Enroll or Withdraw request did not complete.
///
/// Requests that were accepted but left a reconciliation record behind are
/// not errors; they come back as a `Degraded` outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnrollmentError {
    /// The track does not exist
    #[error("track not found: {0}")]
    TrackNotFound(TrackId),

    /// The participant does not exist (or has been withdrawn and purged)
    #[error("participant not found: {0}")]
    ParticipantNotFound(ParticipantId),

    /// The track has no remaining capacity
    #[error("no remaining capacity on track {0}")]
    CapacityExhausted(TrackId),

    /// A store could not be reached within the retry budget
    #[error("upstream store unavailable: {0}")]
    Unavailable(String),

    /// The participant record could not be written; nothing was changed
    #[error("participant record could not be written: {0}")]
    StoreWriteFailed(String),

    /// The request conflicts with the participant's current state
    #[error("conflict: {0}")]
    Conflict(String),

    /// The request is malformed
    #[error("invalid request: {0}")]
    Invalid(String),

    /// The coordinator itself could not run the request
    #[error("coordinator unavailable: {0}")]
    Coordinator(String),
}

impl EnrollmentError {
    /// Classify a store error from a read that precedes any mutation.
    #[must_use]
    pub fn from_lookup(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { entity: "participant", id } => id
                .parse()
                .map_or(Self::Invalid(format!("unknown participant {id}")), Self::ParticipantNotFound),
            StorageError::NotFound { id, .. } => id
                .parse()
                .map_or(Self::Invalid(format!("unknown track {id}")), Self::TrackNotFound),
            StorageError::CapacityExhausted(track) => Self::CapacityExhausted(track),
            StorageError::Invalid(msg) => Self::Invalid(msg),
            other => Self::Unavailable(other.to_string()),
        }
    }

    /// Short label used for metrics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::TrackNotFound(_) | Self::ParticipantNotFound(_) => "not_found",
            Self::CapacityExhausted(_) => "capacity_exhausted",
            Self::Unavailable(_) => "unavailable",
            Self::StoreWriteFailed(_) => "store_write_failed",
            Self::Conflict(_) => "conflict",
            Self::Invalid(_) => "invalid",
            Self::Coordinator(_) => "coordinator",
        }
    }
}

impl From<StoreError> for EnrollmentError {
    fn from(err: StoreError) -> Self {
        Self::Coordinator(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_errors_are_classified() {
        let track = TrackId::new();
        assert_eq!(
            EnrollmentError::from_lookup(StorageError::track_not_found(track)),
            EnrollmentError::TrackNotFound(track)
        );

        let participant = ParticipantId::new();
        assert_eq!(
            EnrollmentError::from_lookup(StorageError::participant_not_found(participant)),
            EnrollmentError::ParticipantNotFound(participant)
        );

        assert!(matches!(
            EnrollmentError::from_lookup(StorageError::Unavailable("down".into())),
            EnrollmentError::Unavailable(_)
        ));
    }

    #[test]
    fn store_errors_become_coordinator_errors() {
        let err: EnrollmentError = StoreError::ShutdownInProgress.into();
        assert_eq!(err.label(), "coordinator");
    }
}
