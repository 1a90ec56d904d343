//! Storage errors shared by every store adapter.

use crate::track::{AdjustmentToken, TrackId};
use std::time::Duration;
use thiserror::Error;

/// Errors returned by the track, participant and reconciliation stores.
///
/// Adapters classify their failures into these variants so the coordinator
/// can decide between retrying, compensating and surfacing the error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Entity does not exist
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of entity ("track", "participant", ...)
        entity: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// Adjustment rejected: remaining capacity would drop below zero
    #[error("capacity exhausted for track {0}")]
    CapacityExhausted(TrackId),

    /// Token already used for a different track or delta
    #[error("adjustment token {token} was already used for a different adjustment")]
    TokenConflict {
        /// Conflicting token
        token: AdjustmentToken,
    },

    /// Token was voided and can never be applied
    #[error("adjustment token {0} has been voided")]
    AdjustmentVoided(AdjustmentToken),

    /// Request rejected as malformed
    #[error("invalid request: {0}")]
    Invalid(String),

    /// Store could not be reached or failed internally
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Call did not complete in time; the outcome is unknown
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
}

impl StorageError {
    /// Shorthand for a missing track.
    #[must_use]
    pub fn track_not_found(id: TrackId) -> Self {
        Self::NotFound {
            entity: "track",
            id: id.to_string(),
        }
    }

    /// Shorthand for a missing participant.
    #[must_use]
    pub fn participant_not_found(id: impl ToString) -> Self {
        Self::NotFound {
            entity: "participant",
            id: id.to_string(),
        }
    }

    /// Whether retrying the same call may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }

    /// Whether the store evaluated the call and refused it, so nothing was
    /// applied. Any other failure leaves the outcome of a write unknown.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::CapacityExhausted(_)
                | Self::TokenConflict { .. }
                | Self::AdjustmentVoided(_)
        )
    }

    /// Whether this is a `NotFound`.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
