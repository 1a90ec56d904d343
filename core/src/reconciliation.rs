//! Reconciliation records.
//!
//! A reconciliation record is the durable note left behind when a
//! compensation or capacity credit could not be completed within the retry
//! budget. Records are replayed later by the coordinator's reconciler and are
//! never dropped silently.

use crate::error::StorageError;
use crate::participant::ParticipantId;
use crate::track::{AdjustmentToken, TrackId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

uuid_id! {
    /// Identifier of a reconciliation record.
    ReconciliationId
}

/// What was left inconsistent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReconciliationKind {
    /// A participant record whose debit outcome is unresolved
    ///
    /// Either activation could not be written after a successful debit, or
    /// the Pending record could not be removed during compensation.
    OrphanedParticipant,
    /// A capacity adjustment that still has to be applied
    PendingCapacityAdjustment,
}

impl ReconciliationKind {
    /// Convert kind to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OrphanedParticipant => "orphaned_participant",
            Self::PendingCapacityAdjustment => "pending_capacity_adjustment",
        }
    }

    /// Parse kind from database string.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Invalid`] if the string doesn't match a known kind.
    pub fn parse(s: &str) -> Result<Self, StorageError> {
        match s {
            "orphaned_participant" => Ok(Self::OrphanedParticipant),
            "pending_capacity_adjustment" => Ok(Self::PendingCapacityAdjustment),
            _ => Err(StorageError::Invalid(format!(
                "Invalid reconciliation kind: {s}"
            ))),
        }
    }
}

/// Status of a reconciliation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReconciliationStatus {
    /// Awaiting replay
    Pending,
    /// Replayed successfully
    Resolved,
}

impl ReconciliationStatus {
    /// Convert status to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Resolved => "resolved",
        }
    }

    /// Parse status from database string.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Invalid`] if the string doesn't match a known status.
    pub fn parse(s: &str) -> Result<Self, StorageError> {
        match s {
            "pending" => Ok(Self::Pending),
            "resolved" => Ok(Self::Resolved),
            _ => Err(StorageError::Invalid(format!(
                "Invalid reconciliation status: {s}"
            ))),
        }
    }
}

/// A recorded, recoverable inconsistency between the two registries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationRecord {
    /// Record id
    pub id: ReconciliationId,
    /// Participant concerned
    pub participant_id: ParticipantId,
    /// Track concerned
    pub track_id: TrackId,
    /// Signed capacity change at stake
    pub delta: i32,
    /// Token of the adjustment at stake
    pub token: AdjustmentToken,
    /// What went wrong
    pub kind: ReconciliationKind,
    /// Current status
    pub status: ReconciliationStatus,
    /// Last failure message
    pub reason: String,
    /// Replay attempts so far
    pub attempts: u32,
    /// When the record was written
    pub created_at: DateTime<Utc>,
    /// When the record was resolved
    pub resolved_at: Option<DateTime<Utc>>,
}

impl ReconciliationRecord {
    /// New pending record.
    #[must_use]
    pub fn pending(
        kind: ReconciliationKind,
        participant_id: ParticipantId,
        track_id: TrackId,
        delta: i32,
        token: AdjustmentToken,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ReconciliationId::new(),
            participant_id,
            track_id,
            delta,
            token,
            kind,
            status: ReconciliationStatus::Pending,
            reason: reason.into(),
            attempts: 0,
            created_at: now,
            resolved_at: None,
        }
    }
}
