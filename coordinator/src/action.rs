//! Coordinator actions and request outcomes.

use crate::error::EnrollmentError;
use enrollment_core::error::StorageError;
use enrollment_core::intent::IntentId;
use enrollment_core::participant::{Participant, ParticipantId};
use enrollment_core::reconciliation::{ReconciliationId, ReconciliationKind};
use enrollment_core::track::{AdjustOutcome, Availability, TrackId, VoidOutcome};
use serde::Serialize;

/// Commands and step results of the Enroll / Withdraw saga.
///
/// Every variant carries the id of the intent it belongs to, so concurrent
/// requests never see each other's results.
#[derive(Clone, Debug, PartialEq)]
pub enum CoordinatorAction {
    // Commands
    /// Command: enroll a freshly built `Pending` participant
    Enroll {
        /// Intent id
        intent_id: IntentId,
        /// Record to write (lifecycle `Pending`)
        participant: Participant,
    },
    /// Command: withdraw a participant
    Withdraw {
        /// Intent id
        intent_id: IntentId,
        /// Participant to withdraw
        participant_id: ParticipantId,
    },

    // Enroll steps
    /// Event: advisory capacity check answered
    AvailabilityChecked {
        /// Intent id
        intent_id: IntentId,
        /// Answer, or why there is none
        result: Result<Availability, StorageError>,
    },
    /// Event: `Pending` participant write finished
    ParticipantWritten {
        /// Intent id
        intent_id: IntentId,
        /// Stored record
        result: Result<Participant, StorageError>,
    },
    /// Event: debit attempt finished
    DebitApplied {
        /// Intent id
        intent_id: IntentId,
        /// Store answer
        result: Result<AdjustOutcome, StorageError>,
    },
    /// Event: participant activation finished
    ParticipantActivated {
        /// Intent id
        intent_id: IntentId,
        /// Activated record
        result: Result<Participant, StorageError>,
    },
    /// Event: debit token voided during compensation
    DebitVoided {
        /// Intent id
        intent_id: IntentId,
        /// Store answer
        result: Result<VoidOutcome, StorageError>,
    },
    /// Event: `Pending` participant deleted during compensation
    ParticipantRemoved {
        /// Intent id
        intent_id: IntentId,
        /// `true` if a record was deleted
        result: Result<bool, StorageError>,
    },

    // Withdraw steps
    /// Event: participant record read
    ParticipantLoaded {
        /// Intent id
        intent_id: IntentId,
        /// Stored record
        result: Result<Participant, StorageError>,
    },
    /// Event: participant marked `Released`
    ParticipantReleased {
        /// Intent id
        intent_id: IntentId,
        /// Tombstone
        result: Result<Participant, StorageError>,
    },
    /// Event: credit attempt finished
    CreditApplied {
        /// Intent id
        intent_id: IntentId,
        /// Store answer
        result: Result<AdjustOutcome, StorageError>,
    },

    // Terminal events
    /// Event: participant enrolled and active
    Enrolled {
        /// Intent id
        intent_id: IntentId,
        /// Active record
        participant: Participant,
    },
    /// Event: participant withdrawn and seat credited
    Withdrawn {
        /// Intent id
        intent_id: IntentId,
        /// Tombstone
        participant: Participant,
    },
    /// Event: request ended without effect
    Rejected {
        /// Intent id
        intent_id: IntentId,
        /// Reason reported to the caller
        error: EnrollmentError,
    },
    /// Event: request accepted with a reconciliation record pending
    Degraded {
        /// Intent id
        intent_id: IntentId,
        /// What was left behind
        notice: DegradedNotice,
    },
}

impl CoordinatorAction {
    /// Intent this action belongs to.
    #[must_use]
    pub const fn intent_id(&self) -> IntentId {
        match self {
            Self::Enroll { intent_id, .. }
            | Self::Withdraw { intent_id, .. }
            | Self::AvailabilityChecked { intent_id, .. }
            | Self::ParticipantWritten { intent_id, .. }
            | Self::DebitApplied { intent_id, .. }
            | Self::ParticipantActivated { intent_id, .. }
            | Self::DebitVoided { intent_id, .. }
            | Self::ParticipantRemoved { intent_id, .. }
            | Self::ParticipantLoaded { intent_id, .. }
            | Self::ParticipantReleased { intent_id, .. }
            | Self::CreditApplied { intent_id, .. }
            | Self::Enrolled { intent_id, .. }
            | Self::Withdrawn { intent_id, .. }
            | Self::Rejected { intent_id, .. }
            | Self::Degraded { intent_id, .. } => *intent_id,
        }
    }

    /// Whether this action ends its request.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Enrolled { .. }
                | Self::Withdrawn { .. }
                | Self::Rejected { .. }
                | Self::Degraded { .. }
        )
    }

    /// Whether this action ends the request identified by `intent_id`.
    #[must_use]
    pub fn is_terminal_for(&self, intent_id: IntentId) -> bool {
        self.is_terminal() && self.intent_id() == intent_id
    }
}

/// Details of a request that was accepted but left a reconciliation record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DegradedNotice {
    /// Participant concerned
    pub participant_id: ParticipantId,
    /// Track concerned
    pub track_id: TrackId,
    /// What still has to be reconciled
    pub kind: ReconciliationKind,
    /// Record id, `None` if even the record could not be written
    pub reconciliation_id: Option<ReconciliationId>,
    /// Failure that caused the record
    pub reason: String,
}

/// Result of a successful Enroll call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EnrollOutcome {
    /// Participant is `Active` and holds a seat
    Enrolled(Participant),
    /// Accepted; a reconciliation record is pending
    Degraded(DegradedNotice),
}

/// Result of a successful Withdraw call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WithdrawOutcome {
    /// Participant is `Released` and the seat is credited
    Withdrawn(Participant),
    /// Accepted; the credit is pending reconciliation
    Degraded(DegradedNotice),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_actions_match_only_their_intent() {
        let mine = IntentId::new();
        let other = IntentId::new();
        let action = CoordinatorAction::Rejected {
            intent_id: mine,
            error: EnrollmentError::Conflict("pending".into()),
        };

        assert!(action.is_terminal_for(mine));
        assert!(!action.is_terminal_for(other));

        let step = CoordinatorAction::DebitApplied {
            intent_id: mine,
            result: Err(StorageError::Unavailable("down".into())),
        };
        assert!(!step.is_terminal_for(mine));
    }
}
