//! The enrollment intent state machine.
//!
//! An intent tracks one Enroll or Withdraw request through the cross-store
//! sequence:
//!
//! ```text
//! Started ──► StoreWritten ──► CapacityAdjusted ──► Done
//!    │             │                  │
//!    │             ├──► Compensating ─┤
//!    ▼             ▼                  ▼
//!  Done          Failed ◄─────────────┘
//! ```
//!
//! `Started → Done` is taken only by a Withdraw whose participant was already
//! released (the credit is re-issued and the request completes).

use crate::participant::ParticipantId;
use crate::track::{AdjustmentDirection, AdjustmentToken, CapacityAdjustment, TrackId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

uuid_id! {
    /// Identifier of one in-flight coordinator request.
    IntentId
}

/// Which coordinator operation an intent belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntentKind {
    /// Enroll(name, trackId)
    Enroll,
    /// Withdraw(participantId)
    Withdraw,
}

impl IntentKind {
    /// Capacity direction of this operation.
    #[must_use]
    pub const fn direction(self) -> AdjustmentDirection {
        match self {
            Self::Enroll => AdjustmentDirection::Decrement,
            Self::Withdraw => AdjustmentDirection::Increment,
        }
    }
}

/// Progress of an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntentStatus {
    /// Accepted, nothing mutated yet
    Started,
    /// Participant store mutated
    StoreWritten,
    /// Track capacity adjusted
    CapacityAdjusted,
    /// Rolling back the participant store write
    Compensating,
    /// Completed
    Done,
    /// Ended without completing
    Failed,
}

impl IntentStatus {
    /// Whether `self → next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Started, Self::StoreWritten | Self::Failed | Self::Done)
                | (
                    Self::StoreWritten,
                    Self::CapacityAdjusted | Self::Compensating | Self::Failed
                )
                | (Self::CapacityAdjusted, Self::Done | Self::Failed)
                | (Self::Compensating, Self::Failed)
        )
    }

    /// `Done` and `Failed` accept no further transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Rejected state machine transition.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("invalid intent transition: {from:?} -> {to:?}")]
pub struct InvalidTransition {
    /// Current status
    pub from: IntentStatus,
    /// Requested status
    pub to: IntentStatus,
}

/// Coordinator bookkeeping for one Enroll or Withdraw request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentIntent {
    /// Intent id
    pub id: IntentId,
    /// Operation
    pub kind: IntentKind,
    /// Participant being enrolled or withdrawn
    pub participant_id: ParticipantId,
    /// Track, once known (a Withdraw learns it from the participant record)
    pub track_id: Option<TrackId>,
    /// Capacity direction
    pub direction: AdjustmentDirection,
    /// Current status
    pub status: IntentStatus,
}

impl EnrollmentIntent {
    /// New intent in `Started`.
    #[must_use]
    pub fn start(
        id: IntentId,
        kind: IntentKind,
        participant_id: ParticipantId,
        track_id: Option<TrackId>,
    ) -> Self {
        Self {
            id,
            kind,
            participant_id,
            track_id,
            direction: kind.direction(),
            status: IntentStatus::Started,
        }
    }

    /// Move to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] and leaves the status unchanged when the
    /// transition is not legal.
    pub fn advance(&mut self, next: IntentStatus) -> Result<(), InvalidTransition> {
        if self.status.can_transition_to(next) {
            self.status = next;
            Ok(())
        } else {
            Err(InvalidTransition {
                from: self.status,
                to: next,
            })
        }
    }

    /// Idempotency token of this intent's capacity adjustment.
    #[must_use]
    pub fn token(&self) -> AdjustmentToken {
        AdjustmentToken::for_participant(self.participant_id, self.direction)
    }

    /// The capacity adjustment this intent issues, once the track is known.
    #[must_use]
    pub fn adjustment(&self) -> Option<CapacityAdjustment> {
        self.track_id.map(|track_id| {
            CapacityAdjustment::for_participant(track_id, self.participant_id, self.direction)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use IntentStatus::{CapacityAdjusted, Compensating, Done, Failed, Started, StoreWritten};

    const ALL: [IntentStatus; 6] = [
        Started,
        StoreWritten,
        CapacityAdjusted,
        Compensating,
        Done,
        Failed,
    ];

    fn intent(kind: IntentKind) -> EnrollmentIntent {
        EnrollmentIntent::start(
            IntentId::new(),
            kind,
            ParticipantId::new(),
            Some(TrackId::new()),
        )
    }

    #[test]
    fn happy_path_is_legal() {
        let mut i = intent(IntentKind::Enroll);
        assert_eq!(i.advance(StoreWritten), Ok(()));
        assert_eq!(i.advance(CapacityAdjusted), Ok(()));
        assert_eq!(i.advance(Done), Ok(()));
        assert!(i.status.is_terminal());
    }

    #[test]
    fn compensation_branch_ends_failed() {
        let mut i = intent(IntentKind::Enroll);
        assert_eq!(i.advance(StoreWritten), Ok(()));
        assert_eq!(i.advance(Compensating), Ok(()));
        assert_eq!(i.advance(Done), Err(InvalidTransition { from: Compensating, to: Done }));
        assert_eq!(i.status, Compensating);
        assert_eq!(i.advance(Failed), Ok(()));
    }

    #[test]
    fn terminal_states_accept_nothing() {
        for terminal in [Done, Failed] {
            for next in ALL {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn cannot_skip_the_store_write() {
        assert!(!Started.can_transition_to(CapacityAdjusted));
        assert!(!Started.can_transition_to(Compensating));
        assert!(!StoreWritten.can_transition_to(Done));
    }

    #[test]
    fn direction_and_token_follow_kind() {
        let enroll = intent(IntentKind::Enroll);
        assert_eq!(enroll.direction, AdjustmentDirection::Decrement);
        assert!(enroll.token().as_str().ends_with(":debit"));
        assert_eq!(enroll.adjustment().map(|a| a.delta), Some(-1));

        let withdraw = intent(IntentKind::Withdraw);
        assert!(withdraw.token().as_str().ends_with(":credit"));
        assert_eq!(withdraw.adjustment().map(|a| a.delta), Some(1));
    }
}
