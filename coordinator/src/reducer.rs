//! The Enroll / Withdraw saga.
//!
//! ```text
//! Enroll ─► AvailabilityChecked ─► ParticipantWritten ─► DebitApplied ─► ParticipantActivated ─► Enrolled
//!                 │                        │                  │                   │
//!                 ▼                        ▼                  ▼                   ▼
//!              Rejected                 Rejected    (unknown) DebitVoided     Degraded
//!                                                             │        │
//!                                                             ▼        ▼
//!                                                   ParticipantRemoved ─► Rejected | Degraded
//!
//! Withdraw ─► ParticipantLoaded ─► ParticipantReleased ─► CreditApplied ─► Withdrawn | Degraded
//!                     │  (already released) ──────────────────►┘
//!                     ▼
//!                  Rejected (not found, pending)
//! ```
//!
//! The reducer only updates in-memory intents and chooses the next store call.
//! Each store call runs in its own `Effect::Future`, so the state lock is never
//! held across I/O and any number of requests can be in flight at once.

use crate::action::CoordinatorAction;
use crate::environment::{CoordinatorEnvironment, emit};
use crate::error::EnrollmentError;
use enrollment_core::effect::Effect;
use enrollment_core::error::StorageError;
use enrollment_core::intent::{EnrollmentIntent, IntentId, IntentKind, IntentStatus};
use enrollment_core::participant::{Lifecycle, Participant};
use enrollment_core::reconciliation::{ReconciliationKind, ReconciliationRecord};
use enrollment_core::reducer::Reducer;
use enrollment_core::track::TrackId;
use enrollment_core::{SmallVec, smallvec};
use std::collections::HashMap;

type Effects = SmallVec<[Effect<CoordinatorAction>; 4]>;

/// One request in flight.
#[derive(Clone, Debug, PartialEq)]
pub struct InFlight {
    /// Intent state machine
    pub intent: EnrollmentIntent,
    /// Latest known participant record
    pub participant: Option<Participant>,
    /// Error to report once compensation finishes
    pub cause: Option<EnrollmentError>,
}

impl InFlight {
    fn new(intent: EnrollmentIntent, participant: Option<Participant>) -> Self {
        Self {
            intent,
            participant,
            cause: None,
        }
    }

    fn track_id(&self) -> TrackId {
        self.intent
            .track_id
            .or_else(|| self.participant.as_ref().map(|p| p.track_id))
            .unwrap_or_default()
    }

    fn advance(&mut self, next: IntentStatus) {
        if let Err(err) = self.intent.advance(next) {
            tracing::warn!(intent_id = %self.intent.id, error = %err, "Ignoring invalid intent transition");
        }
    }
}

/// Saga state: every request that has not reached a terminal action yet.
#[derive(Clone, Debug, Default)]
pub struct CoordinatorState {
    /// In-flight requests keyed by intent id
    pub intents: HashMap<IntentId, InFlight>,
}

impl CoordinatorState {
    /// Number of requests in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.intents.len()
    }
}

/// The coordinator reducer.
#[derive(Clone, Copy, Debug, Default)]
pub struct CoordinatorReducer;

impl Reducer for CoordinatorReducer {
    type State = CoordinatorState;
    type Action = CoordinatorAction;
    type Environment = CoordinatorEnvironment;

    #[allow(clippy::too_many_lines)] // One arm per saga step
    fn reduce(
        &self,
        state: &mut CoordinatorState,
        action: CoordinatorAction,
        env: &CoordinatorEnvironment,
    ) -> Effects {
        let intent_id = action.intent_id();

        // Commands open a new intent
        match action {
            CoordinatorAction::Enroll { participant, .. } => {
                let track_id = participant.track_id;
                let intent = EnrollmentIntent::start(
                    intent_id,
                    IntentKind::Enroll,
                    participant.id,
                    Some(track_id),
                );
                tracing::debug!(%intent_id, participant_id = %participant.id, %track_id, "Enroll started");
                state
                    .intents
                    .insert(intent_id, InFlight::new(intent, Some(participant)));
                return smallvec![env.check_availability(intent_id, track_id)];
            },
            CoordinatorAction::Withdraw { participant_id, .. } => {
                let intent =
                    EnrollmentIntent::start(intent_id, IntentKind::Withdraw, participant_id, None);
                tracing::debug!(%intent_id, %participant_id, "Withdraw started");
                state.intents.insert(intent_id, InFlight::new(intent, None));
                return smallvec![env.load_participant(intent_id, participant_id)];
            },
            CoordinatorAction::Enrolled { .. }
            | CoordinatorAction::Withdrawn { .. }
            | CoordinatorAction::Rejected { .. }
            | CoordinatorAction::Degraded { .. } => {
                if let Some(done) = state.intents.remove(&intent_id) {
                    tracing::debug!(%intent_id, status = ?done.intent.status, "Intent finished");
                }
                return smallvec![Effect::None];
            },
            _ => {},
        }

        let Some(flight) = state.intents.get_mut(&intent_id) else {
            tracing::warn!(%intent_id, "Step result for unknown intent ignored");
            return smallvec![Effect::None];
        };
        let participant_id = flight.intent.participant_id;

        match action {
            // ===== Enroll =====
            CoordinatorAction::AvailabilityChecked { result, .. } => match result {
                Ok(availability) if availability.available => {
                    match flight.participant.clone() {
                        Some(participant) => {
                            smallvec![env.write_participant(intent_id, participant)]
                        },
                        None => fail(
                            flight,
                            EnrollmentError::Coordinator("enroll intent without participant".into()),
                        ),
                    }
                },
                Ok(_) => {
                    let track_id = flight.track_id();
                    fail(flight, EnrollmentError::CapacityExhausted(track_id))
                },
                Err(err) => fail(flight, EnrollmentError::from_lookup(err)),
            },

            CoordinatorAction::ParticipantWritten { result, .. } => match result {
                Ok(participant) => {
                    flight.advance(IntentStatus::StoreWritten);
                    flight.participant = Some(participant);
                    adjust(flight, env)
                },
                Err(err) => fail(flight, EnrollmentError::StoreWriteFailed(err.to_string())),
            },

            CoordinatorAction::DebitApplied { result, .. } => match result {
                Ok(outcome) => {
                    tracing::debug!(
                        %intent_id,
                        remaining = outcome.remaining_capacity,
                        replayed = outcome.replayed,
                        "Debit applied"
                    );
                    flight.advance(IntentStatus::CapacityAdjusted);
                    smallvec![env.set_lifecycle(intent_id, participant_id, Lifecycle::Active)]
                },
                Err(err) => {
                    let track_id = flight.track_id();
                    tracing::warn!(%intent_id, %participant_id, error = %err, "Debit failed, compensating");
                    flight.advance(IntentStatus::Compensating);
                    flight.cause = Some(match err {
                        StorageError::NotFound { .. } => EnrollmentError::TrackNotFound(track_id),
                        _ => EnrollmentError::CapacityExhausted(track_id),
                    });
                    if err.is_rejection() {
                        smallvec![env.remove_participant(intent_id, participant_id)]
                    } else {
                        // The debit may have landed: void its token before removing the record.
                        smallvec![env.void_debit(intent_id, track_id, flight.intent.token())]
                    }
                },
            },

            CoordinatorAction::DebitVoided { result, .. } => match result {
                Ok(outcome) => {
                    tracing::info!(%intent_id, ?outcome, "Debit voided");
                    smallvec![env.remove_participant(intent_id, participant_id)]
                },
                Err(err) if err.is_not_found() => {
                    smallvec![env.remove_participant(intent_id, participant_id)]
                },
                Err(err) => degrade(
                    flight,
                    env,
                    ReconciliationKind::OrphanedParticipant,
                    format!("debit could not be voided: {err}"),
                ),
            },

            CoordinatorAction::ParticipantRemoved { result, .. } => match result {
                Ok(_) => {
                    let cause = flight
                        .cause
                        .take()
                        .unwrap_or_else(|| EnrollmentError::CapacityExhausted(flight.track_id()));
                    fail(flight, cause)
                },
                Err(err) => degrade(
                    flight,
                    env,
                    ReconciliationKind::OrphanedParticipant,
                    format!("pending participant could not be removed: {err}"),
                ),
            },

            CoordinatorAction::ParticipantActivated { result, .. } => match result {
                Ok(participant) => {
                    flight.advance(IntentStatus::Done);
                    smallvec![emit(CoordinatorAction::Enrolled {
                        intent_id,
                        participant
                    })]
                },
                Err(err) => degrade(
                    flight,
                    env,
                    ReconciliationKind::OrphanedParticipant,
                    format!("participant could not be activated: {err}"),
                ),
            },

            // ===== Withdraw =====
            CoordinatorAction::ParticipantLoaded { result, .. } => match result {
                Ok(participant) => {
                    flight.intent.track_id = Some(participant.track_id);
                    flight.participant = Some(participant.clone());
                    match participant.lifecycle {
                        Lifecycle::Pending => fail(
                            flight,
                            EnrollmentError::Conflict(format!(
                                "enrollment of participant {participant_id} is still in progress"
                            )),
                        ),
                        // Re-issue the credit in case an earlier withdrawal stopped half way
                        Lifecycle::Released => adjust(flight, env),
                        Lifecycle::Active => {
                            smallvec![env.set_lifecycle(intent_id, participant_id, Lifecycle::Released)]
                        },
                    }
                },
                Err(err) => fail(flight, EnrollmentError::from_lookup(err)),
            },

            CoordinatorAction::ParticipantReleased { result, .. } => match result {
                Ok(participant) => {
                    flight.advance(IntentStatus::StoreWritten);
                    flight.participant = Some(participant);
                    adjust(flight, env)
                },
                Err(err) if err.is_not_found() => {
                    fail(flight, EnrollmentError::ParticipantNotFound(participant_id))
                },
                Err(err) => fail(flight, EnrollmentError::StoreWriteFailed(err.to_string())),
            },

            CoordinatorAction::CreditApplied { result, .. } => match result {
                Ok(outcome) => {
                    tracing::debug!(
                        %intent_id,
                        remaining = outcome.remaining_capacity,
                        replayed = outcome.replayed,
                        "Credit applied"
                    );
                    if flight.intent.status == IntentStatus::StoreWritten {
                        flight.advance(IntentStatus::CapacityAdjusted);
                    }
                    flight.advance(IntentStatus::Done);
                    match flight.participant.clone() {
                        Some(participant) => smallvec![emit(CoordinatorAction::Withdrawn {
                            intent_id,
                            participant
                        })],
                        None => fail(
                            flight,
                            EnrollmentError::Coordinator("withdraw intent without participant".into()),
                        ),
                    }
                },
                Err(err) => degrade(
                    flight,
                    env,
                    ReconciliationKind::PendingCapacityAdjustment,
                    format!("capacity credit could not be applied: {err}"),
                ),
            },

            // Commands and terminal events were handled above
            _ => smallvec![Effect::None],
        }
    }
}

/// End the request with `error`.
fn fail(flight: &mut InFlight, error: EnrollmentError) -> Effects {
    flight.advance(IntentStatus::Failed);
    tracing::info!(intent_id = %flight.intent.id, error = %error, "Request rejected");
    smallvec![emit(CoordinatorAction::Rejected {
        intent_id: flight.intent.id,
        error,
    })]
}

/// Issue the intent's capacity adjustment (debit for Enroll, credit for Withdraw).
fn adjust(flight: &mut InFlight, env: &CoordinatorEnvironment) -> Effects {
    match flight.intent.adjustment() {
        Some(adjustment) => {
            smallvec![env.adjust(flight.intent.id, adjustment, flight.intent.direction)]
        },
        None => fail(flight, EnrollmentError::Coordinator("intent has no track".into())),
    }
}

/// End the request as `Degraded`, leaving a reconciliation record for the
/// intent's adjustment.
fn degrade(
    flight: &mut InFlight,
    env: &CoordinatorEnvironment,
    kind: ReconciliationKind,
    reason: String,
) -> Effects {
    let Some(adjustment) = flight.intent.adjustment() else {
        return fail(flight, EnrollmentError::Coordinator(reason));
    };
    flight.advance(IntentStatus::Failed);
    let record = ReconciliationRecord::pending(
        kind,
        flight.intent.participant_id,
        adjustment.track_id,
        adjustment.delta,
        adjustment.token,
        reason,
        env.clock.now(),
    );
    smallvec![env.record_reconciliation(flight.intent.id, record)]
}
