//! # Enrollment Coordinator
//!
//! Keeps a track's remaining capacity consistent with the number of active
//! participants assigned to it, across a Track Store and a Participant Store
//! that share no transaction.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐  enroll / withdraw   ┌──────────────────┐
//! │ Coordinator │ ───────────────────► │ Store (runtime)  │
//! └─────────────┘ ◄─── terminal action │ CoordinatorReducer│
//!                                      └────────┬─────────┘
//!                                               │ Effect::Future per step
//!                    ┌──────────────────────────┼─────────────────────┐
//!                    ▼                          ▼                     ▼
//!              CapacityQuery              ParticipantStore        TrackStore
//!                                                                     │
//!                         failures past the retry budget ──► ReconciliationLog
//!                                                                     │
//!                                                   Reconciler::run_once ◄┘
//! ```
//!
//! The Track Store's atomic, floor-checked adjustment is the only admission
//! gate; the capacity check is advisory. Every adjustment carries a token
//! derived from `(participant, direction)`, so retries never double count.

pub mod action;
pub mod coordinator;
pub mod environment;
pub mod error;
pub mod guarded;
pub mod reconciler;
pub mod reducer;

pub use action::{CoordinatorAction, DegradedNotice, EnrollOutcome, WithdrawOutcome};
pub use coordinator::{Coordinator, CoordinatorStore};
pub use environment::CoordinatorEnvironment;
pub use error::EnrollmentError;
pub use guarded::CallGuard;
pub use reconciler::{ReconciliationReport, Reconciler};
pub use reducer::{CoordinatorReducer, CoordinatorState, InFlight};

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use enrollment_core::error::StorageError;
    use enrollment_core::intent::{IntentId, IntentStatus};
    use enrollment_core::participant::{Lifecycle, Participant};
    use enrollment_core::stores::ReadThroughCapacityQuery;
    use enrollment_core::track::{AdjustOutcome, Availability, Track, TrackId};
    use enrollment_runtime::retry::RetryPolicy;
    use enrollment_testing::{
        InMemoryParticipantStore, InMemoryReconciliationLog, InMemoryTrackStore, ReducerTest,
        assertions, test_clock,
    };
    use std::sync::Arc;
    use std::time::Duration;

    fn env() -> CoordinatorEnvironment {
        let tracks = Arc::new(InMemoryTrackStore::new());
        CoordinatorEnvironment {
            tracks: tracks.clone(),
            capacity: Arc::new(ReadThroughCapacityQuery::new(tracks)),
            participants: Arc::new(InMemoryParticipantStore::new()),
            reconciliations: Arc::new(InMemoryReconciliationLog::new()),
            clock: Arc::new(test_clock()),
            guard: CallGuard::new(RetryPolicy::no_retry(), Duration::from_millis(100)),
        }
    }

    fn enroll(intent_id: IntentId, track_id: TrackId) -> CoordinatorAction {
        CoordinatorAction::Enroll {
            intent_id,
            participant: Participant::pending("Ada", track_id),
        }
    }

    #[test]
    fn enroll_opens_an_intent_and_checks_capacity() {
        let intent_id = IntentId::new();
        ReducerTest::new(CoordinatorReducer)
            .with_env(env())
            .given_state(CoordinatorState::default())
            .when_action(enroll(intent_id, TrackId::new()))
            .then_state(move |state| {
                let flight = &state.intents[&intent_id];
                assert_eq!(flight.intent.status, IntentStatus::Started);
                assert!(flight.participant.is_some());
            })
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 1);
                assertions::assert_has_future_effect(effects);
            })
            .run();
    }

    #[test]
    fn unavailable_track_rejects_without_writing() {
        let intent_id = IntentId::new();
        let track_id = TrackId::new();
        ReducerTest::new(CoordinatorReducer)
            .with_env(env())
            .given_state(CoordinatorState::default())
            .given_actions([enroll(intent_id, track_id)])
            .when_action(CoordinatorAction::AvailabilityChecked {
                intent_id,
                result: Ok(Availability { available: false }),
            })
            .then_state(move |state| {
                assert_eq!(state.intents[&intent_id].intent.status, IntentStatus::Failed);
            })
            .run();
    }

    #[test]
    fn debit_success_moves_to_capacity_adjusted() {
        let intent_id = IntentId::new();
        let track_id = TrackId::new();
        let participant = Participant::pending("Ada", track_id);
        ReducerTest::new(CoordinatorReducer)
            .with_env(env())
            .given_state(CoordinatorState::default())
            .given_actions([
                CoordinatorAction::Enroll {
                    intent_id,
                    participant: participant.clone(),
                },
                CoordinatorAction::AvailabilityChecked {
                    intent_id,
                    result: Ok(Availability { available: true }),
                },
                CoordinatorAction::ParticipantWritten {
                    intent_id,
                    result: Ok(participant),
                },
            ])
            .when_action(CoordinatorAction::DebitApplied {
                intent_id,
                result: Ok(AdjustOutcome {
                    remaining_capacity: 0,
                    replayed: false,
                }),
            })
            .then_state(move |state| {
                assert_eq!(
                    state.intents[&intent_id].intent.status,
                    IntentStatus::CapacityAdjusted
                );
            })
            .then_effects(assertions::assert_has_future_effect)
            .run();
    }

    #[test]
    fn transient_debit_failure_compensates() {
        let intent_id = IntentId::new();
        let track_id = TrackId::new();
        let participant = Participant::pending("Ada", track_id);
        ReducerTest::new(CoordinatorReducer)
            .with_env(env())
            .given_state(CoordinatorState::default())
            .given_actions([
                CoordinatorAction::Enroll {
                    intent_id,
                    participant: participant.clone(),
                },
                CoordinatorAction::AvailabilityChecked {
                    intent_id,
                    result: Ok(Availability { available: true }),
                },
                CoordinatorAction::ParticipantWritten {
                    intent_id,
                    result: Ok(participant),
                },
            ])
            .when_action(CoordinatorAction::DebitApplied {
                intent_id,
                result: Err(StorageError::Timeout(Duration::from_millis(100))),
            })
            .then_state(move |state| {
                let flight = &state.intents[&intent_id];
                assert_eq!(flight.intent.status, IntentStatus::Compensating);
                assert_eq!(
                    flight.cause,
                    Some(EnrollmentError::CapacityExhausted(track_id))
                );
            })
            .run();
    }

    #[test]
    fn terminal_action_removes_the_intent() {
        let intent_id = IntentId::new();
        ReducerTest::new(CoordinatorReducer)
            .with_env(env())
            .given_state(CoordinatorState::default())
            .given_actions([enroll(intent_id, TrackId::new())])
            .when_action(CoordinatorAction::Rejected {
                intent_id,
                error: EnrollmentError::CapacityExhausted(TrackId::new()),
            })
            .then_state(|state| assert_eq!(state.in_flight(), 0))
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn step_for_unknown_intent_is_ignored() {
        ReducerTest::new(CoordinatorReducer)
            .with_env(env())
            .given_state(CoordinatorState::default())
            .when_action(CoordinatorAction::CreditApplied {
                intent_id: IntentId::new(),
                result: Ok(AdjustOutcome {
                    remaining_capacity: 1,
                    replayed: false,
                }),
            })
            .then_state(|state| assert_eq!(state.in_flight(), 0))
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    /// Step a full Enroll saga by hand, resolving each effect in turn.
    #[tokio::test]
    async fn stepped_enroll_saga_reaches_enrolled() {
        let env = env();
        let track = env.tracks.create_track(Track::new("T1", 1)).await.unwrap();
        let intent_id = IntentId::new();
        let mut state = CoordinatorState::default();
        let reducer = CoordinatorReducer;

        let mut pending = vec![enroll(intent_id, track.id)];
        let mut terminal = None;
        while let Some(action) = pending.pop() {
            if action.is_terminal() {
                terminal = Some(action.clone());
            }
            let effects = enrollment_core::reducer::Reducer::reduce(&reducer, &mut state, action, &env);
            pending.extend(assertions::resolve_futures(effects).await);
        }

        match terminal.expect("saga produced no terminal action") {
            CoordinatorAction::Enrolled { participant, .. } => {
                assert_eq!(participant.lifecycle, Lifecycle::Active);
            },
            other => panic!("expected Enrolled, got {other:?}"),
        }
        assert_eq!(state.in_flight(), 0);
        assert_eq!(env.tracks.get_track(track.id).await.unwrap().remaining_capacity, 0);
    }
}
