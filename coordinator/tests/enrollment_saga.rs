//! End-to-end Enroll / Withdraw behaviour against in-memory stores with
//! injected faults.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

mod common;

use common::{Harness, MAX_RETRIES};
use enrollment_coordinator::{EnrollOutcome, EnrollmentError, WithdrawOutcome};
use enrollment_core::error::StorageError;
use enrollment_core::participant::{Lifecycle, Participant, ParticipantId};
use enrollment_core::reconciliation::ReconciliationKind;
use enrollment_core::stores::ParticipantStore;
use enrollment_core::track::TrackId;
use enrollment_testing::faults::{Fault, LogOp, ParticipantOp, StaleCapacityQuery, TrackOp};
use enrollment_testing::properties::{Operation, capacities, operations};
use proptest::prelude::*;
use std::sync::Arc;

fn enrolled(outcome: Result<EnrollOutcome, EnrollmentError>) -> Participant {
    match outcome {
        Ok(EnrollOutcome::Enrolled(participant)) => participant,
        other => panic!("expected Enrolled, got {other:?}"),
    }
}

#[tokio::test]
async fn scenario_t1_capacity_two() {
    let h = Harness::new();
    let t1 = h.track("T1", 2).await;

    let a = enrolled(h.coordinator.enroll("A", t1).await);
    assert_eq!(h.remaining(t1), 1);
    let _b = enrolled(h.coordinator.enroll("B", t1).await);
    assert_eq!(h.remaining(t1), 0);

    let c = h.coordinator.enroll("C", t1).await;
    assert_eq!(c, Err(EnrollmentError::CapacityExhausted(t1)));
    assert_eq!(h.remaining(t1), 0);

    let withdrawn = h.coordinator.withdraw(a.id).await.unwrap();
    assert!(matches!(withdrawn, WithdrawOutcome::Withdrawn(ref p) if p.lifecycle == Lifecycle::Released));
    assert_eq!(h.remaining(t1), 1);

    let _d = enrolled(h.coordinator.enroll("D", t1).await);
    assert_eq!(h.remaining(t1), 0);
    assert_eq!(h.active(t1), 2);
    assert_eq!(h.coordinator.in_flight().await, 0);
}

#[tokio::test]
async fn stale_advisory_check_cannot_oversell() {
    let h = Harness::with_capacity_query(Arc::new(StaleCapacityQuery::answering(true)));
    let full = h.track("Full", 0).await;

    let result = h.coordinator.enroll("Late", full).await;

    assert_eq!(result, Err(EnrollmentError::CapacityExhausted(full)));
    assert_eq!(h.remaining(full), 0);
    assert!(h.participant_data.all().is_empty(), "compensation must remove the record");
}

#[tokio::test]
async fn concurrent_enrolls_on_last_seat() {
    let h = Harness::new();
    let track = h.track("Last seat", 1).await;

    let mut tasks = Vec::new();
    for i in 0..8 {
        let coordinator = h.coordinator.clone();
        tasks.push(tokio::spawn(async move {
            coordinator.enroll(&format!("racer-{i}"), track).await
        }));
    }

    let mut winners = 0;
    let mut exhausted = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(EnrollOutcome::Enrolled(_)) => winners += 1,
            Err(EnrollmentError::CapacityExhausted(_)) => exhausted += 1,
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    assert_eq!(winners, 1);
    assert_eq!(exhausted, 7);
    assert_eq!(h.remaining(track), 0);
    assert_eq!(h.active(track), 1);
    assert_eq!(h.pending(track), 0);
}

#[tokio::test]
async fn second_withdraw_is_a_no_op_success() {
    let h = Harness::new();
    let track = h.track("T", 3).await;
    let participant = enrolled(h.coordinator.enroll("Ada", track).await);

    let first = h.coordinator.withdraw(participant.id).await.unwrap();
    let second = h.coordinator.withdraw(participant.id).await.unwrap();

    assert!(matches!(first, WithdrawOutcome::Withdrawn(_)));
    assert!(matches!(second, WithdrawOutcome::Withdrawn(_)));
    assert_eq!(h.remaining(track), 3);
    assert_eq!(
        h.participant_data.peek(participant.id).unwrap().lifecycle,
        Lifecycle::Released
    );
}

#[tokio::test]
async fn debit_replayed_after_lost_reply_counts_once() {
    let h = Harness::new();
    let track = h.track("T", 2).await;
    h.tracks.plan().inject(TrackOp::Adjust, Fault::ApplyThenTimeout);

    let participant = enrolled(h.coordinator.enroll("Ada", track).await);

    assert_eq!(h.tracks.plan().calls(TrackOp::Adjust), 2);
    assert_eq!(h.remaining(track), 1);
    assert_eq!(participant.lifecycle, Lifecycle::Active);
    h.assert_invariant(track, 2);
}

#[tokio::test]
async fn credit_replayed_after_lost_reply_counts_once() {
    let h = Harness::new();
    let track = h.track("T", 1).await;
    let participant = enrolled(h.coordinator.enroll("Ada", track).await);
    h.tracks.plan().inject(TrackOp::Adjust, Fault::ApplyThenTimeout);

    let outcome = h.coordinator.withdraw(participant.id).await.unwrap();

    assert!(matches!(outcome, WithdrawOutcome::Withdrawn(_)));
    assert_eq!(h.remaining(track), 1);
}

#[tokio::test]
async fn permanent_debit_failure_compensates_fully() {
    let h = Harness::new();
    let track = h.track("T", 2).await;
    h.tracks.plan().always(TrackOp::Adjust, Fault::Unavailable);

    let result = h.coordinator.enroll("Ada", track).await;

    assert_eq!(result, Err(EnrollmentError::CapacityExhausted(track)));
    assert_eq!(h.tracks.plan().calls(TrackOp::Adjust), MAX_RETRIES + 1);
    assert_eq!(h.tracks.plan().calls(TrackOp::Void), 1);
    assert_eq!(h.remaining(track), 2);
    assert!(h.participant_data.all().is_empty());

    assert!(h.track_data.applied_tokens(track).is_empty());
}

#[tokio::test]
async fn applied_but_unacknowledged_debit_is_reverted_by_compensation() {
    let h = Harness::new();
    let track = h.track("T", 2).await;
    h.tracks.plan().inject(TrackOp::Adjust, Fault::ApplyThenTimeout);
    h.tracks
        .plan()
        .inject_times(TrackOp::Adjust, &Fault::Unavailable, MAX_RETRIES);

    let result = h.coordinator.enroll("Ada", track).await;

    assert_eq!(result, Err(EnrollmentError::CapacityExhausted(track)));
    assert_eq!(h.remaining(track), 2);
    assert!(h.participant_data.all().is_empty());
    assert!(h.track_data.applied_tokens(track).is_empty());
}

#[tokio::test]
async fn debit_applied_but_answered_with_garbage_is_voided() {
    let h = Harness::new();
    let track = h.track("T", 2).await;
    h.tracks.plan().inject(
        TrackOp::Adjust,
        Fault::ApplyThenFail(StorageError::Invalid("malformed track service response".into())),
    );

    let result = h.coordinator.enroll("Ada", track).await;

    assert_eq!(result, Err(EnrollmentError::CapacityExhausted(track)));
    assert_eq!(h.tracks.plan().calls(TrackOp::Void), 1);
    assert_eq!(h.remaining(track), 2);
    assert!(h.participant_data.all().is_empty());
    assert!(h.track_data.applied_tokens(track).is_empty());
    h.assert_invariant(track, 2);
}

#[tokio::test]
async fn definitive_rejection_skips_the_void() {
    let h = Harness::new();
    let track = h.track("T", 1).await;
    h.tracks
        .plan()
        .inject(TrackOp::Adjust, Fault::Fail(StorageError::CapacityExhausted(track)));

    let result = h.coordinator.enroll("Ada", track).await;

    assert_eq!(result, Err(EnrollmentError::CapacityExhausted(track)));
    assert_eq!(h.tracks.plan().calls(TrackOp::Void), 0);
    assert!(h.participant_data.all().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn hundreds_of_concurrent_requests_each_get_their_outcome() {
    let h = Harness::new();
    let track = h.track("Popular", 300).await;

    let mut tasks = Vec::new();
    for i in 0..400 {
        let coordinator = h.coordinator.clone();
        tasks.push(tokio::spawn(async move {
            coordinator.enroll(&format!("p{i}"), track).await
        }));
    }

    let mut enrolled_ids = Vec::new();
    let mut exhausted = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(EnrollOutcome::Enrolled(participant)) => enrolled_ids.push(participant.id),
            Err(EnrollmentError::CapacityExhausted(_)) => exhausted += 1,
            other => panic!("unexpected outcome {other:?}"),
        }
    }
    assert_eq!(enrolled_ids.len(), 300);
    assert_eq!(exhausted, 100);
    assert_eq!(h.remaining(track), 0);
    h.assert_invariant(track, 300);

    let mut tasks = Vec::new();
    for id in enrolled_ids {
        let coordinator = h.coordinator.clone();
        tasks.push(tokio::spawn(async move { coordinator.withdraw(id).await }));
    }
    for task in tasks {
        assert!(matches!(task.await.unwrap(), Ok(WithdrawOutcome::Withdrawn(_))));
    }

    assert_eq!(h.remaining(track), 300);
    assert_eq!(h.active(track), 0);
    assert_eq!(h.pending(track), 0);
    assert_eq!(h.coordinator.in_flight().await, 0);
}

#[tokio::test]
async fn activation_failure_is_degraded_with_orphan_record() {
    let h = Harness::new();
    let track = h.track("T", 2).await;
    h.participants
        .plan()
        .inject_times(ParticipantOp::SetLifecycle, &Fault::Unavailable, MAX_RETRIES + 1);

    let outcome = h.coordinator.enroll("Ada", track).await.unwrap();

    let EnrollOutcome::Degraded(notice) = outcome else {
        panic!("expected Degraded, got {outcome:?}");
    };
    assert_eq!(notice.kind, ReconciliationKind::OrphanedParticipant);
    assert!(notice.reconciliation_id.is_some());
    assert_eq!(h.remaining(track), 1);
    assert_eq!(h.pending(track), 1);
    assert_eq!(h.log_data.all().len(), 1);
}

#[tokio::test]
async fn credit_failure_is_degraded_with_pending_adjustment() {
    let h = Harness::new();
    let track = h.track("T", 1).await;
    let participant = enrolled(h.coordinator.enroll("Ada", track).await);
    h.tracks.plan().always(TrackOp::Adjust, Fault::Unavailable);

    let outcome = h.coordinator.withdraw(participant.id).await.unwrap();

    let WithdrawOutcome::Degraded(notice) = outcome else {
        panic!("expected Degraded, got {outcome:?}");
    };
    assert_eq!(notice.kind, ReconciliationKind::PendingCapacityAdjustment);
    assert_eq!(notice.participant_id, participant.id);
    assert_eq!(h.remaining(track), 0);
    assert_eq!(
        h.participant_data.peek(participant.id).unwrap().lifecycle,
        Lifecycle::Released
    );
}

#[tokio::test]
async fn unrecordable_degradation_still_answers() {
    let h = Harness::new();
    let track = h.track("T", 1).await;
    let participant = enrolled(h.coordinator.enroll("Ada", track).await);
    h.tracks.plan().always(TrackOp::Adjust, Fault::Unavailable);
    h.log
        .plan()
        .always(LogOp::Record, Fault::Unavailable);

    let outcome = h.coordinator.withdraw(participant.id).await.unwrap();

    let WithdrawOutcome::Degraded(notice) = outcome else {
        panic!("expected Degraded, got {outcome:?}");
    };
    assert_eq!(notice.reconciliation_id, None);
}

#[tokio::test]
async fn withdraw_of_pending_participant_conflicts() {
    let h = Harness::new();
    let track = h.track("T", 1).await;
    let pending = h
        .participant_data
        .create_participant(Participant::pending("Ada", track))
        .await
        .unwrap();

    let result = h.coordinator.withdraw(pending.id).await;

    assert!(matches!(result, Err(EnrollmentError::Conflict(_))));
    assert_eq!(h.remaining(track), 1);
}

#[tokio::test]
async fn withdraw_of_unknown_participant_is_not_found() {
    let h = Harness::new();
    let unknown = ParticipantId::new();

    let result = h.coordinator.withdraw(unknown).await;

    assert_eq!(result, Err(EnrollmentError::ParticipantNotFound(unknown)));
}

#[tokio::test]
async fn enroll_into_unknown_track_is_not_found() {
    let h = Harness::new();
    let unknown = TrackId::new();

    let result = h.coordinator.enroll("Ada", unknown).await;

    assert_eq!(result, Err(EnrollmentError::TrackNotFound(unknown)));
    assert!(h.participant_data.all().is_empty());
}

#[tokio::test]
async fn blank_name_is_invalid() {
    let h = Harness::new();
    let track = h.track("T", 1).await;

    let result = h.coordinator.enroll("   ", track).await;

    assert!(matches!(result, Err(EnrollmentError::Invalid(_))));
}

#[tokio::test]
async fn unreachable_track_store_is_unavailable() {
    let h = Harness::new();
    let track = h.track("T", 1).await;
    h.tracks.plan().always(TrackOp::Get, Fault::Unavailable);

    let result = h.coordinator.enroll("Ada", track).await;

    assert!(matches!(result, Err(EnrollmentError::Unavailable(_))));
    assert_eq!(h.tracks.plan().calls(TrackOp::Get), MAX_RETRIES + 1);
    assert!(h.participant_data.all().is_empty());
}

#[tokio::test]
async fn participant_write_failure_changes_nothing() {
    let h = Harness::new();
    let track = h.track("T", 1).await;
    h.participants.plan().inject(
        ParticipantOp::Create,
        Fault::Fail(StorageError::Invalid("duplicate".into())),
    );

    let result = h.coordinator.enroll("Ada", track).await;

    assert!(matches!(result, Err(EnrollmentError::StoreWriteFailed(_))));
    assert_eq!(h.remaining(track), 1);
    assert_eq!(h.tracks.plan().calls(TrackOp::Adjust), 0);
}

#[tokio::test]
async fn track_deleted_mid_flight_compensates_as_not_found() {
    let h = Harness::new();
    let track = h.track("T", 1).await;
    h.tracks.plan().inject(
        TrackOp::Adjust,
        Fault::Fail(StorageError::track_not_found(track)),
    );

    let result = h.coordinator.enroll("Ada", track).await;

    assert_eq!(result, Err(EnrollmentError::TrackNotFound(track)));
    assert!(h.participant_data.all().is_empty());
}

#[tokio::test]
async fn shutdown_rejects_new_requests() {
    let h = Harness::new();
    let track = h.track("T", 1).await;

    h.coordinator
        .shutdown(std::time::Duration::from_secs(1))
        .await
        .unwrap();
    let result = h.coordinator.enroll("Ada", track).await;

    assert!(matches!(result, Err(EnrollmentError::Coordinator(_))));
    assert!(h.coordinator.health().status.is_unhealthy());
}

fn run_sequence(capacities: &[u32], ops: &[Operation], faulty: bool) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    runtime.block_on(async {
        let h = Harness::new();
        let mut tracks = Vec::new();
        for (idx, capacity) in capacities.iter().enumerate() {
            tracks.push((h.track(&format!("T{idx}"), *capacity).await, *capacity));
        }
        let mut enrolled_ids: Vec<ParticipantId> = Vec::new();

        for (step, op) in ops.iter().enumerate() {
            if faulty {
                match step % 4 {
                    0 => h.tracks.plan().inject(TrackOp::Adjust, Fault::ApplyThenTimeout),
                    1 => h.participants.plan().inject_times(
                        ParticipantOp::SetLifecycle,
                        &Fault::Unavailable,
                        MAX_RETRIES + 1,
                    ),
                    _ => {},
                }
            }

            match *op {
                Operation::Enroll { track } => {
                    let (track_id, _) = tracks[track % tracks.len()];
                    if let Ok(EnrollOutcome::Enrolled(p)) =
                        h.coordinator.enroll("p", track_id).await
                    {
                        enrolled_ids.push(p.id);
                    }
                },
                Operation::Withdraw { participant } if !enrolled_ids.is_empty() => {
                    let id = enrolled_ids.remove(participant % enrolled_ids.len());
                    // A failed release leaves the participant Active and its seat taken
                    if h.coordinator.withdraw(id).await.is_err() {
                        enrolled_ids.push(id);
                    }
                },
                Operation::Withdraw { .. } => {},
            }

            h.participants.plan().heal(ParticipantOp::SetLifecycle);
            h.tracks.plan().heal(TrackOp::Adjust);
        }

        h.reconciler.run_once().await.unwrap();
        assert_eq!(h.reconciler.pending().await.unwrap(), 0);
        for (track_id, total) in tracks {
            h.assert_invariant(track_id, total);
            assert_eq!(h.pending(track_id), 0);
        }
    });
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn capacity_matches_active_participants(
        capacities in capacities(3, 4),
        ops in operations(24),
    ) {
        run_sequence(&capacities, &ops, false);
    }

    #[test]
    fn capacity_matches_active_participants_under_faults(
        capacities in capacities(2, 3),
        ops in operations(16),
    ) {
        run_sequence(&capacities, &ops, true);
    }
}
