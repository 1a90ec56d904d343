//! Injected dependencies of the coordinator and the effects built from them.
//!
//! Each method returns one [`Effect::Future`] that performs a single guarded
//! store call and reports its result as the next saga action. The reducer
//! decides which one to run; nothing here touches saga state.

use crate::action::{CoordinatorAction, DegradedNotice};
use crate::guarded::CallGuard;
use enrollment_core::effect::Effect;
use enrollment_core::environment::Clock;
use enrollment_core::intent::IntentId;
use enrollment_core::participant::{Lifecycle, Participant, ParticipantId};
use enrollment_core::reconciliation::ReconciliationRecord;
use enrollment_core::stores::{CapacityQuery, ParticipantStore, ReconciliationLog, TrackStore};
use enrollment_core::track::{AdjustmentDirection, AdjustmentToken, CapacityAdjustment, TrackId};
use enrollment_runtime::metrics::EnrollmentMetrics;
use std::sync::Arc;

/// Stores, clock and call budget used by the coordinator.
#[derive(Clone)]
pub struct CoordinatorEnvironment {
    /// Track Store (authoritative capacity)
    pub tracks: Arc<dyn TrackStore>,
    /// Advisory capacity check
    pub capacity: Arc<dyn CapacityQuery>,
    /// Participant Store
    pub participants: Arc<dyn ParticipantStore>,
    /// Reconciliation log
    pub reconciliations: Arc<dyn ReconciliationLog>,
    /// Clock for reconciliation timestamps
    pub clock: Arc<dyn Clock>,
    /// Per-call timeout and retry policy
    pub guard: CallGuard,
}

impl std::fmt::Debug for CoordinatorEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinatorEnvironment")
            .field("guard", &self.guard)
            .finish_non_exhaustive()
    }
}

impl CoordinatorEnvironment {
    pub(crate) fn check_availability(
        &self,
        intent_id: IntentId,
        track_id: TrackId,
    ) -> Effect<CoordinatorAction> {
        let capacity = Arc::clone(&self.capacity);
        let guard = self.guard.clone();
        Effect::future(async move {
            let result = guard
                .call("check_available", || capacity.check_available(track_id))
                .await;
            Some(CoordinatorAction::AvailabilityChecked { intent_id, result })
        })
    }

    pub(crate) fn write_participant(
        &self,
        intent_id: IntentId,
        participant: Participant,
    ) -> Effect<CoordinatorAction> {
        let participants = Arc::clone(&self.participants);
        let guard = self.guard.clone();
        Effect::future(async move {
            let result = guard
                .call("create_participant", || {
                    participants.create_participant(participant.clone())
                })
                .await;
            Some(CoordinatorAction::ParticipantWritten { intent_id, result })
        })
    }

    pub(crate) fn adjust(
        &self,
        intent_id: IntentId,
        adjustment: CapacityAdjustment,
        direction: AdjustmentDirection,
    ) -> Effect<CoordinatorAction> {
        let tracks = Arc::clone(&self.tracks);
        let guard = self.guard.clone();
        Effect::future(async move {
            let result = guard
                .call("adjust_capacity", || tracks.adjust_capacity(adjustment.clone()))
                .await;
            Some(match direction {
                AdjustmentDirection::Decrement => {
                    CoordinatorAction::DebitApplied { intent_id, result }
                },
                AdjustmentDirection::Increment => {
                    CoordinatorAction::CreditApplied { intent_id, result }
                },
            })
        })
    }

    pub(crate) fn void_debit(
        &self,
        intent_id: IntentId,
        track_id: TrackId,
        token: AdjustmentToken,
    ) -> Effect<CoordinatorAction> {
        let tracks = Arc::clone(&self.tracks);
        let guard = self.guard.clone();
        Effect::future(async move {
            let result = guard
                .call("void_adjustment", || tracks.void_adjustment(track_id, token.clone()))
                .await;
            Some(CoordinatorAction::DebitVoided { intent_id, result })
        })
    }

    pub(crate) fn set_lifecycle(
        &self,
        intent_id: IntentId,
        participant_id: ParticipantId,
        lifecycle: Lifecycle,
    ) -> Effect<CoordinatorAction> {
        let participants = Arc::clone(&self.participants);
        let guard = self.guard.clone();
        Effect::future(async move {
            let result = guard
                .call("set_lifecycle", || participants.set_lifecycle(participant_id, lifecycle))
                .await;
            Some(match lifecycle {
                Lifecycle::Released => CoordinatorAction::ParticipantReleased { intent_id, result },
                Lifecycle::Active | Lifecycle::Pending => {
                    CoordinatorAction::ParticipantActivated { intent_id, result }
                },
            })
        })
    }

    pub(crate) fn remove_participant(
        &self,
        intent_id: IntentId,
        participant_id: ParticipantId,
    ) -> Effect<CoordinatorAction> {
        let participants = Arc::clone(&self.participants);
        let guard = self.guard.clone();
        Effect::future(async move {
            let result = guard
                .call("delete_participant", || participants.delete_participant(participant_id))
                .await;
            Some(CoordinatorAction::ParticipantRemoved { intent_id, result })
        })
    }

    pub(crate) fn load_participant(
        &self,
        intent_id: IntentId,
        participant_id: ParticipantId,
    ) -> Effect<CoordinatorAction> {
        let participants = Arc::clone(&self.participants);
        let guard = self.guard.clone();
        Effect::future(async move {
            let result = guard
                .call("get_participant", || participants.get_participant(participant_id))
                .await;
            Some(CoordinatorAction::ParticipantLoaded { intent_id, result })
        })
    }

    /// Write `record` and end the request as `Degraded`.
    ///
    /// If the record itself cannot be written its full content is logged at
    /// error level and the notice carries no record id.
    pub(crate) fn record_reconciliation(
        &self,
        intent_id: IntentId,
        record: ReconciliationRecord,
    ) -> Effect<CoordinatorAction> {
        let log = Arc::clone(&self.reconciliations);
        let guard = self.guard.clone();
        Effect::future(async move {
            let mut notice = DegradedNotice {
                participant_id: record.participant_id,
                track_id: record.track_id,
                kind: record.kind,
                reconciliation_id: None,
                reason: record.reason.clone(),
            };

            match guard.call("record_reconciliation", || log.record(record.clone())).await {
                Ok(id) => {
                    EnrollmentMetrics::record_reconciliation(record.kind.as_str());
                    tracing::warn!(
                        %intent_id,
                        reconciliation_id = %id,
                        kind = record.kind.as_str(),
                        participant_id = %record.participant_id,
                        track_id = %record.track_id,
                        reason = %record.reason,
                        "Reconciliation record written"
                    );
                    notice.reconciliation_id = Some(id);
                },
                Err(err) => {
                    tracing::error!(
                        %intent_id,
                        error = %err,
                        kind = record.kind.as_str(),
                        participant_id = %record.participant_id,
                        track_id = %record.track_id,
                        delta = record.delta,
                        token = %record.token,
                        reason = %record.reason,
                        "Reconciliation record could not be written"
                    );
                },
            }

            Some(CoordinatorAction::Degraded { intent_id, notice })
        })
    }
}

/// Effect that immediately yields `action`.
pub(crate) fn emit(action: CoordinatorAction) -> Effect<CoordinatorAction> {
    Effect::future(async move { Some(action) })
}
