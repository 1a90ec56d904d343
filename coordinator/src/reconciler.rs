//! Replay of pending reconciliation records.
//!
//! - `PendingCapacityAdjustment`: re-issue the adjustment with its recorded
//!   token. The token makes the replay a no-op if the first attempt landed.
//! - `OrphanedParticipant`: if the participant turns out `Active` or
//!   `Released`, its activation landed and the debit stands. Otherwise void the
//!   debit token (reverting or barring it), then delete the participant record.
//!
//! A record whose replay fails stays pending with its attempt count bumped.

use crate::guarded::CallGuard;
use enrollment_core::error::StorageError;
use enrollment_core::participant::Lifecycle;
use enrollment_core::reconciliation::{
    ReconciliationKind, ReconciliationRecord, ReconciliationStatus,
};
use enrollment_core::stores::{ParticipantStore, ReconciliationLog, TrackStore};
use enrollment_core::track::CapacityAdjustment;
use enrollment_runtime::metrics::EnrollmentMetrics;
use serde::Serialize;
use std::sync::Arc;

/// Default number of records replayed per pass.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Result of one replay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    /// Records replayed
    pub attempted: usize,
    /// Records resolved
    pub resolved: usize,
}

/// Replays pending reconciliation records against the stores.
#[derive(Clone)]
pub struct Reconciler {
    tracks: Arc<dyn TrackStore>,
    participants: Arc<dyn ParticipantStore>,
    log: Arc<dyn ReconciliationLog>,
    guard: CallGuard,
    batch_size: usize,
}

impl Reconciler {
    /// Reconciler over the given stores.
    #[must_use]
    pub fn new(
        tracks: Arc<dyn TrackStore>,
        participants: Arc<dyn ParticipantStore>,
        log: Arc<dyn ReconciliationLog>,
        guard: CallGuard,
    ) -> Self {
        Self {
            tracks,
            participants,
            log,
            guard,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Replay at most `batch_size` records per pass.
    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Number of records still pending.
    ///
    /// # Errors
    ///
    /// Returns the log's error if it cannot be read.
    pub async fn pending(&self) -> Result<usize, StorageError> {
        self.log.pending_count().await
    }

    /// Replay every pending record once, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error only if the log itself cannot be read. Failures of
    /// individual replays are recorded on the record and do not stop the pass.
    #[tracing::instrument(skip(self))]
    pub async fn run_once(&self) -> Result<ReconciliationReport, StorageError> {
        let pending = self
            .log
            .list(Some(ReconciliationStatus::Pending), self.batch_size)
            .await?;

        let mut report = ReconciliationReport::default();
        for record in pending {
            report.attempted += 1;
            match self.replay(&record).await {
                Ok(()) => match self.log.resolve(record.id).await {
                    Ok(()) => {
                        report.resolved += 1;
                        tracing::info!(
                            reconciliation_id = %record.id,
                            kind = record.kind.as_str(),
                            participant_id = %record.participant_id,
                            "Reconciliation record resolved"
                        );
                    },
                    Err(err) => {
                        tracing::warn!(reconciliation_id = %record.id, error = %err, "Replay succeeded but record could not be resolved");
                    },
                },
                Err(err) => {
                    tracing::warn!(
                        reconciliation_id = %record.id,
                        kind = record.kind.as_str(),
                        attempts = record.attempts + 1,
                        error = %err,
                        "Reconciliation replay failed"
                    );
                    if let Err(mark_err) = self.log.mark_attempt(record.id, err.to_string()).await {
                        tracing::warn!(reconciliation_id = %record.id, error = %mark_err, "Could not record replay attempt");
                    }
                },
            }
        }

        EnrollmentMetrics::record_resolved(report.resolved as u64);
        if let Ok(count) = self.log.pending_count().await {
            EnrollmentMetrics::set_pending(count);
        }

        Ok(report)
    }

    async fn replay(&self, record: &ReconciliationRecord) -> Result<(), StorageError> {
        match record.kind {
            ReconciliationKind::PendingCapacityAdjustment => {
                let adjustment = CapacityAdjustment {
                    track_id: record.track_id,
                    delta: record.delta,
                    token: record.token.clone(),
                };
                match self
                    .guard
                    .call("adjust_capacity", || self.tracks.adjust_capacity(adjustment.clone()))
                    .await
                {
                    Ok(_) => Ok(()),
                    // A deleted track has no capacity left to correct
                    Err(err) if err.is_not_found() => Ok(()),
                    Err(err) => Err(err),
                }
            },
            ReconciliationKind::OrphanedParticipant => {
                let lifecycle = match self
                    .guard
                    .call("get_participant", || {
                        self.participants.get_participant(record.participant_id)
                    })
                    .await
                {
                    Ok(participant) => Some(participant.lifecycle),
                    Err(err) if err.is_not_found() => None,
                    Err(err) => return Err(err),
                };

                if let Some(lifecycle @ (Lifecycle::Active | Lifecycle::Released)) = lifecycle {
                    // The activation landed after all: the debit pays for a real enrollment
                    tracing::info!(
                        reconciliation_id = %record.id,
                        participant_id = %record.participant_id,
                        ?lifecycle,
                        "Orphaned participant was enrolled, keeping its debit"
                    );
                    return Ok(());
                }

                match self
                    .guard
                    .call("void_adjustment", || {
                        self.tracks.void_adjustment(record.track_id, record.token.clone())
                    })
                    .await
                {
                    Ok(outcome) => {
                        tracing::debug!(reconciliation_id = %record.id, ?outcome, "Orphaned debit voided");
                    },
                    Err(err) if err.is_not_found() => {},
                    Err(err) => return Err(err),
                }

                self.guard
                    .call("delete_participant", || {
                        self.participants.delete_participant(record.participant_id)
                    })
                    .await
                    .map(|_| ())
            },
        }
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("guard", &self.guard)
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}
