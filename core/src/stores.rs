//! Storage seams between the coordinator and the two registries.
//!
//! # Dyn Compatibility
//!
//! These traits use explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
//! so they can be held as `Arc<dyn TrackStore>` in the coordinator environment
//! and captured by the effects the reducer returns.

use crate::error::StorageError;
use crate::participant::{Lifecycle, Participant, ParticipantFilter, ParticipantId};
use crate::reconciliation::{ReconciliationId, ReconciliationRecord, ReconciliationStatus};
use crate::track::{
    AdjustOutcome, AdjustmentToken, Availability, CapacityAdjustment, Track, TrackFilter, TrackId,
    VoidOutcome,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed future returned by every store method.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StorageError>> + Send + 'a>>;

/// The Track Store: sole owner of each track's remaining capacity.
pub trait TrackStore: Send + Sync {
    /// Persist a new track.
    ///
    /// # Errors
    ///
    /// `Invalid` if a track with the same id exists, `Unavailable` on I/O failure.
    fn create_track(&self, track: Track) -> StoreFuture<'_, Track>;

    /// Read one track.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id.
    fn get_track(&self, id: TrackId) -> StoreFuture<'_, Track>;

    /// List tracks matching `filter`, ordered by name.
    ///
    /// # Errors
    ///
    /// `Unavailable` on I/O failure.
    fn list_tracks(&self, filter: TrackFilter) -> StoreFuture<'_, Vec<Track>>;

    /// Atomically apply a signed, token-guarded adjustment.
    ///
    /// The floor check (`remaining + delta >= 0`), the counter write and the
    /// token record happen indivisibly with respect to every other adjustment
    /// on the same track. Adjustments on different tracks do not contend.
    ///
    /// Re-submitting an applied token changes nothing and returns the current
    /// remaining capacity with `replayed = true`. A rejected adjustment does
    /// not record its token.
    ///
    /// # Errors
    ///
    /// - `NotFound`: unknown track
    /// - `CapacityExhausted`: the result would be negative
    /// - `TokenConflict`: token already used with another track or delta
    /// - `AdjustmentVoided`: token was voided
    fn adjust_capacity(&self, adjustment: CapacityAdjustment) -> StoreFuture<'_, AdjustOutcome>;

    /// Void a token: revert it if it was applied, bar it from ever applying if not.
    ///
    /// Voiding an already voided token returns `Barred` with the current capacity.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown track.
    fn void_adjustment(
        &self,
        track_id: TrackId,
        token: AdjustmentToken,
    ) -> StoreFuture<'_, VoidOutcome>;

    /// Delete a track and its token ledger.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id.
    fn delete_track(&self, id: TrackId) -> StoreFuture<'_, ()>;
}

/// Advisory availability check used before an enrollment.
///
/// The answer is a point-in-time snapshot, never a reservation.
pub trait CapacityQuery: Send + Sync {
    /// `available = remaining_capacity > 0` at read time.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown track, `Unavailable`/`Timeout` when the
    /// Track Store cannot be reached.
    fn check_available(&self, track_id: TrackId) -> StoreFuture<'_, Availability>;
}

/// [`CapacityQuery`] co-located with a [`TrackStore`].
#[derive(Clone)]
pub struct ReadThroughCapacityQuery {
    tracks: Arc<dyn TrackStore>,
}

impl ReadThroughCapacityQuery {
    /// Read availability straight from `tracks`.
    #[must_use]
    pub fn new(tracks: Arc<dyn TrackStore>) -> Self {
        Self { tracks }
    }
}

impl CapacityQuery for ReadThroughCapacityQuery {
    fn check_available(&self, track_id: TrackId) -> StoreFuture<'_, Availability> {
        Box::pin(async move {
            let track = self.tracks.get_track(track_id).await?;
            Ok(Availability {
                available: track.has_capacity(),
            })
        })
    }
}

/// The Participant Store owned by the Enrollment Registry.
pub trait ParticipantStore: Send + Sync {
    /// Persist a participant.
    ///
    /// Idempotent on the id: writing the same record again succeeds and
    /// returns the stored record.
    ///
    /// # Errors
    ///
    /// `Invalid` if the id is taken by a different record.
    fn create_participant(&self, participant: Participant) -> StoreFuture<'_, Participant>;

    /// Read one participant, including `Released` tombstones.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id.
    fn get_participant(&self, id: ParticipantId) -> StoreFuture<'_, Participant>;

    /// Overwrite the lifecycle state.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id.
    fn set_lifecycle(&self, id: ParticipantId, lifecycle: Lifecycle)
    -> StoreFuture<'_, Participant>;

    /// Hard-delete a record. Returns `false` if it did not exist.
    ///
    /// # Errors
    ///
    /// `Unavailable` on I/O failure.
    fn delete_participant(&self, id: ParticipantId) -> StoreFuture<'_, bool>;

    /// Participants matching `filter`, ordered by name. Tombstones are excluded.
    ///
    /// # Errors
    ///
    /// `Unavailable` on I/O failure.
    fn find_participants(&self, filter: ParticipantFilter) -> StoreFuture<'_, Vec<Participant>>;
}

/// Durable log of reconciliation records.
pub trait ReconciliationLog: Send + Sync {
    /// Append a record.
    ///
    /// # Errors
    ///
    /// `Unavailable` on I/O failure.
    fn record(&self, record: ReconciliationRecord) -> StoreFuture<'_, ReconciliationId>;

    /// Records with the given status (all when `None`), oldest first.
    ///
    /// # Errors
    ///
    /// `Unavailable` on I/O failure.
    fn list(
        &self,
        status: Option<ReconciliationStatus>,
        limit: usize,
    ) -> StoreFuture<'_, Vec<ReconciliationRecord>>;

    /// Count a failed replay attempt and store its reason.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id.
    fn mark_attempt(&self, id: ReconciliationId, reason: String) -> StoreFuture<'_, ()>;

    /// Mark a record resolved.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id.
    fn resolve(&self, id: ReconciliationId) -> StoreFuture<'_, ()>;

    /// Number of pending records.
    ///
    /// # Errors
    ///
    /// `Unavailable` on I/O failure.
    fn pending_count(&self) -> StoreFuture<'_, usize>;
}
