//! In-memory store implementations
//!
//! Used by unit and integration tests, and by both service binaries when no
//! `DATABASE_URL` is configured:
//! - [`InMemoryTrackStore`]: one mutex per track plus a token ledger
//! - [`InMemoryParticipantStore`]: `HashMap`-backed participant records
//! - [`InMemoryReconciliationLog`]: append-only reconciliation records

use enrollment_core::environment::{Clock, SystemClock};
use enrollment_core::error::StorageError;
use enrollment_core::participant::{Lifecycle, Participant, ParticipantFilter, ParticipantId};
use enrollment_core::reconciliation::{
    ReconciliationId, ReconciliationRecord, ReconciliationStatus,
};
use enrollment_core::stores::{ParticipantStore, ReconciliationLog, StoreFuture, TrackStore};
use enrollment_core::track::{
    AdjustOutcome, AdjustmentToken, CapacityAdjustment, Track, TrackFilter, TrackId, VoidOutcome,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

// Every critical section below is plain data manipulation, so a poisoned lock
// still guards consistent data.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// State of a token in a track's ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LedgerEntry {
    Applied { delta: i32 },
    Voided,
}

#[derive(Debug)]
struct TrackEntry {
    track: Track,
    ledger: HashMap<AdjustmentToken, LedgerEntry>,
    deleted: bool,
}

/// In-memory Track Store.
///
/// The track map is write-locked only to insert or remove a track. Each track
/// sits behind its own mutex, which serialises the floor check, the counter
/// update and the token record for that track. Different tracks contend only
/// on the token index, taken after the track mutex when a token is first seen.
///
/// # Example
///
/// ```
/// use enrollment_testing::InMemoryTrackStore;
/// use enrollment_core::stores::TrackStore;
/// use enrollment_core::track::{CapacityAdjustment, AdjustmentToken, Track};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryTrackStore::new();
/// let track = store.create_track(Track::new("T1", 2)).await?;
///
/// let adjustment = CapacityAdjustment {
///     track_id: track.id,
///     delta: -1,
///     token: AdjustmentToken::new("p1:debit"),
/// };
/// let first = store.adjust_capacity(adjustment.clone()).await?;
/// let replay = store.adjust_capacity(adjustment).await?;
/// assert_eq!(first.remaining_capacity, 1);
/// assert!(replay.replayed);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryTrackStore {
    tracks: Arc<RwLock<HashMap<TrackId, Arc<Mutex<TrackEntry>>>>>,
    token_tracks: Arc<RwLock<HashMap<AdjustmentToken, TrackId>>>,
}

impl InMemoryTrackStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `tracks`.
    #[must_use]
    pub fn with_tracks(tracks: impl IntoIterator<Item = Track>) -> Self {
        let store = Self::new();
        {
            let mut map = write(&store.tracks);
            for track in tracks {
                map.insert(
                    track.id,
                    Arc::new(Mutex::new(TrackEntry {
                        track,
                        ledger: HashMap::new(),
                        deleted: false,
                    })),
                );
            }
        }
        store
    }

    /// Remaining capacity of a track, if it exists.
    #[must_use]
    pub fn remaining(&self, id: TrackId) -> Option<u32> {
        self.entry(id)
            .map(|entry| lock(&entry).track.remaining_capacity)
    }

    /// Tokens currently applied to a track.
    #[must_use]
    pub fn applied_tokens(&self, id: TrackId) -> Vec<AdjustmentToken> {
        self.entry(id).map_or_else(Vec::new, |entry| {
            let entry = lock(&entry);
            let mut tokens: Vec<_> = entry
                .ledger
                .iter()
                .filter(|(_, state)| matches!(state, LedgerEntry::Applied { .. }))
                .map(|(token, _)| token.clone())
                .collect();
            tokens.sort();
            tokens
        })
    }

    fn entry(&self, id: TrackId) -> Option<Arc<Mutex<TrackEntry>>> {
        read(&self.tracks).get(&id).map(Arc::clone)
    }

    fn live_entry(&self, id: TrackId) -> Result<Arc<Mutex<TrackEntry>>, StorageError> {
        self.entry(id).ok_or_else(|| StorageError::track_not_found(id))
    }

    /// Write-lock the token index, failing when `token` already belongs to
    /// another track. Callers hold the track mutex, so the check and the
    /// following insert are one step for that token.
    fn claim_token(
        &self,
        track_id: TrackId,
        token: &AdjustmentToken,
    ) -> Result<RwLockWriteGuard<'_, HashMap<AdjustmentToken, TrackId>>, StorageError> {
        let index = write(&self.token_tracks);
        if index.get(token).is_some_and(|owner| *owner != track_id) {
            return Err(StorageError::TokenConflict {
                token: token.clone(),
            });
        }
        Ok(index)
    }

    fn adjust_sync(&self, adjustment: &CapacityAdjustment) -> Result<AdjustOutcome, StorageError> {
        let entry = self.live_entry(adjustment.track_id)?;
        let mut entry = lock(&entry);
        if entry.deleted {
            return Err(StorageError::track_not_found(adjustment.track_id));
        }

        match entry.ledger.get(&adjustment.token) {
            Some(LedgerEntry::Applied { delta }) if *delta == adjustment.delta => {
                return Ok(AdjustOutcome {
                    remaining_capacity: entry.track.remaining_capacity,
                    replayed: true,
                });
            },
            Some(LedgerEntry::Applied { .. }) => {
                return Err(StorageError::TokenConflict {
                    token: adjustment.token.clone(),
                });
            },
            Some(LedgerEntry::Voided) => {
                return Err(StorageError::AdjustmentVoided(adjustment.token.clone()));
            },
            None => {},
        }

        let mut index = self.claim_token(adjustment.track_id, &adjustment.token)?;
        let next = entry
            .track
            .apply_delta(adjustment.delta)
            .ok_or(StorageError::CapacityExhausted(adjustment.track_id))?;

        entry.track.remaining_capacity = next;
        entry.ledger.insert(
            adjustment.token.clone(),
            LedgerEntry::Applied {
                delta: adjustment.delta,
            },
        );
        index.insert(adjustment.token.clone(), adjustment.track_id);

        Ok(AdjustOutcome {
            remaining_capacity: next,
            replayed: false,
        })
    }

    fn void_sync(
        &self,
        track_id: TrackId,
        token: &AdjustmentToken,
    ) -> Result<VoidOutcome, StorageError> {
        let entry = self.live_entry(track_id)?;
        let mut entry = lock(&entry);
        if entry.deleted {
            return Err(StorageError::track_not_found(track_id));
        }

        match entry.ledger.get(token).copied() {
            Some(LedgerEntry::Applied { delta }) => {
                let next = entry
                    .track
                    .apply_delta(-delta)
                    .ok_or(StorageError::CapacityExhausted(track_id))?;
                entry.track.remaining_capacity = next;
                entry.ledger.insert(token.clone(), LedgerEntry::Voided);
                Ok(VoidOutcome::Reverted {
                    remaining_capacity: next,
                })
            },
            Some(LedgerEntry::Voided) => Ok(VoidOutcome::Barred {
                remaining_capacity: entry.track.remaining_capacity,
            }),
            None => {
                let mut index = self.claim_token(track_id, token)?;
                entry.ledger.insert(token.clone(), LedgerEntry::Voided);
                index.insert(token.clone(), track_id);
                Ok(VoidOutcome::Barred {
                    remaining_capacity: entry.track.remaining_capacity,
                })
            },
        }
    }
}

impl TrackStore for InMemoryTrackStore {
    fn create_track(&self, track: Track) -> StoreFuture<'_, Track> {
        Box::pin(async move {
            let mut map = write(&self.tracks);
            if map.contains_key(&track.id) {
                return Err(StorageError::Invalid(format!(
                    "track {} already exists",
                    track.id
                )));
            }
            map.insert(
                track.id,
                Arc::new(Mutex::new(TrackEntry {
                    track: track.clone(),
                    ledger: HashMap::new(),
                    deleted: false,
                })),
            );
            Ok(track)
        })
    }

    fn get_track(&self, id: TrackId) -> StoreFuture<'_, Track> {
        Box::pin(async move {
            let entry = self.live_entry(id)?;
            let track = lock(&entry).track.clone();
            Ok(track)
        })
    }

    fn list_tracks(&self, filter: TrackFilter) -> StoreFuture<'_, Vec<Track>> {
        Box::pin(async move {
            let entries: Vec<_> = read(&self.tracks).values().map(Arc::clone).collect();
            let mut tracks: Vec<Track> = entries
                .iter()
                .map(|entry| lock(entry).track.clone())
                .filter(|track| filter.matches(track))
                .collect();
            tracks.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
            Ok(tracks)
        })
    }

    fn adjust_capacity(&self, adjustment: CapacityAdjustment) -> StoreFuture<'_, AdjustOutcome> {
        Box::pin(async move { self.adjust_sync(&adjustment) })
    }

    fn void_adjustment(
        &self,
        track_id: TrackId,
        token: AdjustmentToken,
    ) -> StoreFuture<'_, VoidOutcome> {
        Box::pin(async move { self.void_sync(track_id, &token) })
    }

    fn delete_track(&self, id: TrackId) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let removed = write(&self.tracks).remove(&id);
            let entry = removed.ok_or_else(|| StorageError::track_not_found(id))?;
            let mut entry = lock(&entry);
            entry.deleted = true;
            let tokens: Vec<_> = entry.ledger.keys().cloned().collect();
            drop(entry);

            let mut index = write(&self.token_tracks);
            for token in tokens {
                index.remove(&token);
            }
            Ok(())
        })
    }
}

/// In-memory Participant Store.
#[derive(Clone, Debug, Default)]
pub struct InMemoryParticipantStore {
    participants: Arc<RwLock<HashMap<ParticipantId, Participant>>>,
}

impl InMemoryParticipantStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored record, tombstones included.
    #[must_use]
    pub fn all(&self) -> Vec<Participant> {
        read(&self.participants).values().cloned().collect()
    }

    /// Number of records in `lifecycle` for `track_id`.
    #[must_use]
    pub fn count(&self, track_id: TrackId, lifecycle: Lifecycle) -> usize {
        read(&self.participants)
            .values()
            .filter(|p| p.track_id == track_id && p.lifecycle == lifecycle)
            .count()
    }

    /// Read a record without going through the trait.
    #[must_use]
    pub fn peek(&self, id: ParticipantId) -> Option<Participant> {
        read(&self.participants).get(&id).cloned()
    }
}

impl ParticipantStore for InMemoryParticipantStore {
    fn create_participant(&self, participant: Participant) -> StoreFuture<'_, Participant> {
        Box::pin(async move {
            let mut map = write(&self.participants);
            if let Some(existing) = map.get(&participant.id) {
                if existing.name == participant.name && existing.track_id == participant.track_id {
                    return Ok(existing.clone());
                }
                return Err(StorageError::Invalid(format!(
                    "participant {} already exists with different data",
                    participant.id
                )));
            }
            map.insert(participant.id, participant.clone());
            Ok(participant)
        })
    }

    fn get_participant(&self, id: ParticipantId) -> StoreFuture<'_, Participant> {
        Box::pin(async move {
            read(&self.participants)
                .get(&id)
                .cloned()
                .ok_or_else(|| StorageError::participant_not_found(id))
        })
    }

    fn set_lifecycle(
        &self,
        id: ParticipantId,
        lifecycle: Lifecycle,
    ) -> StoreFuture<'_, Participant> {
        Box::pin(async move {
            let mut map = write(&self.participants);
            let participant = map
                .get_mut(&id)
                .ok_or_else(|| StorageError::participant_not_found(id))?;
            participant.lifecycle = lifecycle;
            Ok(participant.clone())
        })
    }

    fn delete_participant(&self, id: ParticipantId) -> StoreFuture<'_, bool> {
        Box::pin(async move { Ok(write(&self.participants).remove(&id).is_some()) })
    }

    fn find_participants(&self, filter: ParticipantFilter) -> StoreFuture<'_, Vec<Participant>> {
        Box::pin(async move {
            let mut found: Vec<Participant> = read(&self.participants)
                .values()
                .filter(|p| filter.matches(p))
                .cloned()
                .collect();
            found.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
            Ok(found)
        })
    }
}

/// In-memory reconciliation log.
#[derive(Clone)]
pub struct InMemoryReconciliationLog {
    records: Arc<RwLock<Vec<ReconciliationRecord>>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryReconciliationLog {
    /// Create an empty log stamped with the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty log stamped with `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Arc::new(RwLock::new(Vec::new())),
            clock,
        }
    }

    /// Every record, oldest first.
    #[must_use]
    pub fn all(&self) -> Vec<ReconciliationRecord> {
        read(&self.records).clone()
    }

    fn update<F>(&self, id: ReconciliationId, f: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut ReconciliationRecord),
    {
        let mut records = write(&self.records);
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StorageError::NotFound {
                entity: "reconciliation",
                id: id.to_string(),
            })?;
        f(record);
        Ok(())
    }
}

impl Default for InMemoryReconciliationLog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryReconciliationLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryReconciliationLog")
            .field("records", &read(&self.records).len())
            .finish_non_exhaustive()
    }
}

impl ReconciliationLog for InMemoryReconciliationLog {
    fn record(&self, record: ReconciliationRecord) -> StoreFuture<'_, ReconciliationId> {
        Box::pin(async move {
            let id = record.id;
            write(&self.records).push(record);
            Ok(id)
        })
    }

    fn list(
        &self,
        status: Option<ReconciliationStatus>,
        limit: usize,
    ) -> StoreFuture<'_, Vec<ReconciliationRecord>> {
        Box::pin(async move {
            Ok(read(&self.records)
                .iter()
                .filter(|r| status.is_none_or(|s| r.status == s))
                .take(limit)
                .cloned()
                .collect())
        })
    }

    fn mark_attempt(&self, id: ReconciliationId, reason: String) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.update(id, |record| {
                record.attempts = record.attempts.saturating_add(1);
                record.reason = reason;
            })
        })
    }

    fn resolve(&self, id: ReconciliationId) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let now = self.clock.now();
            self.update(id, |record| {
                record.status = ReconciliationStatus::Resolved;
                record.resolved_at = Some(now);
            })
        })
    }

    fn pending_count(&self) -> StoreFuture<'_, usize> {
        Box::pin(async move {
            Ok(read(&self.records)
                .iter()
                .filter(|r| r.status == ReconciliationStatus::Pending)
                .count())
        })
    }
}
