//! Coordinator wired to fault-injecting in-memory stores.

#![allow(dead_code, clippy::unwrap_used)]

use enrollment_coordinator::{CallGuard, Coordinator, CoordinatorEnvironment, Reconciler};
use enrollment_core::participant::Lifecycle;
use enrollment_core::stores::{CapacityQuery, ReadThroughCapacityQuery, TrackStore};
use enrollment_core::track::{Track, TrackId};
use enrollment_runtime::retry::RetryPolicy;
use enrollment_testing::helpers::init_tracing;
use enrollment_testing::{
    FaultyParticipantStore, FaultyReconciliationLog, FaultyTrackStore, InMemoryParticipantStore,
    InMemoryReconciliationLog, InMemoryTrackStore, test_clock,
};
use std::sync::Arc;
use std::time::Duration;

/// Retries allowed per store call in these tests.
pub const MAX_RETRIES: usize = 2;

pub struct Harness {
    pub tracks: Arc<FaultyTrackStore>,
    pub track_data: InMemoryTrackStore,
    pub participants: Arc<FaultyParticipantStore>,
    pub participant_data: InMemoryParticipantStore,
    pub log: Arc<FaultyReconciliationLog>,
    pub log_data: InMemoryReconciliationLog,
    pub coordinator: Coordinator,
    pub reconciler: Reconciler,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Harness whose advisory check is answered by `query` instead of the Track Store.
    pub fn with_capacity_query(query: Arc<dyn CapacityQuery>) -> Self {
        Self::build(Some(query))
    }

    fn build(query: Option<Arc<dyn CapacityQuery>>) -> Self {
        init_tracing();

        let track_data = InMemoryTrackStore::new();
        let participant_data = InMemoryParticipantStore::new();
        let log_data = InMemoryReconciliationLog::with_clock(Arc::new(test_clock()));

        let tracks = Arc::new(FaultyTrackStore::new(Arc::new(track_data.clone())));
        let participants = Arc::new(FaultyParticipantStore::new(Arc::new(participant_data.clone())));
        let log = Arc::new(FaultyReconciliationLog::new(Arc::new(log_data.clone())));

        let guard = CallGuard::new(
            RetryPolicy::builder()
                .max_retries(MAX_RETRIES)
                .initial_delay(Duration::from_millis(1))
                .max_delay(Duration::from_millis(4))
                .build(),
            Duration::from_millis(200),
        );

        let track_store: Arc<dyn TrackStore> = tracks.clone();
        let capacity =
            query.unwrap_or_else(|| Arc::new(ReadThroughCapacityQuery::new(Arc::clone(&track_store))));

        let coordinator = Coordinator::new(CoordinatorEnvironment {
            tracks: Arc::clone(&track_store),
            capacity,
            participants: participants.clone(),
            reconciliations: log.clone(),
            clock: Arc::new(test_clock()),
            guard: guard.clone(),
        });
        let reconciler = Reconciler::new(track_store, participants.clone(), log.clone(), guard);

        Self {
            tracks,
            track_data,
            participants,
            participant_data,
            log,
            log_data,
            coordinator,
            reconciler,
        }
    }

    pub async fn track(&self, name: &str, capacity: u32) -> TrackId {
        self.track_data
            .create_track(Track::new(name, capacity))
            .await
            .unwrap()
            .id
    }

    pub fn remaining(&self, track_id: TrackId) -> u32 {
        self.track_data.remaining(track_id).unwrap()
    }

    pub fn active(&self, track_id: TrackId) -> usize {
        self.participant_data.count(track_id, Lifecycle::Active)
    }

    pub fn pending(&self, track_id: TrackId) -> usize {
        self.participant_data.count(track_id, Lifecycle::Pending)
    }

    /// `remaining + active == total` for `track_id`.
    pub fn assert_invariant(&self, track_id: TrackId, total: u32) {
        let remaining = self.remaining(track_id);
        let active = self.active(track_id);
        assert_eq!(
            remaining as usize + active,
            total as usize,
            "track {track_id}: remaining {remaining} + active {active} != total {total}"
        );
    }
}
