//! Fault-injecting store wrappers.
//!
//! Each wrapper delegates to an inner store and consults a [`FaultPlan`]
//! before every call. A plan holds a queue of [`Fault`]s per operation; once
//! the queue is empty the call goes straight through.
//!
//! ```
//! use enrollment_testing::faults::{Fault, FaultyTrackStore, TrackOp};
//! use enrollment_testing::InMemoryTrackStore;
//! use std::sync::Arc;
//!
//! let store = FaultyTrackStore::new(Arc::new(InMemoryTrackStore::new()));
//! store.plan().inject(TrackOp::Adjust, Fault::Unavailable);
//! store.plan().inject(TrackOp::Adjust, Fault::ApplyThenTimeout);
//! ```

use enrollment_core::error::StorageError;
use enrollment_core::participant::{Lifecycle, Participant, ParticipantFilter, ParticipantId};
use enrollment_core::reconciliation::{
    ReconciliationId, ReconciliationRecord, ReconciliationStatus,
};
use enrollment_core::stores::{
    CapacityQuery, ParticipantStore, ReconciliationLog, StoreFuture, TrackStore,
};
use enrollment_core::track::{
    AdjustOutcome, AdjustmentToken, Availability, CapacityAdjustment, Track, TrackFilter, TrackId,
    VoidOutcome,
};
use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Timeout reported by [`Fault::ApplyThenTimeout`].
const REPORTED_TIMEOUT: Duration = Duration::from_millis(250);

/// One injected failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Fail without calling the inner store, with a transient error
    Unavailable,
    /// Fail without calling the inner store, with this error
    Fail(StorageError),
    /// Call the inner store, discard its result and report a timeout
    ApplyThenTimeout,
    /// Call the inner store, discard its result and report this error
    ApplyThenFail(StorageError),
    /// Sleep, then call the inner store
    Delay(Duration),
}

/// Per-operation fault queues plus call counters.
#[derive(Debug)]
pub struct FaultPlan<Op> {
    inner: Mutex<PlanState<Op>>,
}

#[derive(Debug)]
struct PlanState<Op> {
    queued: HashMap<Op, VecDeque<Fault>>,
    sticky: HashMap<Op, Fault>,
    calls: HashMap<Op, usize>,
}

impl<Op: Copy + Eq + Hash> Default for FaultPlan<Op> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(PlanState {
                queued: HashMap::new(),
                sticky: HashMap::new(),
                calls: HashMap::new(),
            }),
        }
    }
}

impl<Op: Copy + Eq + Hash> FaultPlan<Op> {
    fn state(&self) -> std::sync::MutexGuard<'_, PlanState<Op>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue `fault` for the next unfaulted call of `op`.
    pub fn inject(&self, op: Op, fault: Fault) {
        self.state().queued.entry(op).or_default().push_back(fault);
    }

    /// Queue `fault` for the next `times` calls of `op`.
    pub fn inject_times(&self, op: Op, fault: &Fault, times: usize) {
        let mut state = self.state();
        let queue = state.queued.entry(op).or_default();
        queue.extend(std::iter::repeat_n(fault.clone(), times));
    }

    /// Apply `fault` to every call of `op` until [`FaultPlan::heal`].
    pub fn always(&self, op: Op, fault: Fault) {
        self.state().sticky.insert(op, fault);
    }

    /// Drop every queued and permanent fault for `op`.
    pub fn heal(&self, op: Op) {
        let mut state = self.state();
        state.queued.remove(&op);
        state.sticky.remove(&op);
    }

    /// Number of calls made to `op` so far, faulted or not.
    #[must_use]
    pub fn calls(&self, op: Op) -> usize {
        self.state().calls.get(&op).copied().unwrap_or(0)
    }

    fn next(&self, op: Op) -> Option<Fault> {
        let mut state = self.state();
        *state.calls.entry(op).or_insert(0) += 1;
        if let Some(fault) = state.queued.get_mut(&op).and_then(VecDeque::pop_front) {
            return Some(fault);
        }
        state.sticky.get(&op).cloned()
    }
}

/// Run `call` under the next fault planned for `op`.
async fn faulted<Op, T, F>(plan: &FaultPlan<Op>, op: Op, call: F) -> Result<T, StorageError>
where
    Op: Copy + Eq + Hash + std::fmt::Debug,
    F: std::future::Future<Output = Result<T, StorageError>>,
{
    match plan.next(op) {
        None => call.await,
        Some(Fault::Unavailable) => Err(StorageError::Unavailable(format!(
            "injected fault on {op:?}"
        ))),
        Some(Fault::Fail(err)) => Err(err),
        Some(Fault::ApplyThenTimeout) => {
            let _ = call.await;
            Err(StorageError::Timeout(REPORTED_TIMEOUT))
        },
        Some(Fault::ApplyThenFail(err)) => {
            let _ = call.await;
            Err(err)
        },
        Some(Fault::Delay(delay)) => {
            tokio::time::sleep(delay).await;
            call.await
        },
    }
}

/// Track Store operations a fault can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackOp {
    /// `create_track`
    Create,
    /// `get_track`
    Get,
    /// `list_tracks`
    List,
    /// `adjust_capacity`
    Adjust,
    /// `void_adjustment`
    Void,
    /// `delete_track`
    Delete,
}

/// [`TrackStore`] wrapper that injects faults.
pub struct FaultyTrackStore {
    inner: Arc<dyn TrackStore>,
    plan: FaultPlan<TrackOp>,
}

impl FaultyTrackStore {
    /// Wrap `inner` with an empty plan.
    #[must_use]
    pub fn new(inner: Arc<dyn TrackStore>) -> Self {
        Self {
            inner,
            plan: FaultPlan::default(),
        }
    }

    /// The fault plan.
    #[must_use]
    pub const fn plan(&self) -> &FaultPlan<TrackOp> {
        &self.plan
    }
}

impl TrackStore for FaultyTrackStore {
    fn create_track(&self, track: Track) -> StoreFuture<'_, Track> {
        Box::pin(faulted(&self.plan, TrackOp::Create, self.inner.create_track(track)))
    }

    fn get_track(&self, id: TrackId) -> StoreFuture<'_, Track> {
        Box::pin(faulted(&self.plan, TrackOp::Get, self.inner.get_track(id)))
    }

    fn list_tracks(&self, filter: TrackFilter) -> StoreFuture<'_, Vec<Track>> {
        Box::pin(faulted(&self.plan, TrackOp::List, self.inner.list_tracks(filter)))
    }

    fn adjust_capacity(&self, adjustment: CapacityAdjustment) -> StoreFuture<'_, AdjustOutcome> {
        Box::pin(faulted(
            &self.plan,
            TrackOp::Adjust,
            self.inner.adjust_capacity(adjustment),
        ))
    }

    fn void_adjustment(
        &self,
        track_id: TrackId,
        token: AdjustmentToken,
    ) -> StoreFuture<'_, VoidOutcome> {
        Box::pin(faulted(
            &self.plan,
            TrackOp::Void,
            self.inner.void_adjustment(track_id, token),
        ))
    }

    fn delete_track(&self, id: TrackId) -> StoreFuture<'_, ()> {
        Box::pin(faulted(&self.plan, TrackOp::Delete, self.inner.delete_track(id)))
    }
}

/// Participant Store operations a fault can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParticipantOp {
    /// `create_participant`
    Create,
    /// `get_participant`
    Get,
    /// `set_lifecycle`
    SetLifecycle,
    /// `delete_participant`
    Delete,
    /// `find_participants`
    Find,
}

/// [`ParticipantStore`] wrapper that injects faults.
pub struct FaultyParticipantStore {
    inner: Arc<dyn ParticipantStore>,
    plan: FaultPlan<ParticipantOp>,
}

impl FaultyParticipantStore {
    /// Wrap `inner` with an empty plan.
    #[must_use]
    pub fn new(inner: Arc<dyn ParticipantStore>) -> Self {
        Self {
            inner,
            plan: FaultPlan::default(),
        }
    }

    /// The fault plan.
    #[must_use]
    pub const fn plan(&self) -> &FaultPlan<ParticipantOp> {
        &self.plan
    }
}

impl ParticipantStore for FaultyParticipantStore {
    fn create_participant(&self, participant: Participant) -> StoreFuture<'_, Participant> {
        Box::pin(faulted(
            &self.plan,
            ParticipantOp::Create,
            self.inner.create_participant(participant),
        ))
    }

    fn get_participant(&self, id: ParticipantId) -> StoreFuture<'_, Participant> {
        Box::pin(faulted(&self.plan, ParticipantOp::Get, self.inner.get_participant(id)))
    }

    fn set_lifecycle(
        &self,
        id: ParticipantId,
        lifecycle: Lifecycle,
    ) -> StoreFuture<'_, Participant> {
        Box::pin(faulted(
            &self.plan,
            ParticipantOp::SetLifecycle,
            self.inner.set_lifecycle(id, lifecycle),
        ))
    }

    fn delete_participant(&self, id: ParticipantId) -> StoreFuture<'_, bool> {
        Box::pin(faulted(
            &self.plan,
            ParticipantOp::Delete,
            self.inner.delete_participant(id),
        ))
    }

    fn find_participants(&self, filter: ParticipantFilter) -> StoreFuture<'_, Vec<Participant>> {
        Box::pin(faulted(
            &self.plan,
            ParticipantOp::Find,
            self.inner.find_participants(filter),
        ))
    }
}

/// Reconciliation log operations a fault can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogOp {
    /// `record`
    Record,
    /// `list`
    List,
    /// `mark_attempt`
    MarkAttempt,
    /// `resolve`
    Resolve,
}

/// [`ReconciliationLog`] wrapper that injects faults.
pub struct FaultyReconciliationLog {
    inner: Arc<dyn ReconciliationLog>,
    plan: FaultPlan<LogOp>,
}

impl FaultyReconciliationLog {
    /// Wrap `inner` with an empty plan.
    #[must_use]
    pub fn new(inner: Arc<dyn ReconciliationLog>) -> Self {
        Self {
            inner,
            plan: FaultPlan::default(),
        }
    }

    /// The fault plan.
    #[must_use]
    pub const fn plan(&self) -> &FaultPlan<LogOp> {
        &self.plan
    }
}

impl ReconciliationLog for FaultyReconciliationLog {
    fn record(&self, record: ReconciliationRecord) -> StoreFuture<'_, ReconciliationId> {
        Box::pin(faulted(&self.plan, LogOp::Record, self.inner.record(record)))
    }

    fn list(
        &self,
        status: Option<ReconciliationStatus>,
        limit: usize,
    ) -> StoreFuture<'_, Vec<ReconciliationRecord>> {
        Box::pin(faulted(&self.plan, LogOp::List, self.inner.list(status, limit)))
    }

    fn mark_attempt(&self, id: ReconciliationId, reason: String) -> StoreFuture<'_, ()> {
        Box::pin(faulted(
            &self.plan,
            LogOp::MarkAttempt,
            self.inner.mark_attempt(id, reason),
        ))
    }

    fn resolve(&self, id: ReconciliationId) -> StoreFuture<'_, ()> {
        Box::pin(faulted(&self.plan, LogOp::Resolve, self.inner.resolve(id)))
    }

    fn pending_count(&self) -> StoreFuture<'_, usize> {
        self.inner.pending_count()
    }
}

/// [`CapacityQuery`] that always gives the same answer, however stale.
#[derive(Debug, Clone, Copy)]
pub struct StaleCapacityQuery {
    available: bool,
}

impl StaleCapacityQuery {
    /// Always answer `available`.
    #[must_use]
    pub const fn answering(available: bool) -> Self {
        Self { available }
    }
}

impl CapacityQuery for StaleCapacityQuery {
    fn check_available(&self, _track_id: TrackId) -> StoreFuture<'_, Availability> {
        let available = self.available;
        Box::pin(async move { Ok(Availability { available }) })
    }
}
