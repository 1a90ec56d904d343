//! Application state for the enrollment service.

use enrollment_coordinator::{Coordinator, CoordinatorEnvironment, Reconciler};
use enrollment_core::stores::{ParticipantStore, ReconciliationLog, TrackStore};
use enrollment_runtime::metrics::MetricsRecorder;
use std::sync::Arc;

/// State shared by every handler. Cloned per request.
#[derive(Clone)]
pub struct AppState {
    /// Enroll / Withdraw saga
    pub coordinator: Coordinator,
    /// Replays pending reconciliation records
    pub reconciler: Reconciler,
    /// Participant reads
    pub participants: Arc<dyn ParticipantStore>,
    /// Reconciliation record reads
    pub reconciliations: Arc<dyn ReconciliationLog>,
    /// Track Store, checked by readiness
    pub tracks: Arc<dyn TrackStore>,
    /// Prometheus recorder, if metrics are enabled
    pub metrics: Option<MetricsRecorder>,
    /// Name of the configured participant backend, reported by readiness
    pub backend: &'static str,
}

impl AppState {
    /// Build the coordinator and reconciler over one set of stores.
    ///
    /// Must be called inside a Tokio runtime.
    #[must_use]
    pub fn new(environment: CoordinatorEnvironment, backend: &'static str) -> Self {
        let reconciler = Reconciler::new(
            Arc::clone(&environment.tracks),
            Arc::clone(&environment.participants),
            Arc::clone(&environment.reconciliations),
            environment.guard.clone(),
        );
        Self {
            participants: Arc::clone(&environment.participants),
            reconciliations: Arc::clone(&environment.reconciliations),
            tracks: Arc::clone(&environment.tracks),
            coordinator: Coordinator::new(environment),
            reconciler,
            metrics: None,
            backend,
        }
    }

    /// Serve `recorder` at `GET /metrics`.
    #[must_use]
    pub fn with_metrics(mut self, recorder: MetricsRecorder) -> Self {
        self.metrics = Some(recorder);
        self
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("reconciler", &self.reconciler)
            .field("backend", &self.backend)
            .field("metrics", &self.metrics.is_some())
            .finish_non_exhaustive()
    }
}
