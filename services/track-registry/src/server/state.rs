//! Application state for the track service.

use enrollment_core::stores::TrackStore;
use enrollment_runtime::metrics::MetricsRecorder;
use std::sync::Arc;

/// State shared by every handler. Cloned per request.
#[derive(Clone)]
pub struct AppState {
    /// Track store (`PostgreSQL` or in-memory)
    pub tracks: Arc<dyn TrackStore>,
    /// Prometheus recorder, if metrics are enabled
    pub metrics: Option<MetricsRecorder>,
    /// Name of the configured backend, reported by readiness
    pub backend: &'static str,
}

impl AppState {
    /// State over `tracks` with metrics disabled.
    #[must_use]
    pub fn new(tracks: Arc<dyn TrackStore>, backend: &'static str) -> Self {
        Self {
            tracks,
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
            .field("backend", &self.backend)
            .field("metrics", &self.metrics.is_some())
            .finish_non_exhaustive()
    }
}
