//! Prometheus metrics for the enrollment services.
//!
//! Metric names use the `metrics` facade; the Prometheus recorder is installed
//! once per process and rendered by the HTTP layer at `GET /metrics`.
//!
//! # Example
//!
//! ```rust,no_run
//! use enrollment_runtime::metrics::MetricsRecorder;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut recorder = MetricsRecorder::new();
//! recorder.install()?;
//! let body = recorder.render().unwrap_or_default();
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use thiserror::Error;

pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Installs the Prometheus recorder and renders its output.
#[derive(Default, Clone)]
pub struct MetricsRecorder {
    handle: Option<PrometheusHandle>,
}

impl MetricsRecorder {
    /// Create a recorder that has not been installed yet.
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Describe every metric and install the global Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns an error if the exporter cannot be built or installed. A
    /// recorder that is already installed (common in tests) is not an error;
    /// this instance then has no handle to render from.
    pub fn install(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!("Prometheus metrics recorder installed");
                Ok(())
            },
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            },
        }
    }

    /// Render current metrics in Prometheus text format.
    ///
    /// Returns `None` if this instance did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn register_metrics() {
    describe_counter!("store.commands.total", "Actions processed by the coordinator store");
    describe_histogram!(
        "store.reducer.duration_seconds",
        "Time spent inside the coordinator reducer"
    );
    describe_counter!("store.effects.executed", "Effects executed, labelled by type");

    describe_counter!(
        "enrollment.enroll.outcome",
        "Enroll requests by outcome (enrolled, capacity_exhausted, not_found, unavailable, store_write_failed, degraded)"
    );
    describe_counter!(
        "enrollment.withdraw.outcome",
        "Withdraw requests by outcome (withdrawn, not_found, conflict, degraded)"
    );
    describe_counter!(
        "enrollment.reconciliation.recorded",
        "Reconciliation records written, labelled by kind"
    );
    describe_counter!(
        "enrollment.reconciliation.resolved",
        "Reconciliation records resolved by replay"
    );
    describe_gauge!(
        "enrollment.reconciliation.pending",
        "Reconciliation records awaiting replay"
    );

    describe_counter!("track.adjust.total", "Capacity adjustments by result");

    describe_counter!("retry.attempts.total", "Retry attempts, labelled by operation");
    describe_counter!("retry.successes.total", "Operations that succeeded after a retry");
    describe_counter!("retry.exhausted.total", "Operations that ran out of retries");
}

/// Coordinator outcome counters.
pub struct EnrollmentMetrics;

impl EnrollmentMetrics {
    /// Record the outcome of an Enroll request.
    pub fn record_enroll(outcome: &'static str) {
        counter!("enrollment.enroll.outcome", "outcome" => outcome).increment(1);
    }

    /// Record the outcome of a Withdraw request.
    pub fn record_withdraw(outcome: &'static str) {
        counter!("enrollment.withdraw.outcome", "outcome" => outcome).increment(1);
    }

    /// Record a reconciliation record being written.
    pub fn record_reconciliation(kind: &'static str) {
        counter!("enrollment.reconciliation.recorded", "kind" => kind).increment(1);
    }

    /// Record reconciliation records resolved by a replay pass.
    pub fn record_resolved(count: u64) {
        counter!("enrollment.reconciliation.resolved").increment(count);
    }

    /// Publish the number of pending reconciliation records.
    #[allow(clippy::cast_precision_loss)] // record counts stay far below 2^52
    pub fn set_pending(count: usize) {
        gauge!("enrollment.reconciliation.pending").set(count as f64);
    }
}

/// Track Registry counters.
pub struct TrackMetrics;

impl TrackMetrics {
    /// Record a capacity adjustment result (`applied`, `replayed`, `rejected`, ...).
    pub fn record_adjust(result: &'static str) {
        counter!("track.adjust.total", "result" => result).increment(1);
    }
}

/// Retry metrics recorder.
pub struct RetryMetrics;

impl RetryMetrics {
    /// Record a retry attempt.
    pub fn record_attempt(operation: &str) {
        counter!("retry.attempts.total", "operation" => operation.to_string()).increment(1);
    }

    /// Record a successful retry.
    pub fn record_success(operation: &str) {
        counter!("retry.successes.total", "operation" => operation.to_string()).increment(1);
    }

    /// Record exhausted retries.
    pub fn record_exhausted(operation: &str) {
        counter!("retry.exhausted.total", "operation" => operation.to_string()).increment(1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_recorder_starts_without_handle() {
        let recorder = MetricsRecorder::new();
        assert!(recorder.render().is_none());
    }

    #[test]
    fn test_install_and_render() {
        let mut recorder = MetricsRecorder::new();
        recorder.install().unwrap();

        EnrollmentMetrics::record_enroll("enrolled");
        TrackMetrics::record_adjust("applied");

        // Another test may have installed the global recorder first.
        if let Some(rendered) = recorder.render() {
            assert!(rendered.contains("enrollment_enroll_outcome"));
            assert!(rendered.contains("track_adjust_total"));
        }
    }
}
