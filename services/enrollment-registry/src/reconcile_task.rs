//! Background task replaying pending reconciliation records.
//!
//! Runs [`Reconciler::run_once`] on a fixed interval until a shutdown
//! signal arrives. A failed pass is logged and retried on the next tick.
//!
//! ```rust,ignore
//! let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
//! let handle = ReconcileTask::new(reconciler, Duration::from_secs(30), shutdown_rx).spawn();
//!
//! // Later
//! let _ = shutdown_tx.send(());
//! handle.await?;
//! ```

use enrollment_coordinator::Reconciler;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Periodic reconciliation pass.
pub struct ReconcileTask {
    reconciler: Reconciler,
    every: Duration,
    shutdown: broadcast::Receiver<()>,
}

impl ReconcileTask {
    /// Task running `reconciler` every `every` until `shutdown` fires.
    #[must_use]
    pub const fn new(
        reconciler: Reconciler,
        every: Duration,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            reconciler,
            every,
            shutdown,
        }
    }

    /// Spawn the loop on the current runtime.
    #[must_use]
    pub fn spawn(mut self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&mut self) {
        info!(interval = ?self.every, "Reconciler started");

        let mut ticker = tokio::time::interval(self.every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    info!("Reconciler received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    match self.reconciler.run_once().await {
                        Ok(report) if report.attempted == 0 => debug!("Nothing to reconcile"),
                        Ok(report) => info!(
                            attempted = report.attempted,
                            resolved = report.resolved,
                            "Reconciliation pass finished"
                        ),
                        Err(e) => warn!(error = %e, "Reconciliation pass failed, retrying next tick"),
                    }
                }
            }
        }

        info!("Reconciler stopped");
    }
}
