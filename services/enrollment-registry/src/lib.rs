//! # Enrollment Registry
//!
//! Enrolls participants into tracks owned by the Track service, keeping every
//! track's remaining capacity equal to its total minus its active
//! participants. Requests run through the saga coordinator; anything it
//! cannot finish within its retry budget is left as a reconciliation record
//! and replayed by a background task.
//!
//! ```text
//!  client ──► enrollment-registry ──► Coordinator ──► TrackServiceClient ──► track-registry
//!                    │                     │
//!                    │                     └──► participants / reconciliations (PostgreSQL or memory)
//!                    └──► reconciler task (every RECONCILE_INTERVAL_SECS)
//! ```

pub mod client;
pub mod config;
pub mod reconcile_task;
pub mod server;

pub use client::{ClientError, TrackServiceClient};
pub use config::Config;
pub use server::{AppState, build_router};
