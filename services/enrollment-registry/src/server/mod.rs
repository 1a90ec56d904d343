//! HTTP server for the enrollment service.
//!
//! - Application state
//! - Participant and reconciliation endpoints
//! - Health and metrics endpoints
//! - Router configuration

pub mod errors;
pub mod health;
pub mod participants;
pub mod reconciliations;
pub mod routes;
pub mod state;

pub use routes::build_router;
pub use state::AppState;
