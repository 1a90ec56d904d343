//! HTTP server for the track service.
//!
//! - Application state
//! - Track endpoints
//! - Health and metrics endpoints
//! - Router configuration

pub mod health;
pub mod routes;
pub mod state;
pub mod tracks;

pub use routes::build_router;
pub use state::AppState;
