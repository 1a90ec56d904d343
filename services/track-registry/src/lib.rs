//! # Track Registry
//!
//! Owns tracks and their remaining capacity. Every change to a track's
//! capacity goes through one atomic, floor-checked adjustment keyed by an
//! idempotency token, so the enrollment coordinator can retry freely.
//!
//! ```text
//! POST   /tracks                                  create
//! GET    /tracks                                  list
//! GET    /tracks/search?name=&minCapacity=&maxCapacity=
//! GET    /tracks/:id                              get
//! GET    /tracks/:id/availability                 advisory capacity check
//! POST   /tracks/:id/adjust                       {delta, token}
//! POST   /tracks/:id/adjustments/:token/void      revert or bar a token
//! DELETE /tracks/:id
//! ```

pub mod config;
pub mod server;

pub use config::Config;
pub use server::{AppState, build_router};
