//! Axum integration for the enrollment registries.
//!
//! Both services sit on top of this crate:
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │  track-registry / enrollment-registry    │  ← routes, JSON bodies
//! ├──────────────────────────────────────────┤
//! │  enrollment-web                          │  ← AppError, correlation ids,
//! │                                          │    health handlers
//! ├──────────────────────────────────────────┤
//! │  coordinator / stores                    │  ← business logic, I/O
//! └──────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, routing::get};
//! use enrollment_web::{correlation_id_layer, handlers::health_check};
//!
//! let app = Router::new()
//!     .route("/health", get(health_check))
//!     .layer(correlation_id_layer());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod shutdown;

pub use error::AppError;
pub use extractors::CorrelationId;
pub use middleware::{CORRELATION_ID_HEADER, correlation_id_layer};
pub use shutdown::shutdown_signal;

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
