//! `PostgreSQL` stores for the enrollment registries.
//!
//! - [`PostgresTrackStore`]: tracks plus the capacity adjustment ledger. The
//!   floor check, the counter write and the token row commit in one
//!   transaction that holds the track's row lock.
//! - [`PostgresParticipantStore`]: participant records, `Released` tombstones included.
//! - [`PostgresReconciliationLog`]: durable reconciliation records.
//!
//! Queries are built at runtime (`sqlx::query` + `bind`), so the crate builds
//! without a live database.
//!
//! # Example
//!
//! ```no_run
//! use enrollment_postgres::{PostgresTrackStore, connect, migrate};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = connect("postgres://localhost/enrollment", 10).await?;
//! migrate(&pool).await?;
//! let tracks = PostgresTrackStore::new(pool);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod participants;
mod reconciliations;
mod tracks;

pub use participants::PostgresParticipantStore;
pub use reconciliations::PostgresReconciliationLog;
pub use tracks::PostgresTrackStore;

use enrollment_core::error::StorageError;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;

/// Open a connection pool.
///
/// # Errors
///
/// Returns [`StorageError::Unavailable`] if the database cannot be reached.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, StorageError> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
        .map_err(|e| StorageError::Unavailable(format!("Failed to connect to database: {e}")))
}

/// Apply the schema migrations shipped with this crate.
///
/// # Errors
///
/// Returns [`StorageError::Unavailable`] if a migration fails.
pub async fn migrate(pool: &PgPool) -> Result<(), StorageError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| StorageError::Unavailable(format!("Migration failed: {e}")))?;
    tracing::info!("Database migrations applied");
    Ok(())
}

/// Classify a driver error.
///
/// Constraint violations (SQLSTATE class 23) are the caller's fault; every
/// other failure is treated as the database being unavailable.
pub(crate) fn storage_error(err: sqlx::Error) -> StorageError {
    match &err {
        sqlx::Error::Database(db) if db.code().is_some_and(|code| code.starts_with("23")) => {
            StorageError::Invalid(db.message().to_string())
        },
        _ => StorageError::Unavailable(err.to_string()),
    }
}

/// `u32` capacities are stored as `BIGINT`.
pub(crate) fn capacity_from_db(value: i64) -> Result<u32, StorageError> {
    u32::try_from(value)
        .map_err(|_| StorageError::Unavailable(format!("Stored capacity out of range: {value}")))
}
