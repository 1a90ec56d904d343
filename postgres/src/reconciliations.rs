//! Reconciliation log over the `reconciliations` table.
//!
//! Records are written when a degraded request leaves the two registries out
//! of step, listed oldest first by the reconciler and resolved once replayed.
//! Resolved records are kept for audit.

use crate::storage_error;
use enrollment_core::error::StorageError;
use enrollment_core::participant::ParticipantId;
use enrollment_core::reconciliation::{
    ReconciliationId, ReconciliationKind, ReconciliationRecord, ReconciliationStatus,
};
use enrollment_core::stores::{ReconciliationLog, StoreFuture};
use enrollment_core::track::{AdjustmentToken, TrackId};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

/// `PostgreSQL` reconciliation log.
///
/// # Example
///
/// ```no_run
/// use enrollment_core::stores::ReconciliationLog;
/// use enrollment_core::reconciliation::ReconciliationStatus;
/// use enrollment_postgres::PostgresReconciliationLog;
///
/// # async fn example(pool: sqlx::PgPool) -> Result<(), Box<dyn std::error::Error>> {
/// let log = PostgresReconciliationLog::new(pool);
/// let pending = log.list(Some(ReconciliationStatus::Pending), 100).await?;
/// println!("Pending reconciliations: {}", pending.len());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct PostgresReconciliationLog {
    pool: PgPool,
}

impl PostgresReconciliationLog {
    /// Reconciliation log over `pool`.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn record_from_row(row: &PgRow) -> Result<ReconciliationRecord, StorageError> {
        let kind: String = row.get("kind");
        let status: String = row.get("status");
        let token: String = row.get("token");
        let attempts: i32 = row.get("attempts");

        Ok(ReconciliationRecord {
            id: ReconciliationId::from_uuid(row.get("id")),
            participant_id: ParticipantId::from_uuid(row.get("participant_id")),
            track_id: TrackId::from_uuid(row.get("track_id")),
            delta: row.get("delta"),
            token: AdjustmentToken::new(token),
            kind: ReconciliationKind::parse(&kind)?,
            status: ReconciliationStatus::parse(&status)?,
            reason: row.get("reason"),
            attempts: u32::try_from(attempts).unwrap_or_default(),
            created_at: row.get("created_at"),
            resolved_at: row.get("resolved_at"),
        })
    }
}

impl ReconciliationLog for PostgresReconciliationLog {
    fn record(&self, record: ReconciliationRecord) -> StoreFuture<'_, ReconciliationId> {
        Box::pin(async move {
            // A retried write whose first attempt landed inserts nothing
            sqlx::query(
                r"
                INSERT INTO reconciliations (
                    id, participant_id, track_id, delta, token,
                    kind, status, reason, attempts, created_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                ON CONFLICT (id) DO NOTHING
                ",
            )
            .bind(record.id.as_uuid())
            .bind(record.participant_id.as_uuid())
            .bind(record.track_id.as_uuid())
            .bind(record.delta)
            .bind(record.token.as_str())
            .bind(record.kind.as_str())
            .bind(record.status.as_str())
            .bind(&record.reason)
            .bind(i32::try_from(record.attempts).unwrap_or(i32::MAX))
            .bind(record.created_at)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;

            metrics::counter!("reconciliation_log.written", "kind" => record.kind.as_str())
                .increment(1);
            tracing::warn!(
                reconciliation_id = %record.id,
                kind = record.kind.as_str(),
                participant_id = %record.participant_id,
                track_id = %record.track_id,
                reason = %record.reason,
                "Reconciliation record written"
            );

            Ok(record.id)
        })
    }

    fn list(
        &self,
        status: Option<ReconciliationStatus>,
        limit: usize,
    ) -> StoreFuture<'_, Vec<ReconciliationRecord>> {
        Box::pin(async move {
            let rows = sqlx::query(
                r"
                SELECT
                    id, participant_id, track_id, delta, token,
                    kind, status, reason, attempts, created_at, resolved_at
                FROM reconciliations
                WHERE ($1::TEXT IS NULL OR status = $1)
                ORDER BY created_at ASC, id ASC
                LIMIT $2
                ",
            )
            .bind(status.map(|s| s.as_str()))
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;

            rows.iter().map(Self::record_from_row).collect()
        })
    }

    fn mark_attempt(&self, id: ReconciliationId, reason: String) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let result = sqlx::query(
                r"
                UPDATE reconciliations
                SET attempts = attempts + 1, reason = $2
                WHERE id = $1
                ",
            )
            .bind(id.as_uuid())
            .bind(&reason)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;

            if result.rows_affected() == 0 {
                return Err(StorageError::NotFound {
                    entity: "reconciliation",
                    id: id.to_string(),
                });
            }
            Ok(())
        })
    }

    fn resolve(&self, id: ReconciliationId) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let result = sqlx::query(
                r"
                UPDATE reconciliations
                SET status = 'resolved', resolved_at = now()
                WHERE id = $1
                ",
            )
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;

            if result.rows_affected() == 0 {
                return Err(StorageError::NotFound {
                    entity: "reconciliation",
                    id: id.to_string(),
                });
            }

            tracing::info!(reconciliation_id = %id, "Reconciliation record resolved");
            Ok(())
        })
    }

    fn pending_count(&self) -> StoreFuture<'_, usize> {
        Box::pin(async move {
            let count: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM reconciliations WHERE status = 'pending'")
                    .fetch_one(&self.pool)
                    .await
                    .map_err(storage_error)?;

            Ok(usize::try_from(count).unwrap_or_default())
        })
    }
}
