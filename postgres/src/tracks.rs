//! Track Store over `tracks` and `capacity_adjustments`.

use crate::{capacity_from_db, storage_error};
use enrollment_core::error::StorageError;
use enrollment_core::stores::{StoreFuture, TrackStore};
use enrollment_core::track::{
    AdjustOutcome, AdjustmentToken, CapacityAdjustment, Track, TrackFilter, TrackId, VoidOutcome,
};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};

const APPLIED: &str = "applied";
const VOIDED: &str = "voided";

/// `PostgreSQL` Track Store.
///
/// Adjustments to one track serialise on its row lock (`SELECT ... FOR
/// UPDATE`); the counter moves through a conditional
/// `UPDATE ... WHERE remaining_capacity + delta >= 0`, and the token row is
/// inserted in the same transaction.
#[derive(Clone, Debug)]
pub struct PostgresTrackStore {
    pool: PgPool,
}

/// A token's ledger row.
struct LedgerRow {
    track_id: TrackId,
    delta: i32,
    state: String,
}

impl PostgresTrackStore {
    /// Track store over `pool`.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Lock the track row for the rest of the transaction.
    async fn lock_track(
        tx: &mut Transaction<'_, Postgres>,
        id: TrackId,
    ) -> Result<u32, StorageError> {
        let remaining: Option<i64> = sqlx::query_scalar(
            "SELECT remaining_capacity FROM tracks WHERE id = $1 FOR UPDATE",
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(storage_error)?;

        remaining
            .map(capacity_from_db)
            .transpose()?
            .ok_or_else(|| StorageError::track_not_found(id))
    }

    async fn ledger_row(
        tx: &mut Transaction<'_, Postgres>,
        token: &AdjustmentToken,
    ) -> Result<Option<LedgerRow>, StorageError> {
        let row = sqlx::query(
            "SELECT track_id, delta, state FROM capacity_adjustments WHERE token = $1 FOR UPDATE",
        )
        .bind(token.as_str())
        .fetch_optional(&mut **tx)
        .await
        .map_err(storage_error)?;

        Ok(row.map(|row| LedgerRow {
            track_id: TrackId::from_uuid(row.get("track_id")),
            delta: row.get("delta"),
            state: row.get("state"),
        }))
    }

    /// Move the counter by `delta` unless that would take it below zero.
    async fn shift(
        tx: &mut Transaction<'_, Postgres>,
        id: TrackId,
        delta: i32,
    ) -> Result<u32, StorageError> {
        let remaining: Option<i64> = sqlx::query_scalar(
            r"
            UPDATE tracks
            SET remaining_capacity = remaining_capacity + $2
            WHERE id = $1 AND remaining_capacity + $2 >= 0
            RETURNING remaining_capacity
            ",
        )
        .bind(id.as_uuid())
        .bind(i64::from(delta))
        .fetch_optional(&mut **tx)
        .await
        .map_err(storage_error)?;

        remaining
            .map(capacity_from_db)
            .transpose()?
            .ok_or(StorageError::CapacityExhausted(id))
    }

    async fn adjust(&self, adjustment: CapacityAdjustment) -> Result<AdjustOutcome, StorageError> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;
        let current = Self::lock_track(&mut tx, adjustment.track_id).await?;

        match Self::ledger_row(&mut tx, &adjustment.token).await? {
            Some(row) if row.track_id != adjustment.track_id => {
                return Err(StorageError::TokenConflict {
                    token: adjustment.token,
                });
            },
            Some(row) if row.state == VOIDED => {
                return Err(StorageError::AdjustmentVoided(adjustment.token));
            },
            Some(row) if row.delta == adjustment.delta => {
                metrics::counter!("track_store.adjust.total", "result" => "replayed").increment(1);
                return Ok(AdjustOutcome {
                    remaining_capacity: current,
                    replayed: true,
                });
            },
            Some(_) => {
                return Err(StorageError::TokenConflict {
                    token: adjustment.token,
                });
            },
            None => {},
        }

        let remaining = match Self::shift(&mut tx, adjustment.track_id, adjustment.delta).await {
            Ok(remaining) => remaining,
            Err(err) => {
                metrics::counter!("track_store.adjust.total", "result" => "rejected").increment(1);
                return Err(err);
            },
        };

        sqlx::query(
            "INSERT INTO capacity_adjustments (token, track_id, delta, state) VALUES ($1, $2, $3, $4)",
        )
        .bind(adjustment.token.as_str())
        .bind(adjustment.track_id.as_uuid())
        .bind(adjustment.delta)
        .bind(APPLIED)
        .execute(&mut *tx)
        .await
        .map_err(|err| match storage_error(err) {
            // Raced with the same token on another track
            StorageError::Invalid(_) => StorageError::TokenConflict {
                token: adjustment.token.clone(),
            },
            other => other,
        })?;

        tx.commit().await.map_err(storage_error)?;

        metrics::counter!("track_store.adjust.total", "result" => "applied").increment(1);
        tracing::debug!(
            track_id = %adjustment.track_id,
            token = %adjustment.token,
            delta = adjustment.delta,
            remaining,
            "Capacity adjusted"
        );

        Ok(AdjustOutcome {
            remaining_capacity: remaining,
            replayed: false,
        })
    }

    async fn void(
        &self,
        track_id: TrackId,
        token: AdjustmentToken,
    ) -> Result<VoidOutcome, StorageError> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;
        let current = Self::lock_track(&mut tx, track_id).await?;

        let outcome = match Self::ledger_row(&mut tx, &token).await? {
            Some(row) if row.track_id != track_id => {
                return Err(StorageError::TokenConflict { token });
            },
            Some(row) if row.state == APPLIED => {
                let remaining = Self::shift(&mut tx, track_id, -row.delta).await?;
                sqlx::query("UPDATE capacity_adjustments SET state = $2 WHERE token = $1")
                    .bind(token.as_str())
                    .bind(VOIDED)
                    .execute(&mut *tx)
                    .await
                    .map_err(storage_error)?;
                VoidOutcome::Reverted {
                    remaining_capacity: remaining,
                }
            },
            Some(_) => VoidOutcome::Barred {
                remaining_capacity: current,
            },
            None => {
                sqlx::query(
                    "INSERT INTO capacity_adjustments (token, track_id, delta, state) VALUES ($1, $2, 0, $3)",
                )
                .bind(token.as_str())
                .bind(track_id.as_uuid())
                .bind(VOIDED)
                .execute(&mut *tx)
                .await
                .map_err(storage_error)?;
                VoidOutcome::Barred {
                    remaining_capacity: current,
                }
            },
        };

        tx.commit().await.map_err(storage_error)?;
        tracing::info!(%track_id, %token, ?outcome, "Adjustment voided");
        Ok(outcome)
    }
}

fn track_from_row(row: &PgRow) -> Result<Track, StorageError> {
    Ok(Track {
        id: TrackId::from_uuid(row.get("id")),
        name: row.get("name"),
        remaining_capacity: capacity_from_db(row.get("remaining_capacity"))?,
        total_capacity: capacity_from_db(row.get("total_capacity"))?,
    })
}

impl TrackStore for PostgresTrackStore {
    fn create_track(&self, track: Track) -> StoreFuture<'_, Track> {
        Box::pin(async move {
            sqlx::query(
                r"
                INSERT INTO tracks (id, name, remaining_capacity, total_capacity)
                VALUES ($1, $2, $3, $4)
                ",
            )
            .bind(track.id.as_uuid())
            .bind(&track.name)
            .bind(i64::from(track.remaining_capacity))
            .bind(i64::from(track.total_capacity))
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;

            tracing::info!(track_id = %track.id, name = %track.name, capacity = track.total_capacity, "Track created");
            Ok(track)
        })
    }

    fn get_track(&self, id: TrackId) -> StoreFuture<'_, Track> {
        Box::pin(async move {
            let row = sqlx::query(
                "SELECT id, name, remaining_capacity, total_capacity FROM tracks WHERE id = $1",
            )
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?
            .ok_or_else(|| StorageError::track_not_found(id))?;

            track_from_row(&row)
        })
    }

    fn list_tracks(&self, filter: TrackFilter) -> StoreFuture<'_, Vec<Track>> {
        Box::pin(async move {
            let rows = sqlx::query(
                r"
                SELECT id, name, remaining_capacity, total_capacity
                FROM tracks
                WHERE ($1::TEXT IS NULL OR strpos(lower(name), lower($1)) > 0)
                  AND ($2::BIGINT IS NULL OR remaining_capacity >= $2)
                  AND ($3::BIGINT IS NULL OR remaining_capacity <= $3)
                ORDER BY name ASC, id ASC
                ",
            )
            .bind(filter.name.as_deref())
            .bind(filter.min_capacity.map(i64::from))
            .bind(filter.max_capacity.map(i64::from))
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;

            rows.iter().map(track_from_row).collect()
        })
    }

    fn adjust_capacity(&self, adjustment: CapacityAdjustment) -> StoreFuture<'_, AdjustOutcome> {
        Box::pin(self.adjust(adjustment))
    }

    fn void_adjustment(
        &self,
        track_id: TrackId,
        token: AdjustmentToken,
    ) -> StoreFuture<'_, VoidOutcome> {
        Box::pin(self.void(track_id, token))
    }

    fn delete_track(&self, id: TrackId) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM tracks WHERE id = $1")
                .bind(id.as_uuid())
                .execute(&self.pool)
                .await
                .map_err(storage_error)?;

            if result.rows_affected() == 0 {
                return Err(StorageError::track_not_found(id));
            }
            tracing::info!(track_id = %id, "Track deleted");
            Ok(())
        })
    }
}
