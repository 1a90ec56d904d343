//! Participant Store over the `participants` table.

use crate::storage_error;
use enrollment_core::error::StorageError;
use enrollment_core::participant::{Lifecycle, Participant, ParticipantFilter, ParticipantId};
use enrollment_core::stores::{ParticipantStore, StoreFuture};
use enrollment_core::track::TrackId;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

/// `PostgreSQL` Participant Store.
#[derive(Clone, Debug)]
pub struct PostgresParticipantStore {
    pool: PgPool,
}

impl PostgresParticipantStore {
    /// Participant store over `pool`.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, id: ParticipantId) -> Result<Option<Participant>, StorageError> {
        let row = sqlx::query("SELECT id, name, track_id, lifecycle FROM participants WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        row.as_ref().map(participant_from_row).transpose()
    }
}

fn participant_from_row(row: &PgRow) -> Result<Participant, StorageError> {
    let lifecycle: String = row.get("lifecycle");
    Ok(Participant {
        id: ParticipantId::from_uuid(row.get("id")),
        name: row.get("name"),
        track_id: TrackId::from_uuid(row.get("track_id")),
        lifecycle: Lifecycle::parse(&lifecycle).ok_or_else(|| {
            StorageError::Unavailable(format!("Invalid stored lifecycle: {lifecycle}"))
        })?,
    })
}

impl ParticipantStore for PostgresParticipantStore {
    fn create_participant(&self, participant: Participant) -> StoreFuture<'_, Participant> {
        Box::pin(async move {
            let inserted = sqlx::query(
                r"
                INSERT INTO participants (id, name, track_id, lifecycle)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (id) DO NOTHING
                ",
            )
            .bind(participant.id.as_uuid())
            .bind(&participant.name)
            .bind(participant.track_id.as_uuid())
            .bind(participant.lifecycle.as_str())
            .execute(&self.pool)
            .await
            .map_err(storage_error)?
            .rows_affected();

            if inserted == 1 {
                return Ok(participant);
            }

            // A retried write whose first attempt landed
            let existing = self
                .fetch(participant.id)
                .await?
                .ok_or_else(|| StorageError::participant_not_found(participant.id))?;
            if existing.name == participant.name && existing.track_id == participant.track_id {
                Ok(existing)
            } else {
                Err(StorageError::Invalid(format!(
                    "participant {} already exists",
                    participant.id
                )))
            }
        })
    }

    fn get_participant(&self, id: ParticipantId) -> StoreFuture<'_, Participant> {
        Box::pin(async move {
            self.fetch(id)
                .await?
                .ok_or_else(|| StorageError::participant_not_found(id))
        })
    }

    fn set_lifecycle(
        &self,
        id: ParticipantId,
        lifecycle: Lifecycle,
    ) -> StoreFuture<'_, Participant> {
        Box::pin(async move {
            let row = sqlx::query(
                r"
                UPDATE participants
                SET lifecycle = $2, updated_at = now()
                WHERE id = $1
                RETURNING id, name, track_id, lifecycle
                ",
            )
            .bind(id.as_uuid())
            .bind(lifecycle.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?
            .ok_or_else(|| StorageError::participant_not_found(id))?;

            participant_from_row(&row)
        })
    }

    fn delete_participant(&self, id: ParticipantId) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM participants WHERE id = $1")
                .bind(id.as_uuid())
                .execute(&self.pool)
                .await
                .map_err(storage_error)?;
            Ok(result.rows_affected() > 0)
        })
    }

    fn find_participants(&self, filter: ParticipantFilter) -> StoreFuture<'_, Vec<Participant>> {
        Box::pin(async move {
            let rows = sqlx::query(
                r"
                SELECT id, name, track_id, lifecycle
                FROM participants
                WHERE lifecycle <> 'released'
                  AND ($1::TEXT IS NULL OR strpos(lower(name), lower($1)) > 0)
                  AND ($2::UUID IS NULL OR track_id = $2)
                ORDER BY name ASC, id ASC
                ",
            )
            .bind(filter.name.as_deref())
            .bind(filter.track_id.map(|id| *id.as_uuid()))
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;

            rows.iter().map(participant_from_row).collect()
        })
    }
}
