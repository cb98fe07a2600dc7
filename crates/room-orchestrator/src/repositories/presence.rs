//! Presence repository.
//!
//! One row per (room, user). The row's status always reflects the latest
//! observed fact: `waiting` after a join request or registrant refresh,
//! `joined`/`left` after the matching participant webhooks.

use crate::errors::RoomError;
use crate::models::RegistrantRow;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

/// Repository for per-room per-user presence bookkeeping.
pub struct PresenceRepository;

impl PresenceRepository {
    /// Create or refresh a registrant in the waiting state.
    ///
    /// Re-registering an existing (room, user) pair resets the status to
    /// `waiting` instead of creating a duplicate; an already-known provider
    /// registrant id is kept when the refresh carries none.
    #[instrument(skip_all, fields(room_id = %room_id, user_id = %user_id))]
    pub async fn upsert_waiting(
        pool: &PgPool,
        room_id: Uuid,
        user_id: Uuid,
        email: &str,
        provider_registrant_id: Option<&str>,
    ) -> Result<(), RoomError> {
        sqlx::query(
            r#"
            INSERT INTO room_registrants (room_id, user_id, email, provider_registrant_id, status)
            VALUES ($1, $2, $3, $4, 'waiting')
            ON CONFLICT (room_id, user_id) DO UPDATE
            SET status = 'waiting',
                provider_registrant_id =
                    COALESCE(EXCLUDED.provider_registrant_id, room_registrants.provider_registrant_id),
                updated_at = NOW()
            "#,
        )
        .bind(room_id)
        .bind(user_id)
        .bind(email)
        .bind(provider_registrant_id)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Record a participant join.
    #[instrument(skip_all, fields(room_id = %room_id, user_id = %user_id))]
    pub async fn mark_joined(
        pool: &PgPool,
        room_id: Uuid,
        user_id: Uuid,
        email: &str,
        at: DateTime<Utc>,
    ) -> Result<(), RoomError> {
        sqlx::query(
            r#"
            INSERT INTO room_registrants (room_id, user_id, email, status, joined_at)
            VALUES ($1, $2, $3, 'joined', $4)
            ON CONFLICT (room_id, user_id) DO UPDATE
            SET status = 'joined',
                joined_at = $4,
                updated_at = NOW()
            "#,
        )
        .bind(room_id)
        .bind(user_id)
        .bind(email)
        .bind(at)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Record a participant leave.
    #[instrument(skip_all, fields(room_id = %room_id, user_id = %user_id))]
    pub async fn mark_left(
        pool: &PgPool,
        room_id: Uuid,
        user_id: Uuid,
        email: &str,
        at: DateTime<Utc>,
    ) -> Result<(), RoomError> {
        sqlx::query(
            r#"
            INSERT INTO room_registrants (room_id, user_id, email, status, left_at)
            VALUES ($1, $2, $3, 'left', $4)
            ON CONFLICT (room_id, user_id) DO UPDATE
            SET status = 'left',
                left_at = $4,
                updated_at = NOW()
            "#,
        )
        .bind(room_id)
        .bind(user_id)
        .bind(email)
        .bind(at)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Current number of distinct users present in the room.
    ///
    /// Each user holds one row whose status is their latest join/leave
    /// fact, so counting `joined` rows is the joined-minus-left derivation
    /// and can never go negative.
    #[instrument(skip_all, fields(room_id = %room_id))]
    pub async fn viewer_count(pool: &PgPool, room_id: Uuid) -> Result<i64, RoomError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM room_registrants
            WHERE room_id = $1
              AND status = 'joined'
            "#,
        )
        .bind(room_id)
        .fetch_one(pool)
        .await?;

        Ok(count)
    }

    /// Fetch one presence row.
    #[instrument(skip_all, fields(room_id = %room_id, user_id = %user_id))]
    pub async fn find(
        pool: &PgPool,
        room_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<RegistrantRow>, RoomError> {
        let row: Option<RegistrantRow> = sqlx::query_as(
            r#"
            SELECT room_id, user_id, email, provider_registrant_id,
                   status, joined_at, left_at
            FROM room_registrants
            WHERE room_id = $1
              AND user_id = $2
            "#,
        )
        .bind(room_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        Ok(row)
    }

    /// Reconcile a presence row from the post-meeting participant report.
    ///
    /// The report is authoritative for join/leave times once the meeting
    /// ended; live webhook data is overwritten where the report disagrees.
    #[instrument(skip_all, fields(room_id = %room_id, user_id = %user_id))]
    pub async fn reconcile(
        pool: &PgPool,
        room_id: Uuid,
        user_id: Uuid,
        email: &str,
        joined_at: Option<DateTime<Utc>>,
        left_at: Option<DateTime<Utc>>,
    ) -> Result<(), RoomError> {
        sqlx::query(
            r#"
            INSERT INTO room_registrants (room_id, user_id, email, status, joined_at, left_at)
            VALUES ($1, $2, $3, 'left', $4, $5)
            ON CONFLICT (room_id, user_id) DO UPDATE
            SET status = 'left',
                joined_at = COALESCE($4, room_registrants.joined_at),
                left_at = COALESCE($5, room_registrants.left_at),
                updated_at = NOW()
            "#,
        )
        .bind(room_id)
        .bind(user_id)
        .bind(email)
        .bind(joined_at)
        .bind(left_at)
        .execute(pool)
        .await?;

        Ok(())
    }
}
