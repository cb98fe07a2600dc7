//! Room repository.
//!
//! Rooms are append-only: one row per hosting attempt, never deleted. The
//! lifecycle transitions are expressed as conditional UPDATEs whose WHERE
//! clause is the idempotency guard — a transition that does not match the
//! expected current state affects zero rows and the caller treats the event
//! as a duplicate.
//!
//! The partial unique index `rooms_one_living_per_session` is the backstop
//! for the core invariant: at most one living room per session at any
//! instant, regardless of how many instances process webhooks concurrently.

use crate::errors::RoomError;
use crate::models::RoomRow;
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

/// Parameters for persisting a freshly allocated room.
#[derive(Debug, Clone)]
pub struct NewRoom {
    pub session_id: Uuid,
    pub account_id: Uuid,
    pub account_email: String,
    pub provider_meeting_id: String,
    pub provider_host_url: String,
    pub provider_join_url: String,
}

/// Repository for room operations.
pub struct RoomsRepository;

impl RoomsRepository {
    /// Insert a new pending room for a session.
    #[instrument(skip_all, fields(session_id = %room.session_id, provider_meeting_id = %room.provider_meeting_id))]
    pub async fn insert_pending(pool: &PgPool, room: &NewRoom) -> Result<RoomRow, RoomError> {
        let row: RoomRow = sqlx::query_as(
            r#"
            INSERT INTO rooms (session_id, account_id, account_email,
                               provider_meeting_id, provider_host_url, provider_join_url)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING room_id, session_id, account_id, account_email,
                      provider_meeting_id, provider_host_url, provider_join_url,
                      status, started_at, ended_at, notified_at, created_at
            "#,
        )
        .bind(room.session_id)
        .bind(room.account_id)
        .bind(&room.account_email)
        .bind(&room.provider_meeting_id)
        .bind(&room.provider_host_url)
        .bind(&room.provider_join_url)
        .fetch_one(pool)
        .await?;

        Ok(row)
    }

    /// Find the currently living room for a session, if any.
    #[instrument(skip_all, fields(session_id = %session_id))]
    pub async fn find_living_by_session(
        pool: &PgPool,
        session_id: Uuid,
    ) -> Result<Option<RoomRow>, RoomError> {
        let row: Option<RoomRow> = sqlx::query_as(
            r#"
            SELECT room_id, session_id, account_id, account_email,
                   provider_meeting_id, provider_host_url, provider_join_url,
                   status, started_at, ended_at, notified_at, created_at
            FROM rooms
            WHERE session_id = $1
              AND status = 'living'
            "#,
        )
        .bind(session_id)
        .fetch_optional(pool)
        .await?;

        Ok(row)
    }

    /// Find the most recent room for a provider meeting id.
    ///
    /// A meeting id identifies one provider meeting, but defensive ordering
    /// keeps lookups deterministic should a provider ever recycle ids.
    #[instrument(skip_all, fields(provider_meeting_id = %provider_meeting_id))]
    pub async fn find_by_provider_meeting(
        pool: &PgPool,
        provider_meeting_id: &str,
    ) -> Result<Option<RoomRow>, RoomError> {
        let row: Option<RoomRow> = sqlx::query_as(
            r#"
            SELECT room_id, session_id, account_id, account_email,
                   provider_meeting_id, provider_host_url, provider_join_url,
                   status, started_at, ended_at, notified_at, created_at
            FROM rooms
            WHERE provider_meeting_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(provider_meeting_id)
        .fetch_optional(pool)
        .await?;

        Ok(row)
    }

    /// Guarded transition PENDING -> LIVING.
    ///
    /// Returns the updated row when this caller won the transition, `None`
    /// when the room was not pending (duplicate or out-of-order event).
    ///
    /// `notified_at` is stamped in the same statement, preserving any
    /// earlier stamp: after the update, `notified_at == started_at` holds
    /// exactly when no notification was ever sent for this room, which is
    /// what the caller uses to decide whether to fan out.
    #[instrument(skip_all, fields(room_id = %room_id))]
    pub async fn mark_living(pool: &PgPool, room_id: Uuid) -> Result<Option<RoomRow>, RoomError> {
        let row: Option<RoomRow> = sqlx::query_as(
            r#"
            UPDATE rooms
            SET status = 'living',
                started_at = NOW(),
                notified_at = COALESCE(notified_at, NOW())
            WHERE room_id = $1
              AND status = 'pending'
            RETURNING room_id, session_id, account_id, account_email,
                      provider_meeting_id, provider_host_url, provider_join_url,
                      status, started_at, ended_at, notified_at, created_at
            "#,
        )
        .bind(room_id)
        .fetch_optional(pool)
        .await?;

        Ok(row)
    }

    /// Guarded transition LIVING -> STOP.
    ///
    /// Returns the updated row when this caller won the transition, `None`
    /// when the room was not living. `ended_at` is therefore set exactly
    /// once per room no matter how often the terminal events are replayed.
    #[instrument(skip_all, fields(room_id = %room_id))]
    pub async fn mark_stopped(pool: &PgPool, room_id: Uuid) -> Result<Option<RoomRow>, RoomError> {
        let row: Option<RoomRow> = sqlx::query_as(
            r#"
            UPDATE rooms
            SET status = 'stop',
                ended_at = NOW()
            WHERE room_id = $1
              AND status = 'living'
            RETURNING room_id, session_id, account_id, account_email,
                      provider_meeting_id, provider_host_url, provider_join_url,
                      status, started_at, ended_at, notified_at, created_at
            "#,
        )
        .bind(room_id)
        .fetch_optional(pool)
        .await?;

        Ok(row)
    }

    /// Count rooms for a session (event-history size).
    #[instrument(skip_all, fields(session_id = %session_id))]
    pub async fn count_for_session(pool: &PgPool, session_id: Uuid) -> Result<i64, RoomError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM rooms WHERE session_id = $1")
                .bind(session_id)
                .fetch_one(pool)
                .await?;

        Ok(count)
    }
}
