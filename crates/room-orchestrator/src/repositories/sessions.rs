//! Session repository.
//!
//! Sessions are owned by the course CRUD layer. This core reads them and
//! mutates exactly two fields: `room_status` and `recording_refs`.

use crate::errors::RoomError;
use crate::models::{RecordingRef, SessionRoomStatus, SessionRow};
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

/// Repository for session reads and room-related session mutations.
pub struct SessionsRepository;

impl SessionsRepository {
    /// Fetch a session by id.
    #[instrument(skip_all, fields(session_id = %session_id))]
    pub async fn find_by_id(
        pool: &PgPool,
        session_id: Uuid,
    ) -> Result<Option<SessionRow>, RoomError> {
        let row: Option<SessionRow> = sqlx::query_as(
            r#"
            SELECT session_id, unit_id, name, kind, instructor_user_id,
                   begins_at, ends_at, access_code, room_status, recording_refs
            FROM sessions
            WHERE session_id = $1
            "#,
        )
        .bind(session_id)
        .fetch_optional(pool)
        .await?;

        Ok(row)
    }

    /// Update the session's room status.
    #[instrument(skip_all, fields(session_id = %session_id, status = status.as_str()))]
    pub async fn set_room_status(
        pool: &PgPool,
        session_id: Uuid,
        status: SessionRoomStatus,
    ) -> Result<u64, RoomError> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET room_status = $2
            WHERE session_id = $1
            "#,
        )
        .bind(session_id)
        .bind(status.as_str())
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Append a recording reference to the session.
    ///
    /// Idempotent by recording id: the containment check makes a duplicate
    /// append affect zero rows. Returns whether the reference was appended.
    #[instrument(skip_all, fields(session_id = %session_id, recording_id = %recording.recording_id))]
    pub async fn append_recording(
        pool: &PgPool,
        session_id: Uuid,
        recording: &RecordingRef,
    ) -> Result<bool, RoomError> {
        let appended = serde_json::to_value(vec![recording]).map_err(|_| RoomError::Internal)?;
        let dedup_probe = serde_json::json!([{ "recording_id": recording.recording_id }]);

        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET recording_refs = recording_refs || $2
            WHERE session_id = $1
              AND NOT (recording_refs @> $3)
            "#,
        )
        .bind(session_id)
        .bind(appended)
        .bind(dedup_probe)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
