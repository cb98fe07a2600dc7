//! Presence read view.
//!
//! Pure derived view over the presence rows the lifecycle handlers keep;
//! no state of its own.

use crate::errors::RoomError;
use crate::repositories::{PresenceRepository, RoomsRepository, SessionsRepository};
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

/// Read-side presence queries.
pub struct PresenceService;

impl PresenceService {
    /// Current number of distinct joined viewers in a room.
    #[instrument(skip_all, fields(room_id = %room_id))]
    pub async fn current_viewer_count(pool: &PgPool, room_id: Uuid) -> Result<i64, RoomError> {
        PresenceRepository::viewer_count(pool, room_id).await
    }

    /// Viewer count for a session's living room.
    ///
    /// A session without a living room has zero viewers by definition.
    ///
    /// # Errors
    ///
    /// - `RoomError::NotFound` - unknown session
    #[instrument(skip_all, fields(session_id = %session_id))]
    pub async fn session_viewer_count(
        pool: &PgPool,
        session_id: Uuid,
    ) -> Result<i64, RoomError> {
        if SessionsRepository::find_by_id(pool, session_id).await?.is_none() {
            return Err(RoomError::NotFound("Session not found".to_string()));
        }

        match RoomsRepository::find_living_by_session(pool, session_id).await? {
            Some(room) => Self::current_viewer_count(pool, room.room_id).await,
            None => Ok(0),
        }
    }
}
