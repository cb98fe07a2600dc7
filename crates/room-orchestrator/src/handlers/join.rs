//! Join and viewer-count handlers.
//!
//! - `GET /rooms/{session_id}/join` - resolve start-vs-join (authenticated)
//! - `GET /rooms/{session_id}/viewers` - current viewer count (authenticated)

use crate::errors::RoomError;
use crate::middleware::auth::CurrentUser;
use crate::models::{JoinQuery, JoinResponse, ViewerCountResponse};
use crate::routes::AppState;
use crate::services::{AllocationPolicy, JoinBrokerService, PresenceService};
use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Handler for GET /rooms/{session_id}/join
///
/// Resolves the caller's start-vs-join decision and returns the provider
/// URL to open.
///
/// # Response
///
/// - 200 OK: `{"success": true, "payload": "<provider url>"}`
/// - 401 Unauthorized: missing or unknown bearer token
/// - 403 Forbidden: structured reason code (registration, access code,
///   not-started, permission, URL resolution)
/// - 404 Not Found: unknown session or not a live-hosted session
/// - 422 Unprocessable Entity: malformed session id or access code
/// - 503 Service Unavailable: pool exhausted or provider failure
#[instrument(skip_all, fields(session_id = %session_id, user_id = %user.0.user_id))]
pub async fn join_session(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(session_id): Path<String>,
    Query(query): Query<JoinQuery>,
) -> Result<Json<JoinResponse>, RoomError> {
    let session_id = parse_session_id(&session_id)?;

    query
        .validate()
        .map_err(|e| RoomError::Validation(e.to_string()))?;

    let policy = AllocationPolicy {
        timezone: state.config.provider_timezone.clone(),
        default_meeting_minutes: state.config.default_meeting_minutes,
    };

    let url = JoinBrokerService::resolve_join(
        &state.pool,
        state.locks.as_ref(),
        state.provider.as_ref(),
        &policy,
        &user.0,
        session_id,
        query.access_code.as_deref(),
    )
    .await?;

    Ok(Json(JoinResponse {
        success: true,
        payload: url,
    }))
}

/// Handler for GET /rooms/{session_id}/viewers
///
/// Current number of distinct joined viewers in the session's living room;
/// zero when no room is live.
#[instrument(skip_all, fields(session_id = %session_id))]
pub async fn viewer_count(
    State(state): State<Arc<AppState>>,
    Extension(_user): Extension<CurrentUser>,
    Path(session_id): Path<String>,
) -> Result<Json<ViewerCountResponse>, RoomError> {
    let session_id = parse_session_id(&session_id)?;

    let count = PresenceService::session_viewer_count(&state.pool, session_id).await?;

    Ok(Json(ViewerCountResponse {
        success: true,
        payload: count,
    }))
}

/// Parse the session id path segment.
fn parse_session_id(raw: &str) -> Result<Uuid, RoomError> {
    Uuid::parse_str(raw)
        .map_err(|_| RoomError::Validation("session id must be a valid identifier".to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_session_id_accepts_uuid() {
        let id = Uuid::new_v4();
        assert_eq!(parse_session_id(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn test_parse_session_id_rejects_garbage() {
        let result = parse_session_id("not-a-uuid");
        assert!(matches!(result, Err(RoomError::Validation(_))));
    }
}
