//! Join/Access broker.
//!
//! Per-request decision of start-vs-join. Users who may start the session
//! (instructor, admins, instructor course-role) get the host URL, creating
//! a room when none is live. Everyone else is an attendee: roster
//! registration and access code are enforced, and the provider registrant
//! is created or refreshed idempotently.

use crate::errors::{DeniedReason, RoomError};
use crate::models::{RoomRow, SessionRoomStatus, SessionRow, UserRow};
use crate::redis::lock::AccountLockManager;
use crate::repositories::{AccountsRepository, PresenceRepository, RoomsRepository, SessionsRepository, UsersRepository};
use crate::services::account_pool::AccountPoolService;
use crate::services::provider::{HostCredentials, ProviderClient};
use crate::services::room_allocator::{AllocationPolicy, RoomAllocatorService};
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

/// Unit-role that conveys start permission.
const INSTRUCTOR_UNIT_ROLE: &str = "instructor";

/// Service deciding start-vs-join and producing the provider URL.
pub struct JoinBrokerService;

impl JoinBrokerService {
    /// Resolve a join request into the provider URL the caller should open.
    ///
    /// # Errors
    ///
    /// - `RoomError::NotFound` - unknown session, or not a live-hosted kind
    /// - `RoomError::PermissionDenied` - roster/role/url failures, with the
    ///   structured reason the client switches on
    /// - `RoomError::AccessCodeMismatch` - configured code not matched
    /// - `RoomError::NotStartedYet` - attendee before the host started
    /// - `RoomError::PoolExhausted` - start path found no free account
    /// - `RoomError::Provider` - provider call failed
    #[instrument(skip_all, fields(session_id = %session_id, user_id = %user.user_id))]
    pub async fn resolve_join(
        pool: &PgPool,
        locks: &dyn AccountLockManager,
        provider: &dyn ProviderClient,
        policy: &AllocationPolicy,
        user: &UserRow,
        session_id: Uuid,
        access_code: Option<&str>,
    ) -> Result<String, RoomError> {
        let Some(session) = SessionsRepository::find_by_id(pool, session_id).await? else {
            return Err(RoomError::NotFound("Session not found".to_string()));
        };

        if !session.is_live_hosted() {
            return Err(RoomError::NotFound(
                "Session is not a live-hosted session".to_string(),
            ));
        }

        if Self::can_start(pool, user, &session).await? {
            Self::resolve_start(pool, locks, provider, policy, user, &session).await
        } else {
            Self::resolve_attend(pool, provider, user, &session, access_code).await
        }
    }

    /// Whether the user may start (host) this session.
    async fn can_start(
        pool: &PgPool,
        user: &UserRow,
        session: &SessionRow,
    ) -> Result<bool, RoomError> {
        if user.user_id == session.instructor_user_id || user.is_admin() {
            return Ok(true);
        }

        UsersRepository::has_unit_role(pool, user.user_id, session.unit_id, INSTRUCTOR_UNIT_ROLE)
            .await
    }

    /// Host path: reuse the living room or allocate a new one.
    async fn resolve_start(
        pool: &PgPool,
        locks: &dyn AccountLockManager,
        provider: &dyn ProviderClient,
        policy: &AllocationPolicy,
        user: &UserRow,
        session: &SessionRow,
    ) -> Result<String, RoomError> {
        if let Some(room) = RoomsRepository::find_living_by_session(pool, session.session_id).await?
        {
            tracing::debug!(
                target: "room.services.broker",
                session_id = %session.session_id,
                room_id = %room.room_id,
                "Returning host URL of living room"
            );
            return Self::refresh_host_url(pool, provider, &room).await;
        }

        let acquired =
            AccountPoolService::acquire(pool, locks, provider, session.session_id).await?;
        let room =
            RoomAllocatorService::allocate(pool, provider, locks, policy, session, acquired)
                .await?;

        tracing::info!(
            target: "room.services.broker",
            session_id = %session.session_id,
            room_id = %room.room_id,
            user_id = %user.user_id,
            "Session start initiated"
        );

        if room.provider_host_url.is_empty() {
            return Err(RoomError::PermissionDenied(DeniedReason::JoinUrlNotFound));
        }

        Ok(room.provider_host_url)
    }

    /// Re-fetch the living meeting's host URL, falling back to the
    /// persisted one when the provider is unreachable.
    async fn refresh_host_url(
        pool: &PgPool,
        provider: &dyn ProviderClient,
        room: &RoomRow,
    ) -> Result<String, RoomError> {
        let url = match AccountsRepository::find_by_id(pool, room.account_id).await? {
            Some(account) => {
                let creds = HostCredentials::from_account(&account);
                match provider.get_meeting(&creds, &room.provider_meeting_id).await {
                    Ok(meeting) => meeting.start_url,
                    Err(e) => {
                        tracing::warn!(
                            target: "room.services.broker",
                            room_id = %room.room_id,
                            error = %e,
                            "Host URL refresh failed, using persisted URL"
                        );
                        room.provider_host_url.clone()
                    }
                }
            }
            None => {
                tracing::warn!(
                    target: "room.services.broker",
                    account_id = %room.account_id,
                    "Account missing for living room, using persisted URL"
                );
                room.provider_host_url.clone()
            }
        };

        if url.is_empty() {
            return Err(RoomError::PermissionDenied(DeniedReason::JoinUrlNotFound));
        }

        Ok(url)
    }

    /// Attendee path: roster registration, access code, then registrant.
    async fn resolve_attend(
        pool: &PgPool,
        provider: &dyn ProviderClient,
        user: &UserRow,
        session: &SessionRow,
        access_code: Option<&str>,
    ) -> Result<String, RoomError> {
        let registered =
            UsersRepository::has_active_registration(pool, session.session_id, user.user_id)
                .await?;
        if !registered {
            tracing::debug!(
                target: "room.services.broker",
                session_id = %session.session_id,
                user_id = %user.user_id,
                "Join refused: no active registration"
            );
            return Err(RoomError::PermissionDenied(
                DeniedReason::RegistrationRequired,
            ));
        }

        if let Some(configured) = session.access_code.as_deref() {
            match access_code {
                Some(supplied) if supplied == configured => {}
                _ => return Err(RoomError::AccessCodeMismatch),
            }
        }

        let Some(room) = RoomsRepository::find_living_by_session(pool, session.session_id).await?
        else {
            // A session that already ran and ended is no longer joinable;
            // otherwise the host simply has not started it yet.
            if session.room_status == SessionRoomStatus::Ended.as_str() {
                return Err(RoomError::PermissionDenied(DeniedReason::MeetingNotValid));
            }
            return Err(RoomError::NotStartedYet);
        };

        let Some(account) = AccountsRepository::find_by_id(pool, room.account_id).await? else {
            tracing::error!(
                target: "room.services.broker",
                account_id = %room.account_id,
                room_id = %room.room_id,
                "Living room references an unknown account"
            );
            return Err(RoomError::Internal);
        };

        let creds = HostCredentials::from_account(&account);
        let registrant = match provider
            .add_registrant(
                &creds,
                &room.provider_meeting_id,
                &user.email,
                &user.display_name,
            )
            .await
        {
            Ok(registrant) => registrant,
            // The room row says living but the provider no longer knows the
            // meeting - it is not joinable anymore.
            Err(RoomError::NotFound(_)) => {
                return Err(RoomError::PermissionDenied(DeniedReason::MeetingNotValid));
            }
            Err(e) => return Err(e),
        };

        // Re-registering is a refresh: the presence row drops back to
        // waiting rather than duplicating.
        PresenceRepository::upsert_waiting(
            pool,
            room.room_id,
            user.user_id,
            &user.email,
            Some(&registrant.registrant_id),
        )
        .await?;

        tracing::info!(
            target: "room.services.broker",
            session_id = %session.session_id,
            room_id = %room.room_id,
            user_id = %user.user_id,
            "Attendee join resolved"
        );

        let url = if registrant.join_url.is_empty() {
            room.provider_join_url.clone()
        } else {
            registrant.join_url
        };

        if url.is_empty() {
            return Err(RoomError::PermissionDenied(DeniedReason::JoinUrlNotFound));
        }

        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    // The broker's decisions need sessions, rosters, and rooms in a
    // database; the scenarios live in tests/join_tests.rs against the
    // server harness.
}
