//! Room allocator service.
//!
//! Turns a reserved account into a live hosting attempt: computes the
//! meeting window, asks the provider to create the meeting, and persists
//! the pending room. On provider failure the account reservation is rolled
//! back so the pool is not starved until the TTL.

use crate::errors::RoomError;
use crate::models::{RoomRow, SessionRow};
use crate::observability::metrics;
use crate::repositories::{NewRoom, RoomsRepository};
use crate::services::account_pool::AcquiredAccount;
use crate::services::provider::{
    CreateMeetingRequest, HostCredentials, MeetingSettings, ProviderClient,
};
use crate::redis::lock::AccountLockManager;
use sqlx::PgPool;
use tracing::instrument;

/// Allocation parameters derived from service configuration.
#[derive(Debug, Clone)]
pub struct AllocationPolicy {
    /// IANA timezone sent with meeting-creation requests.
    pub timezone: String,

    /// Fallback duration in minutes for degenerate session windows.
    pub default_meeting_minutes: i64,
}

/// Service for creating provider meetings and their room records.
pub struct RoomAllocatorService;

impl RoomAllocatorService {
    /// Allocate a room for a session on a reserved account.
    ///
    /// The account lock stays held on success - the `started` webhook
    /// releases it once the room is confirmed live. On provider failure the
    /// lock is released immediately and no room row is written; the session
    /// simply remains without a live room.
    ///
    /// # Errors
    ///
    /// - `RoomError::Provider` - meeting creation failed or timed out
    /// - `RoomError::Database` - room persist failed
    #[instrument(skip_all, fields(session_id = %session.session_id, account_id = %acquired.account.account_id))]
    pub async fn allocate(
        pool: &PgPool,
        provider: &dyn ProviderClient,
        locks: &dyn AccountLockManager,
        policy: &AllocationPolicy,
        session: &SessionRow,
        acquired: AcquiredAccount,
    ) -> Result<RoomRow, RoomError> {
        let duration = meeting_duration_minutes(session, policy.default_meeting_minutes);

        let request = CreateMeetingRequest {
            topic: session.name.clone(),
            start_time: session.begins_at,
            duration,
            timezone: policy.timezone.clone(),
            settings: MeetingSettings::product_policy(),
        };

        let creds = HostCredentials::from_account(&acquired.account);

        let meeting = match provider.create_meeting(&creds, &request).await {
            Ok(meeting) => meeting,
            Err(e) => {
                // Roll the reservation back right away instead of waiting
                // out the TTL. A timed-out create may still have succeeded
                // provider-side; the orphaned meeting has no room row and
                // its webhooks will be ledgered no-ops.
                if let Err(release_err) = locks
                    .release(acquired.account.account_id, &acquired.lock)
                    .await
                {
                    tracing::warn!(
                        target: "room.services.allocator",
                        account_id = %acquired.account.account_id,
                        error = %release_err,
                        "Failed to release account lock after provider failure"
                    );
                }
                return Err(e);
            }
        };

        let room = RoomsRepository::insert_pending(
            pool,
            &NewRoom {
                session_id: session.session_id,
                account_id: acquired.account.account_id,
                account_email: acquired.account.host_email.clone(),
                provider_meeting_id: meeting.id.clone(),
                provider_host_url: meeting.start_url.clone(),
                provider_join_url: meeting.join_url.clone(),
            },
        )
        .await?;

        metrics::record_allocation();

        tracing::info!(
            target: "room.services.allocator",
            session_id = %session.session_id,
            room_id = %room.room_id,
            provider_meeting_id = %meeting.id,
            account_id = %acquired.account.account_id,
            duration_minutes = duration,
            "Allocated pending room"
        );

        Ok(room)
    }
}

/// Meeting duration from the session window, with a fallback for windows
/// that are degenerate or non-positive.
fn meeting_duration_minutes(session: &SessionRow, default_minutes: i64) -> i64 {
    let minutes = (session.ends_at - session.begins_at).num_minutes();
    if minutes > 0 {
        minutes
    } else {
        default_minutes
    }
}
