//! Room lifecycle state machine.
//!
//! Consumes inbound provider webhooks and advances room, session, and
//! account state. Delivery is at-least-once and unordered, and any server
//! instance may receive any event, so every transition is an idempotent
//! guard: a conditional UPDATE that matches the expected current state.
//! An event whose guard does not match is a no-op, not an error.
//!
//! Every envelope is appended to the webhook ledger *before* any guard
//! evaluation; a replay that the guard suppresses therefore still leaves an
//! audit trail. Ledger append failure is the only error that aborts
//! processing - everything after it is logged and swallowed, because a
//! non-2xx response would make the provider retry-storm a transition that
//! may already be partially applied.

use crate::errors::RoomError;
use crate::models::{
    AccountOnlineStatus, RecordingRef, RoomEvent, RoomRow, SessionRoomStatus, WebhookEnvelope,
};
use crate::observability::metrics;
use crate::redis::lock::AccountLockManager;
use crate::repositories::{
    AccountsRepository, PresenceRepository, RoomsRepository, SessionsRepository, UsersRepository,
    WebhookEventsRepository,
};
use crate::services::notifier::{NotificationSender, NoticeAudience, SessionStartedNotice};
use crate::services::provider::{HostCredentials, ProviderClient};
use chrono::Utc;
use sqlx::PgPool;
use std::collections::HashSet;
use tracing::instrument;

/// The webhook-driven room state machine.
pub struct LifecycleService;

impl LifecycleService {
    /// Ingest one raw webhook envelope.
    ///
    /// Appends to the ledger, then applies the guarded transition. Failures
    /// after the ledger append are logged and swallowed; the next correct
    /// webhook or an operator-triggered reconciliation restores consistency.
    ///
    /// # Errors
    ///
    /// Only a ledger append failure is returned - the provider must retry
    /// an event that was never recorded.
    #[instrument(skip_all, fields(event = %envelope.event, provider_meeting_id = %envelope.payload.object.id))]
    pub async fn ingest(
        pool: &PgPool,
        locks: &dyn AccountLockManager,
        provider: &dyn ProviderClient,
        notifier: &dyn NotificationSender,
        envelope: &WebhookEnvelope,
    ) -> Result<(), RoomError> {
        WebhookEventsRepository::append(pool, envelope).await?;
        metrics::record_webhook(&envelope.event);

        let event = RoomEvent::from_envelope(envelope);

        if let Err(e) = Self::apply(pool, locks, provider, notifier, &event).await {
            tracing::error!(
                target: "room.services.lifecycle",
                event = %envelope.event,
                provider_meeting_id = %envelope.payload.object.id,
                error = %e,
                "Webhook transition failed after ledger append"
            );
        }

        Ok(())
    }

    /// Apply one interpreted event through its guard.
    async fn apply(
        pool: &PgPool,
        locks: &dyn AccountLockManager,
        provider: &dyn ProviderClient,
        notifier: &dyn NotificationSender,
        event: &RoomEvent,
    ) -> Result<(), RoomError> {
        match event {
            RoomEvent::Started { meeting_id } => {
                Self::apply_started(pool, locks, notifier, meeting_id).await
            }
            RoomEvent::Ended { meeting_id } => Self::apply_ended(pool, provider, meeting_id).await,
            RoomEvent::RecordingCompleted {
                meeting_id,
                recording,
            } => Self::apply_recording_completed(pool, provider, meeting_id, recording).await,
            RoomEvent::ParticipantJoined {
                meeting_id,
                email,
                at,
            } => Self::apply_participant(pool, meeting_id, email.as_deref(), *at, true).await,
            RoomEvent::ParticipantLeft {
                meeting_id,
                email,
                at,
            } => Self::apply_participant(pool, meeting_id, email.as_deref(), *at, false).await,
            RoomEvent::Unknown { name } => {
                tracing::debug!(
                    target: "room.services.lifecycle",
                    event = %name,
                    "Ignoring event with no transition"
                );
                Ok(())
            }
        }
    }

    /// `started`: PENDING -> LIVING, plus account/session side effects and
    /// the one-time roster fanout.
    async fn apply_started(
        pool: &PgPool,
        locks: &dyn AccountLockManager,
        notifier: &dyn NotificationSender,
        meeting_id: &str,
    ) -> Result<(), RoomError> {
        let Some(room) = RoomsRepository::find_by_provider_meeting(pool, meeting_id).await? else {
            // A meeting this core never allocated (or whose allocation was
            // rolled back). Ledgered, otherwise ignored.
            tracing::debug!(
                target: "room.services.lifecycle",
                provider_meeting_id = %meeting_id,
                "started event for unknown meeting"
            );
            return Ok(());
        };

        let Some(updated) = RoomsRepository::mark_living(pool, room.room_id).await? else {
            metrics::record_suppressed("meeting.started");
            tracing::debug!(
                target: "room.services.lifecycle",
                room_id = %room.room_id,
                status = %room.status,
                "started event suppressed by guard"
            );
            return Ok(());
        };

        // The room is confirmed live: the pool lock has served its purpose.
        // This instance may not be the allocator, so the release is
        // unconditional rather than token-checked.
        if let Err(e) = locks.force_release(updated.account_id).await {
            tracing::warn!(
                target: "room.services.lifecycle",
                account_id = %updated.account_id,
                error = %e,
                "Failed to release account lock, TTL will reclaim it"
            );
        }

        AccountsRepository::set_online_status(pool, updated.account_id, AccountOnlineStatus::Online)
            .await?;
        SessionsRepository::set_room_status(pool, updated.session_id, SessionRoomStatus::Running)
            .await?;

        tracing::info!(
            target: "room.audit",
            room_id = %updated.room_id,
            session_id = %updated.session_id,
            account_id = %updated.account_id,
            provider_meeting_id = %meeting_id,
            "room started"
        );

        // mark_living stamps notified_at alongside started_at; equality
        // means this transition is the first one ever to notify, and an
        // operator resetting the room to pending cannot re-trigger it.
        let first_notification = updated.notified_at == updated.started_at;
        if first_notification {
            Self::fan_out_started(pool, notifier, &updated).await;
        }

        Ok(())
    }

    /// Send the session-started notices, one per recipient.
    ///
    /// The instructor gets the host variant; learners with an active
    /// registration get the attendee variant, with the instructor excluded
    /// from that batch. Delivery failures are per-recipient and do not stop
    /// the fanout.
    async fn fan_out_started(pool: &PgPool, notifier: &dyn NotificationSender, room: &RoomRow) {
        let session = match SessionsRepository::find_by_id(pool, room.session_id).await {
            Ok(Some(session)) => session,
            Ok(None) => {
                tracing::warn!(
                    target: "room.services.lifecycle",
                    session_id = %room.session_id,
                    "Session vanished before fanout"
                );
                return;
            }
            Err(e) => {
                tracing::warn!(
                    target: "room.services.lifecycle",
                    session_id = %room.session_id,
                    error = %e,
                    "Failed to load session for fanout"
                );
                return;
            }
        };

        let mut notified: HashSet<uuid::Uuid> = HashSet::new();
        let mut delivered = 0u64;

        // Host variant for the instructor
        match UsersRepository::find_by_id(pool, session.instructor_user_id).await {
            Ok(Some(instructor)) => {
                let notice = SessionStartedNotice {
                    session_id: session.session_id,
                    session_name: session.name.clone(),
                    recipient_user_id: instructor.user_id,
                    recipient_email: instructor.email.clone(),
                    audience: NoticeAudience::Host,
                };
                notified.insert(instructor.user_id);
                if Self::deliver(notifier, &notice).await {
                    delivered += 1;
                }
            }
            Ok(None) => {
                tracing::warn!(
                    target: "room.services.lifecycle",
                    user_id = %session.instructor_user_id,
                    "Instructor not found for fanout"
                );
            }
            Err(e) => {
                tracing::warn!(
                    target: "room.services.lifecycle",
                    error = %e,
                    "Failed to load instructor for fanout"
                );
            }
        }

        // Attendee variant for the roster, instructor excluded
        let roster = match UsersRepository::list_active_roster(pool, session.session_id).await {
            Ok(roster) => roster,
            Err(e) => {
                tracing::warn!(
                    target: "room.services.lifecycle",
                    session_id = %session.session_id,
                    error = %e,
                    "Failed to load roster for fanout"
                );
                return;
            }
        };

        for user in roster {
            if !notified.insert(user.user_id) {
                continue;
            }
            let notice = SessionStartedNotice {
                session_id: session.session_id,
                session_name: session.name.clone(),
                recipient_user_id: user.user_id,
                recipient_email: user.email.clone(),
                audience: NoticeAudience::Attendee,
            };
            if Self::deliver(notifier, &notice).await {
                delivered += 1;
            }
        }

        metrics::record_notifications(delivered);

        tracing::info!(
            target: "room.services.lifecycle",
            session_id = %session.session_id,
            recipients = notified.len(),
            delivered = delivered,
            "session started fanout complete"
        );
    }

    async fn deliver(notifier: &dyn NotificationSender, notice: &SessionStartedNotice) -> bool {
        match notifier.session_started(notice).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    target: "room.services.lifecycle",
                    recipient = %notice.recipient_user_id,
                    error = %e,
                    "Notification delivery failed"
                );
                false
            }
        }
    }

    /// `ended`: LIVING -> STOP, plus session/account side effects and the
    /// post-meeting presence reconciliation.
    async fn apply_ended(
        pool: &PgPool,
        provider: &dyn ProviderClient,
        meeting_id: &str,
    ) -> Result<(), RoomError> {
        let Some(room) = RoomsRepository::find_by_provider_meeting(pool, meeting_id).await? else {
            tracing::debug!(
                target: "room.services.lifecycle",
                provider_meeting_id = %meeting_id,
                "ended event for unknown meeting"
            );
            return Ok(());
        };

        Self::stop_room(pool, provider, &room, "meeting.ended").await
    }

    /// Shared LIVING -> STOP effect, used by `ended` and by a `completed`
    /// event arriving for a room that is still living.
    async fn stop_room(
        pool: &PgPool,
        provider: &dyn ProviderClient,
        room: &RoomRow,
        event_name: &str,
    ) -> Result<(), RoomError> {
        let Some(updated) = RoomsRepository::mark_stopped(pool, room.room_id).await? else {
            metrics::record_suppressed(event_name);
            tracing::debug!(
                target: "room.services.lifecycle",
                room_id = %room.room_id,
                status = %room.status,
                "stop transition suppressed by guard"
            );
            return Ok(());
        };

        SessionsRepository::set_room_status(pool, updated.session_id, SessionRoomStatus::Ended)
            .await?;
        AccountsRepository::set_online_status(
            pool,
            updated.account_id,
            AccountOnlineStatus::Offline,
        )
        .await?;

        tracing::info!(
            target: "room.audit",
            room_id = %updated.room_id,
            session_id = %updated.session_id,
            account_id = %updated.account_id,
            provider_meeting_id = %updated.provider_meeting_id,
            "room stopped"
        );

        Self::reconcile_presence(pool, provider, &updated).await;

        Ok(())
    }

    /// Reconcile presence rows from the provider's participant report.
    ///
    /// Best effort: the report endpoint may lag behind the ended event, and
    /// a missing report only means live webhook data stands as recorded.
    async fn reconcile_presence(pool: &PgPool, provider: &dyn ProviderClient, room: &RoomRow) {
        let account = match AccountsRepository::find_by_id(pool, room.account_id).await {
            Ok(Some(account)) => account,
            Ok(None) => {
                tracing::warn!(
                    target: "room.services.lifecycle",
                    account_id = %room.account_id,
                    "Account missing for report reconciliation"
                );
                return;
            }
            Err(e) => {
                tracing::warn!(
                    target: "room.services.lifecycle",
                    account_id = %room.account_id,
                    error = %e,
                    "Failed to load account for report reconciliation"
                );
                return;
            }
        };

        let creds = HostCredentials::from_account(&account);
        let report = match provider
            .participant_report(&creds, &room.provider_meeting_id)
            .await
        {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(
                    target: "room.services.lifecycle",
                    room_id = %room.room_id,
                    error = %e,
                    "Participant report unavailable, keeping live presence data"
                );
                return;
            }
        };

        for entry in report {
            let Some(email) = entry.email.as_deref() else {
                continue;
            };
            let user = match UsersRepository::find_by_email(pool, email).await {
                Ok(Some(user)) => user,
                // Dial-in participants and externals have no platform user.
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(
                        target: "room.services.lifecycle",
                        error = %e,
                        "User lookup failed during reconciliation"
                    );
                    continue;
                }
            };

            if let Err(e) = PresenceRepository::reconcile(
                pool,
                room.room_id,
                user.user_id,
                email,
                entry.join_time,
                entry.leave_time,
            )
            .await
            {
                tracing::warn!(
                    target: "room.services.lifecycle",
                    room_id = %room.room_id,
                    user_id = %user.user_id,
                    error = %e,
                    "Presence reconciliation failed for one participant"
                );
            }
        }
    }

    /// `completed`: always applied, idempotent by recording id. Some
    /// providers signal completion without a prior `ended`, so a still
    /// living room additionally gets the stop effect.
    async fn apply_recording_completed(
        pool: &PgPool,
        provider: &dyn ProviderClient,
        meeting_id: &str,
        recording: &RecordingRef,
    ) -> Result<(), RoomError> {
        let Some(room) = RoomsRepository::find_by_provider_meeting(pool, meeting_id).await? else {
            tracing::debug!(
                target: "room.services.lifecycle",
                provider_meeting_id = %meeting_id,
                "completed event for unknown meeting"
            );
            return Ok(());
        };

        let appended = SessionsRepository::append_recording(pool, room.session_id, recording).await?;
        if appended {
            tracing::info!(
                target: "room.audit",
                session_id = %room.session_id,
                recording_id = %recording.recording_id,
                "recording attached to session"
            );
        } else {
            metrics::record_suppressed("recording.completed");
            tracing::debug!(
                target: "room.services.lifecycle",
                recording_id = %recording.recording_id,
                "duplicate recording ignored"
            );
        }

        if room.is_living() {
            Self::stop_room(pool, provider, &room, "recording.completed").await?;
        }

        Ok(())
    }

    /// `participant_joined` / `participant_left`: presence upsert keyed by
    /// meeting id + participant email.
    async fn apply_participant(
        pool: &PgPool,
        meeting_id: &str,
        email: Option<&str>,
        at: Option<chrono::DateTime<Utc>>,
        joined: bool,
    ) -> Result<(), RoomError> {
        let Some(room) = RoomsRepository::find_by_provider_meeting(pool, meeting_id).await? else {
            tracing::debug!(
                target: "room.services.lifecycle",
                provider_meeting_id = %meeting_id,
                "participant event for unknown meeting"
            );
            return Ok(());
        };

        let Some(email) = email else {
            tracing::debug!(
                target: "room.services.lifecycle",
                room_id = %room.room_id,
                "participant event without email, skipping presence"
            );
            return Ok(());
        };

        let Some(user) = UsersRepository::find_by_email(pool, email).await? else {
            // Not resolvable to a platform user (dial-in, external guest).
            tracing::debug!(
                target: "room.services.lifecycle",
                room_id = %room.room_id,
                "participant email unknown to the platform"
            );
            return Ok(());
        };

        let at = at.unwrap_or_else(Utc::now);

        if joined {
            PresenceRepository::mark_joined(pool, room.room_id, user.user_id, email, at).await?;
        } else {
            PresenceRepository::mark_left(pool, room.room_id, user.user_id, email, at).await?;
        }

        Ok(())
    }
}
