//! Room orchestrator models.
//!
//! Row structs mirror the persisted collections; the status enums carry the
//! lifecycle vocabulary used by the state machine. Sessions, users, and
//! registrations are owned by the course CRUD layer — this core only reads
//! them, except for `sessions.room_status` and `sessions.recording_refs`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Required length of a session access code.
pub const ACCESS_CODE_LENGTH: usize = 6;

/// Session kind that is hosted live through the provider.
pub const LIVE_SESSION_KIND: &str = "webinar";

// ============================================================================
// Status enums
// ============================================================================

/// Lifecycle state of a room (one hosting attempt).
///
/// Monotonic per row: `Pending -> Living -> Stop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    /// Meeting created at the provider, `started` webhook not seen yet.
    Pending,

    /// Room is live.
    Living,

    /// Room has ended (terminal).
    Stop,
}

impl RoomStatus {
    /// Returns the string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomStatus::Pending => "pending",
            RoomStatus::Living => "living",
            RoomStatus::Stop => "stop",
        }
    }
}

/// Room status as reflected on the session record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionRoomStatus {
    /// No room has ever gone live for this session.
    New,

    /// A room is currently live.
    Running,

    /// The last live room has ended.
    Ended,
}

impl SessionRoomStatus {
    /// Returns the string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionRoomStatus::New => "new",
            SessionRoomStatus::Running => "running",
            SessionRoomStatus::Ended => "ended",
        }
    }
}

/// Whether a pooled host account currently hosts a live room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountOnlineStatus {
    Online,
    Offline,
}

impl AccountOnlineStatus {
    /// Returns the string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountOnlineStatus::Online => "online",
            AccountOnlineStatus::Offline => "offline",
        }
    }
}

/// Presence state of a registrant within a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    /// Registered with the provider, not seen in the meeting yet.
    Waiting,

    /// Currently in the meeting.
    Joined,

    /// Left the meeting.
    Left,
}

impl PresenceStatus {
    /// Returns the string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            PresenceStatus::Waiting => "waiting",
            PresenceStatus::Joined => "joined",
            PresenceStatus::Left => "left",
        }
    }
}

// ============================================================================
// Database rows
// ============================================================================

/// Session row (externally owned scheduled live class).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SessionRow {
    pub session_id: Uuid,
    pub unit_id: Uuid,
    pub name: String,
    pub kind: String,
    pub instructor_user_id: Uuid,
    pub begins_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub access_code: Option<String>,
    pub room_status: String,
    pub recording_refs: serde_json::Value,
}

impl SessionRow {
    /// Whether this session kind is hosted live through the provider.
    pub fn is_live_hosted(&self) -> bool {
        self.kind == LIVE_SESSION_KIND
    }
}

/// User row (externally owned).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub user_id: Uuid,
    pub email: String,
    pub display_name: String,
    pub kind: String,
}

impl UserRow {
    /// Whether this user carries a platform-wide admin role.
    pub fn is_admin(&self) -> bool {
        self.kind == "admin" || self.kind == "super_admin"
    }
}

/// Pooled host account row.
///
/// `client_secret` stays a plain column here; it is wrapped into a
/// `SecretString` at the provider-client boundary so Debug output of
/// anything holding credentials is redacted.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AccountRow {
    pub account_id: Uuid,
    pub label: String,
    pub client_id: String,
    pub client_secret: String,
    pub host_email: String,
    pub online_status: String,
    pub enabled: bool,
}

/// Room row — one hosting attempt of a session. Append-only.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RoomRow {
    pub room_id: Uuid,
    pub session_id: Uuid,
    pub account_id: Uuid,
    pub account_email: String,
    pub provider_meeting_id: String,
    pub provider_host_url: String,
    pub provider_join_url: String,
    pub status: String,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub notified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl RoomRow {
    /// Whether the room is currently live.
    pub fn is_living(&self) -> bool {
        self.status == RoomStatus::Living.as_str()
    }
}

/// Presence row for one user in one room.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RegistrantRow {
    pub room_id: Uuid,
    pub user_id: Uuid,
    pub email: String,
    pub provider_registrant_id: Option<String>,
    pub status: String,
    pub joined_at: Option<DateTime<Utc>>,
    pub left_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Webhook envelope
// ============================================================================

/// Raw provider webhook envelope.
///
/// Providers add fields over time, so unknown fields are tolerated here;
/// the raw payload is ledgered verbatim before any interpretation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEnvelope {
    /// Event name, e.g. `meeting.started`.
    pub event: String,

    /// Provider-side event timestamp (epoch milliseconds).
    pub event_ts: i64,

    /// Event payload.
    pub payload: WebhookPayload,
}

/// Payload of a provider webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    /// The object the event refers to.
    pub object: WebhookObject,
}

/// Object section of a provider webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookObject {
    /// Provider meeting id.
    pub id: String,

    /// Host account email, present on meeting-level events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_email: Option<String>,

    /// Participant section, present on participant-level events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant: Option<WebhookParticipant>,

    /// Recording id, present on recording-completed events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recording_id: Option<String>,

    /// Recording share URL, present on recording-completed events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share_url: Option<String>,
}

/// Participant section of a provider webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookParticipant {
    /// Participant email as registered with the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Display name the participant joined with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,

    /// Join timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_time: Option<DateTime<Utc>>,

    /// Leave timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leave_time: Option<DateTime<Utc>>,
}

/// Recording reference appended to a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingRef {
    /// Provider recording id (dedup key).
    pub recording_id: String,

    /// Share URL, when the provider included one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share_url: Option<String>,
}

/// Interpreted room event, parsed from a [`WebhookEnvelope`].
#[derive(Debug, Clone)]
pub enum RoomEvent {
    /// The meeting went live at the provider.
    Started { meeting_id: String },

    /// The meeting ended at the provider.
    Ended { meeting_id: String },

    /// A recording finished processing. May arrive without a prior `Ended`.
    RecordingCompleted {
        meeting_id: String,
        recording: RecordingRef,
    },

    /// A participant joined the meeting.
    ParticipantJoined {
        meeting_id: String,
        email: Option<String>,
        at: Option<DateTime<Utc>>,
    },

    /// A participant left the meeting.
    ParticipantLeft {
        meeting_id: String,
        email: Option<String>,
        at: Option<DateTime<Utc>>,
    },

    /// An event this core does not act on.
    Unknown { name: String },
}

impl RoomEvent {
    /// Interpret a raw envelope. Never fails: unrecognized names become
    /// [`RoomEvent::Unknown`] so the ledger still captures them.
    pub fn from_envelope(envelope: &WebhookEnvelope) -> Self {
        let object = &envelope.payload.object;
        let meeting_id = object.id.clone();

        match envelope.event.as_str() {
            "meeting.started" => RoomEvent::Started { meeting_id },
            "meeting.ended" => RoomEvent::Ended { meeting_id },
            "recording.completed" => {
                let recording_id = match &object.recording_id {
                    Some(id) => id.clone(),
                    // Some providers omit a dedicated recording id; the
                    // meeting id then identifies the (single) recording.
                    None => format!("rec-{meeting_id}"),
                };
                RoomEvent::RecordingCompleted {
                    meeting_id,
                    recording: RecordingRef {
                        recording_id,
                        share_url: object.share_url.clone(),
                    },
                }
            }
            "meeting.participant_joined" => RoomEvent::ParticipantJoined {
                meeting_id,
                email: object.participant.as_ref().and_then(|p| p.email.clone()),
                at: object.participant.as_ref().and_then(|p| p.join_time),
            },
            "meeting.participant_left" => RoomEvent::ParticipantLeft {
                meeting_id,
                email: object.participant.as_ref().and_then(|p| p.email.clone()),
                at: object.participant.as_ref().and_then(|p| p.leave_time),
            },
            other => RoomEvent::Unknown {
                name: other.to_string(),
            },
        }
    }
}

// ============================================================================
// API request/response types
// ============================================================================

/// Query parameters of the join endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct JoinQuery {
    /// Session access code, required for attendees when configured.
    #[serde(rename = "accessCode")]
    pub access_code: Option<String>,
}

impl JoinQuery {
    /// Validate the access code shape.
    ///
    /// # Errors
    ///
    /// Returns an error message if a code is supplied with the wrong length.
    pub fn validate(&self) -> Result<(), &'static str> {
        if let Some(code) = &self.access_code {
            if code.len() != ACCESS_CODE_LENGTH {
                return Err("access code must be exactly 6 characters");
            }
        }
        Ok(())
    }
}

/// Success envelope of the join endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinResponse {
    pub success: bool,

    /// The provider URL the caller should open.
    pub payload: String,
}

/// Success envelope of the viewer-count endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewerCountResponse {
    pub success: bool,

    /// Current number of distinct joined viewers.
    pub payload: i64,
}

/// Acknowledgement returned to the provider for every webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookAck {
    pub success: bool,
}

/// Health check response.
///
/// Returned by the `/v1/health` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service health status ("healthy" or "unhealthy").
    pub status: String,

    /// Database connectivity status (optional, for detailed health).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
}
