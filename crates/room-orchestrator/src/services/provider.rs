//! Meeting provider HTTP client.
//!
//! Thin gateway over the external meeting-host API: create/get meeting,
//! count a host's active meetings, add a registrant, fetch the participant
//! report. The provider's contract is fixed; this module only adapts it.
//!
//! # Security
//!
//! - Each call authenticates with the pooled account's own credentials
//! - Timeouts prevent hanging connections; a timeout is reported as a
//!   provider error, never treated as proof the call failed provider-side
//! - Errors are logged server-side with generic messages returned

use crate::errors::RoomError;
use crate::models::AccountRow;
use chrono::{DateTime, Utc};
use common::secret::{ExposeSecret, SecretString};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, instrument, warn};

/// Default timeout for provider requests in seconds.
const PROVIDER_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Default connect timeout in seconds.
const PROVIDER_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Credentials of one pooled host account.
///
/// The secret is redacted in Debug output.
#[derive(Debug, Clone)]
pub struct HostCredentials {
    /// Provider-side client id.
    pub client_id: String,

    /// Provider-side client secret.
    pub client_secret: SecretString,

    /// Email identifying the host user at the provider.
    pub host_email: String,
}

impl HostCredentials {
    /// Build credentials from a pooled account row.
    pub fn from_account(account: &AccountRow) -> Self {
        Self {
            client_id: account.client_id.clone(),
            client_secret: SecretString::from(account.client_secret.clone()),
            host_email: account.host_email.clone(),
        }
    }
}

/// Meeting-creation request sent to the provider.
#[derive(Debug, Clone, Serialize)]
pub struct CreateMeetingRequest {
    /// Meeting topic (the session name).
    pub topic: String,

    /// Scheduled start time.
    pub start_time: DateTime<Utc>,

    /// Meeting duration in minutes.
    pub duration: i64,

    /// IANA timezone for the scheduled time.
    pub timezone: String,

    /// Product-policy meeting settings.
    pub settings: MeetingSettings,
}

/// Meeting settings fixed by product policy.
#[derive(Debug, Clone, Serialize)]
pub struct MeetingSettings {
    pub host_video: bool,
    pub participant_video: bool,
    pub join_before_host: bool,
    pub waiting_room: bool,
    pub auto_recording: String,
}

impl MeetingSettings {
    /// The product's fixed policy: host camera on, attendees muted-video,
    /// no join-before-host, waiting room on, cloud recording.
    pub fn product_policy() -> Self {
        Self {
            host_video: true,
            participant_video: false,
            join_before_host: false,
            waiting_room: true,
            auto_recording: "cloud".to_string(),
        }
    }
}

/// A meeting as described by the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderMeeting {
    /// Provider meeting id.
    pub id: String,

    /// URL the host uses to start the meeting.
    pub start_url: String,

    /// URL attendees use to join.
    pub join_url: String,
}

/// A registrant as created by the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRegistrant {
    /// Provider registrant id.
    pub registrant_id: String,

    /// Personalized join URL for this registrant.
    pub join_url: String,
}

/// One entry of the post-meeting participant report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantReportEntry {
    /// Email the participant joined with, when the provider resolved one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Join timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_time: Option<DateTime<Utc>>,

    /// Leave timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leave_time: Option<DateTime<Utc>>,
}

/// Trait for provider operations (enables mocking).
#[async_trait::async_trait]
pub trait ProviderClient: Send + Sync {
    /// Create a meeting hosted by the given account.
    async fn create_meeting(
        &self,
        creds: &HostCredentials,
        request: &CreateMeetingRequest,
    ) -> Result<ProviderMeeting, RoomError>;

    /// Fetch a meeting, primarily to refresh its URLs.
    async fn get_meeting(
        &self,
        creds: &HostCredentials,
        meeting_id: &str,
    ) -> Result<ProviderMeeting, RoomError>;

    /// Count the host account's currently active (live) meetings.
    async fn active_meeting_count(&self, creds: &HostCredentials) -> Result<u32, RoomError>;

    /// Add (or re-add) a registrant to a meeting.
    ///
    /// The provider treats an existing email for the same meeting as a
    /// refresh, so the call is idempotent per email+meeting.
    async fn add_registrant(
        &self,
        creds: &HostCredentials,
        meeting_id: &str,
        email: &str,
        display_name: &str,
    ) -> Result<ProviderRegistrant, RoomError>;

    /// Fetch the post-meeting participant report.
    async fn participant_report(
        &self,
        creds: &HostCredentials,
        meeting_id: &str,
    ) -> Result<Vec<ParticipantReportEntry>, RoomError>;
}

/// HTTP client for the meeting provider API.
#[derive(Clone)]
pub struct HttpProviderClient {
    /// HTTP client with configured timeouts.
    client: Client,

    /// Base URL for the provider API.
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ActiveMeetingsResponse {
    total_records: u32,
}

#[derive(Debug, Deserialize)]
struct ParticipantReportResponse {
    participants: Vec<ParticipantReportEntry>,
}

impl HttpProviderClient {
    /// Create a new provider client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL for the provider API
    ///
    /// # Errors
    ///
    /// Returns `RoomError::Internal` if the HTTP client cannot be built.
    pub fn new(base_url: String) -> Result<Self, RoomError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(PROVIDER_REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(PROVIDER_CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| {
                error!(target: "room.services.provider", error = %e, "Failed to build HTTP client");
                RoomError::Internal
            })?;

        Ok(Self { client, base_url })
    }

    /// Handle a provider response and map status codes to errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, RoomError> {
        let status = response.status();

        if status.is_success() {
            response.json().await.map_err(|e| {
                error!(target: "room.services.provider", error = %e, "Failed to parse provider response");
                RoomError::Provider("Unparseable provider response".to_string())
            })
        } else if status.as_u16() == 404 {
            Err(RoomError::NotFound("Meeting not found".to_string()))
        } else if status.is_server_error() {
            warn!(target: "room.services.provider", status = %status, "Provider returned server error");
            Err(RoomError::Provider(
                "Meeting provider is unavailable".to_string(),
            ))
        } else if status.as_u16() == 401 || status.as_u16() == 403 {
            error!(target: "room.services.provider", status = %status, "Host account credentials rejected by provider");
            Err(RoomError::Provider(
                "Host account credentials rejected".to_string(),
            ))
        } else {
            let error_body = response.text().await.unwrap_or_default();
            warn!(target: "room.services.provider", status = %status, body = %error_body, "Provider rejected request");
            Err(RoomError::Provider("Provider rejected request".to_string()))
        }
    }
}

#[async_trait::async_trait]
impl ProviderClient for HttpProviderClient {
    #[instrument(skip(self, creds, request), fields(host_email = %creds.host_email, topic = %request.topic))]
    async fn create_meeting(
        &self,
        creds: &HostCredentials,
        request: &CreateMeetingRequest,
    ) -> Result<ProviderMeeting, RoomError> {
        let url = format!("{}/users/{}/meetings", self.base_url, creds.host_email);

        let response = self
            .client
            .post(&url)
            .basic_auth(&creds.client_id, Some(creds.client_secret.expose_secret()))
            .json(request)
            .send()
            .await
            .map_err(|e| {
                warn!(target: "room.services.provider", error = %e, "Provider create-meeting request failed");
                RoomError::Provider("Meeting provider is unavailable".to_string())
            })?;

        self.handle_response(response).await
    }

    #[instrument(skip(self, creds), fields(meeting_id = %meeting_id))]
    async fn get_meeting(
        &self,
        creds: &HostCredentials,
        meeting_id: &str,
    ) -> Result<ProviderMeeting, RoomError> {
        let url = format!("{}/meetings/{}", self.base_url, meeting_id);

        let response = self
            .client
            .get(&url)
            .basic_auth(&creds.client_id, Some(creds.client_secret.expose_secret()))
            .send()
            .await
            .map_err(|e| {
                warn!(target: "room.services.provider", error = %e, "Provider get-meeting request failed");
                RoomError::Provider("Meeting provider is unavailable".to_string())
            })?;

        self.handle_response(response).await
    }

    #[instrument(skip(self, creds), fields(host_email = %creds.host_email))]
    async fn active_meeting_count(&self, creds: &HostCredentials) -> Result<u32, RoomError> {
        let url = format!(
            "{}/users/{}/meetings?type=live",
            self.base_url, creds.host_email
        );

        let response = self
            .client
            .get(&url)
            .basic_auth(&creds.client_id, Some(creds.client_secret.expose_secret()))
            .send()
            .await
            .map_err(|e| {
                warn!(target: "room.services.provider", error = %e, "Provider live-meetings request failed");
                RoomError::Provider("Meeting provider is unavailable".to_string())
            })?;

        let body: ActiveMeetingsResponse = self.handle_response(response).await?;
        Ok(body.total_records)
    }

    #[instrument(skip(self, creds), fields(meeting_id = %meeting_id, email = %email))]
    async fn add_registrant(
        &self,
        creds: &HostCredentials,
        meeting_id: &str,
        email: &str,
        display_name: &str,
    ) -> Result<ProviderRegistrant, RoomError> {
        let url = format!("{}/meetings/{}/registrants", self.base_url, meeting_id);

        let body = serde_json::json!({
            "email": email,
            "first_name": display_name,
        });

        let response = self
            .client
            .post(&url)
            .basic_auth(&creds.client_id, Some(creds.client_secret.expose_secret()))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!(target: "room.services.provider", error = %e, "Provider add-registrant request failed");
                RoomError::Provider("Meeting provider is unavailable".to_string())
            })?;

        self.handle_response(response).await
    }

    #[instrument(skip(self, creds), fields(meeting_id = %meeting_id))]
    async fn participant_report(
        &self,
        creds: &HostCredentials,
        meeting_id: &str,
    ) -> Result<Vec<ParticipantReportEntry>, RoomError> {
        let url = format!(
            "{}/report/meetings/{}/participants",
            self.base_url, meeting_id
        );

        let response = self
            .client
            .get(&url)
            .basic_auth(&creds.client_id, Some(creds.client_secret.expose_secret()))
            .send()
            .await
            .map_err(|e| {
                warn!(target: "room.services.provider", error = %e, "Provider participant-report request failed");
                RoomError::Provider("Meeting provider is unavailable".to_string())
            })?;

        let body: ParticipantReportResponse = self.handle_response(response).await?;
        Ok(body.participants)
    }
}

/// Mock provider module for testing.
///
/// This module provides a scripted in-memory provider for use in tests.
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Mock provider client for unit and integration testing.
    #[derive(Default)]
    pub struct MockProviderClient {
        /// Active meeting count per host email (missing = 0).
        active_counts: Mutex<HashMap<String, u32>>,
        /// Meetings created through this mock, keyed by meeting id.
        meetings: Mutex<HashMap<String, ProviderMeeting>>,
        /// Scripted participant report.
        report: Mutex<Vec<ParticipantReportEntry>>,
        /// Monotonic counter for generated meeting ids.
        meeting_counter: AtomicUsize,
        /// Number of create-meeting calls made.
        create_calls: AtomicUsize,
        /// Number of active-count probes made.
        probe_calls: AtomicUsize,
        /// Whether create_meeting should fail.
        fail_create: bool,
    }

    impl MockProviderClient {
        /// Create a mock where every host is free and all calls succeed.
        pub fn new() -> Self {
            Self::default()
        }

        /// Create a mock whose create-meeting calls fail.
        pub fn failing_create() -> Self {
            Self {
                fail_create: true,
                ..Self::default()
            }
        }

        /// Script the active meeting count for a host email.
        pub fn set_active_count(&self, host_email: &str, count: u32) {
            #[allow(clippy::unwrap_used)]
            self.active_counts
                .lock()
                .unwrap()
                .insert(host_email.to_string(), count);
        }

        /// Script the participant report.
        pub fn set_report(&self, entries: Vec<ParticipantReportEntry>) {
            #[allow(clippy::unwrap_used)]
            let mut report = self.report.lock().unwrap();
            *report = entries;
        }

        /// Number of create-meeting calls made.
        pub fn create_calls(&self) -> usize {
            self.create_calls.load(Ordering::SeqCst)
        }

        /// Number of active-count probes made.
        pub fn probe_calls(&self) -> usize {
            self.probe_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl ProviderClient for MockProviderClient {
        async fn create_meeting(
            &self,
            creds: &HostCredentials,
            _request: &CreateMeetingRequest,
        ) -> Result<ProviderMeeting, RoomError> {
            self.create_calls.fetch_add(1, Ordering::SeqCst);

            if self.fail_create {
                return Err(RoomError::Provider(
                    "Mock provider create failure".to_string(),
                ));
            }

            let n = self.meeting_counter.fetch_add(1, Ordering::SeqCst) + 1;
            let id = format!("mock-meeting-{n}");
            let meeting = ProviderMeeting {
                id: id.clone(),
                start_url: format!("https://provider.test/start/{id}?host={}", creds.host_email),
                join_url: format!("https://provider.test/join/{id}"),
            };

            #[allow(clippy::unwrap_used)]
            self.meetings.lock().unwrap().insert(id, meeting.clone());
            Ok(meeting)
        }

        async fn get_meeting(
            &self,
            _creds: &HostCredentials,
            meeting_id: &str,
        ) -> Result<ProviderMeeting, RoomError> {
            #[allow(clippy::unwrap_used)]
            let meetings = self.meetings.lock().unwrap();
            meetings
                .get(meeting_id)
                .cloned()
                .ok_or_else(|| RoomError::NotFound("Meeting not found".to_string()))
        }

        async fn active_meeting_count(&self, creds: &HostCredentials) -> Result<u32, RoomError> {
            self.probe_calls.fetch_add(1, Ordering::SeqCst);

            #[allow(clippy::unwrap_used)]
            let counts = self.active_counts.lock().unwrap();
            Ok(counts.get(&creds.host_email).copied().unwrap_or(0))
        }

        async fn add_registrant(
            &self,
            _creds: &HostCredentials,
            meeting_id: &str,
            email: &str,
            _display_name: &str,
        ) -> Result<ProviderRegistrant, RoomError> {
            Ok(ProviderRegistrant {
                registrant_id: format!("reg-{meeting_id}-{email}"),
                join_url: format!("https://provider.test/join/{meeting_id}?r={email}"),
            })
        }

        #[allow(clippy::unwrap_used)]
        async fn participant_report(
            &self,
            _creds: &HostCredentials,
            _meeting_id: &str,
        ) -> Result<Vec<ParticipantReportEntry>, RoomError> {
            Ok(self.report.lock().unwrap().clone())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn test_creds() -> HostCredentials {
        HostCredentials {
            client_id: "acct-1".to_string(),
            client_secret: SecretString::from("s3cr3t"),
            host_email: "host1@pool.example.com".to_string(),
        }
    }

    #[test]
    fn test_host_credentials_debug_redacts_secret() {
        let creds = test_creds();
        let debug = format!("{:?}", creds);

        assert!(debug.contains("acct-1"));
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("s3cr3t"));
    }

    #[test]
    fn test_create_meeting_request_serialization() {
        let request = CreateMeetingRequest {
            topic: "Linear Algebra — Week 4".to_string(),
            start_time: chrono::Utc::now(),
            duration: 45,
            timezone: "UTC".to_string(),
            settings: MeetingSettings::product_policy(),
        };

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"topic\":\"Linear Algebra — Week 4\""));
        assert!(json.contains("\"duration\":45"));
        assert!(json.contains("\"waiting_room\":true"));
        assert!(json.contains("\"join_before_host\":false"));
        assert!(json.contains("\"auto_recording\":\"cloud\""));
    }

    #[test]
    fn test_provider_meeting_deserialization() {
        let json = r#"{
            "id": "823465",
            "start_url": "https://provider.example.com/s/823465?zak=abc",
            "join_url": "https://provider.example.com/j/823465"
        }"#;
        let meeting: ProviderMeeting = serde_json::from_str(json).unwrap();
        assert_eq!(meeting.id, "823465");
        assert!(meeting.start_url.contains("zak=abc"));
    }

    #[test]
    fn test_participant_report_entry_tolerates_missing_fields() {
        let json = r#"{"name": "Anonymous Caller"}"#;
        let entry: ParticipantReportEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.email, None);
        assert_eq!(entry.name.as_deref(), Some("Anonymous Caller"));
    }

    #[tokio::test]
    async fn test_mock_create_and_get_meeting() {
        let mock = mock::MockProviderClient::new();
        let creds = test_creds();

        let request = CreateMeetingRequest {
            topic: "t".to_string(),
            start_time: chrono::Utc::now(),
            duration: 45,
            timezone: "UTC".to_string(),
            settings: MeetingSettings::product_policy(),
        };

        let created = mock.create_meeting(&creds, &request).await.unwrap();
        assert_eq!(created.id, "mock-meeting-1");

        let fetched = mock.get_meeting(&creds, &created.id).await.unwrap();
        assert_eq!(fetched.start_url, created.start_url);
        assert_eq!(mock.create_calls(), 1);
    }

    #[tokio::test]
    async fn test_mock_active_counts_default_to_zero() {
        let mock = mock::MockProviderClient::new();
        let creds = test_creds();

        assert_eq!(mock.active_meeting_count(&creds).await.unwrap(), 0);

        mock.set_active_count("host1@pool.example.com", 2);
        assert_eq!(mock.active_meeting_count(&creds).await.unwrap(), 2);
        assert_eq!(mock.probe_calls(), 2);
    }

    #[tokio::test]
    async fn test_mock_failing_create() {
        let mock = mock::MockProviderClient::failing_create();
        let creds = test_creds();

        let request = CreateMeetingRequest {
            topic: "t".to_string(),
            start_time: chrono::Utc::now(),
            duration: 45,
            timezone: "UTC".to_string(),
            settings: MeetingSettings::product_policy(),
        };

        let result = mock.create_meeting(&creds, &request).await;
        assert!(matches!(result, Err(RoomError::Provider(_))));
    }

    #[tokio::test]
    async fn test_mock_registrant_is_deterministic_per_email() {
        let mock = mock::MockProviderClient::new();
        let creds = test_creds();

        let a = mock
            .add_registrant(&creds, "m-1", "x@example.com", "X")
            .await
            .unwrap();
        let b = mock
            .add_registrant(&creds, "m-1", "x@example.com", "X")
            .await
            .unwrap();

        // Re-registering the same email yields the same registrant
        assert_eq!(a.registrant_id, b.registrant_id);
        assert_eq!(a.join_url, b.join_url);
    }
}
