//! HTTP provider client tests.
//!
//! Runs `HttpProviderClient` against a wiremock server shaped like the
//! provider API, covering the happy paths and the status-code mapping.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use anyhow::Result;
use chrono::Utc;
use room_orchestrator::errors::RoomError;
use room_orchestrator::services::provider::{
    CreateMeetingRequest, HostCredentials, MeetingSettings, ProviderClient,
};
use room_orchestrator::services::HttpProviderClient;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn creds() -> HostCredentials {
    HostCredentials {
        client_id: "acct-1".to_string(),
        client_secret: common::secret::SecretString::from("s3cr3t"),
        host_email: "host1@pool.example.com".to_string(),
    }
}

fn create_request() -> CreateMeetingRequest {
    CreateMeetingRequest {
        topic: "Week 4 Live".to_string(),
        start_time: Utc::now(),
        duration: 45,
        timezone: "UTC".to_string(),
        settings: MeetingSettings::product_policy(),
    }
}

#[tokio::test]
async fn test_create_meeting_parses_provider_response() -> Result<()> {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/users/host1@pool.example.com/meetings"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "823465",
            "start_url": "https://provider.example.com/s/823465?zak=abc",
            "join_url": "https://provider.example.com/j/823465"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = HttpProviderClient::new(mock_server.uri())?;
    let meeting = client.create_meeting(&creds(), &create_request()).await?;

    assert_eq!(meeting.id, "823465");
    assert!(meeting.start_url.contains("zak=abc"));
    assert_eq!(meeting.join_url, "https://provider.example.com/j/823465");

    Ok(())
}

#[tokio::test]
async fn test_active_meeting_count_reads_total_records() -> Result<()> {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/users/host1@pool.example.com/meetings"))
        .and(query_param("type", "live"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total_records": 2,
            "meetings": [{"id": "1"}, {"id": "2"}]
        })))
        .mount(&mock_server)
        .await;

    let client = HttpProviderClient::new(mock_server.uri())?;
    let count = client.active_meeting_count(&creds()).await?;

    assert_eq!(count, 2);

    Ok(())
}

#[tokio::test]
async fn test_get_meeting_404_maps_to_not_found() -> Result<()> {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/meetings/999"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let client = HttpProviderClient::new(mock_server.uri())?;
    let result = client.get_meeting(&creds(), "999").await;

    assert!(matches!(result, Err(RoomError::NotFound(_))));

    Ok(())
}

#[tokio::test]
async fn test_server_error_maps_to_provider_error() -> Result<()> {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/users/host1@pool.example.com/meetings"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&mock_server)
        .await;

    let client = HttpProviderClient::new(mock_server.uri())?;
    let result = client.create_meeting(&creds(), &create_request()).await;

    assert!(matches!(result, Err(RoomError::Provider(_))));

    Ok(())
}

#[tokio::test]
async fn test_rejected_credentials_map_to_provider_error() -> Result<()> {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/users/host1@pool.example.com/meetings"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&mock_server)
        .await;

    let client = HttpProviderClient::new(mock_server.uri())?;
    let result = client.active_meeting_count(&creds()).await;

    assert!(matches!(result, Err(RoomError::Provider(_))));

    Ok(())
}

#[tokio::test]
async fn test_add_registrant_posts_email() -> Result<()> {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/meetings/823465/registrants"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "registrant_id": "reg-77",
            "join_url": "https://provider.example.com/j/823465?tk=reg-77"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = HttpProviderClient::new(mock_server.uri())?;
    let registrant = client
        .add_registrant(&creds(), "823465", "grace@example.com", "Grace")
        .await?;

    assert_eq!(registrant.registrant_id, "reg-77");
    assert!(registrant.join_url.contains("tk=reg-77"));

    Ok(())
}

#[tokio::test]
async fn test_participant_report_parses_entries() -> Result<()> {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/report/meetings/823465/participants"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "participants": [
                {
                    "email": "grace@example.com",
                    "name": "Grace",
                    "join_time": "2026-08-06T10:00:00Z",
                    "leave_time": "2026-08-06T10:45:00Z"
                },
                {"name": "Dial-in Caller"}
            ]
        })))
        .mount(&mock_server)
        .await;

    let client = HttpProviderClient::new(mock_server.uri())?;
    let report = client.participant_report(&creds(), "823465").await?;

    assert_eq!(report.len(), 2);
    let grace = report
        .iter()
        .find(|e| e.email.as_deref() == Some("grace@example.com"))
        .unwrap();
    assert!(grace.join_time.is_some());
    assert!(grace.leave_time.is_some());
    assert!(report.iter().any(|e| e.email.is_none()));

    Ok(())
}
