//! Webhook state-machine integration tests.
//!
//! Exercises the idempotent guards: duplicate delivery, out-of-order
//! delivery, and events for meetings this core never allocated.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use anyhow::Result;
use chrono::{DateTime, Utc};
use room_test_utils::{
    seed_account, seed_registration, seed_session, seed_user, SeededUser, TestRoomServer,
};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

// ============================================================================
// Helpers
// ============================================================================

async fn post_hook(server: &TestRoomServer, envelope: &serde_json::Value) -> Result<u16> {
    let response = reqwest::Client::new()
        .post(format!("{}/rooms/hook", server.url()))
        .json(envelope)
        .send()
        .await?;
    Ok(response.status().as_u16())
}

fn envelope(event: &str, meeting_id: &str) -> serde_json::Value {
    json!({
        "event": event,
        "event_ts": 1723000000000i64,
        "payload": {"object": {"id": meeting_id}}
    })
}

fn recording_envelope(meeting_id: &str, recording_id: &str) -> serde_json::Value {
    json!({
        "event": "recording.completed",
        "event_ts": 1723000000000i64,
        "payload": {"object": {
            "id": meeting_id,
            "recording_id": recording_id,
            "share_url": format!("https://provider.test/rec/{recording_id}")
        }}
    })
}

/// Seed an instructor + session + account and bring a room to pending.
async fn setup_pending_room(
    server: &TestRoomServer,
    pool: &PgPool,
) -> Result<(SeededUser, Uuid, Uuid, String)> {
    let instructor = seed_user(pool, "instructor", "ada").await?;
    let session_id = seed_session(pool, instructor.user_id, "Week 4 Live", None).await?;
    seed_account(pool, "host1").await?;

    let response = reqwest::Client::new()
        .get(format!("{}/rooms/{}/join", server.url(), session_id))
        .bearer_auth(&instructor.api_token)
        .send()
        .await?;
    assert_eq!(response.status(), 200);

    let (room_id, meeting_id): (Uuid, String) =
        sqlx::query_as("SELECT room_id, provider_meeting_id FROM rooms WHERE session_id = $1")
            .bind(session_id)
            .fetch_one(pool)
            .await?;

    Ok((instructor, session_id, room_id, meeting_id))
}

async fn room_state(
    pool: &PgPool,
    room_id: Uuid,
) -> Result<(String, Option<DateTime<Utc>>, Option<DateTime<Utc>>)> {
    let row: (String, Option<DateTime<Utc>>, Option<DateTime<Utc>>) =
        sqlx::query_as("SELECT status, started_at, ended_at FROM rooms WHERE room_id = $1")
            .bind(room_id)
            .fetch_one(pool)
            .await?;
    Ok(row)
}

async fn ledger_count(pool: &PgPool, meeting_id: &str) -> Result<i64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM webhook_events WHERE provider_meeting_id = $1")
            .bind(meeting_id)
            .fetch_one(pool)
            .await?;
    Ok(count)
}

// ============================================================================
// Idempotent started
// ============================================================================

#[sqlx::test(migrations = "../../migrations")]
async fn test_replayed_started_is_a_noop(pool: PgPool) -> Result<()> {
    let server = TestRoomServer::spawn(pool.clone()).await?;
    let (_instructor, session_id, room_id, meeting_id) =
        setup_pending_room(&server, &pool).await?;
    let learner = seed_user(&pool, "learner", "grace").await?;
    seed_registration(&pool, session_id, learner.user_id).await?;

    assert_eq!(
        post_hook(&server, &envelope("meeting.started", &meeting_id)).await?,
        200
    );
    let (status, started_at, _ended) = room_state(&pool, room_id).await?;
    assert_eq!(status, "living");
    let first_started_at = started_at.unwrap();
    let notices_after_first = server.notifier().count();
    assert!(notices_after_first > 0);

    // Identical replay: 200, no state change, no second notification batch
    assert_eq!(
        post_hook(&server, &envelope("meeting.started", &meeting_id)).await?,
        200
    );
    let (status, started_at, _ended) = room_state(&pool, room_id).await?;
    assert_eq!(status, "living");
    assert_eq!(started_at.unwrap(), first_started_at);
    assert_eq!(server.notifier().count(), notices_after_first);

    // Both deliveries are on the ledger
    assert_eq!(ledger_count(&pool, &meeting_id).await?, 2);

    Ok(())
}

// ============================================================================
// Out-of-order terminal events
// ============================================================================

#[sqlx::test(migrations = "../../migrations")]
async fn test_completed_before_ended_yields_single_stop(pool: PgPool) -> Result<()> {
    let server = TestRoomServer::spawn(pool.clone()).await?;
    let (_instructor, session_id, room_id, meeting_id) =
        setup_pending_room(&server, &pool).await?;

    post_hook(&server, &envelope("meeting.started", &meeting_id)).await?;

    // completed arrives first: recording attached AND the room stopped
    assert_eq!(
        post_hook(&server, &recording_envelope(&meeting_id, "rec-1")).await?,
        200
    );
    let (status, _started, ended_at) = room_state(&pool, room_id).await?;
    assert_eq!(status, "stop");
    let first_ended_at = ended_at.unwrap();

    // the late ended is suppressed; ended_at is set exactly once
    assert_eq!(
        post_hook(&server, &envelope("meeting.ended", &meeting_id)).await?,
        200
    );
    let (status, _started, ended_at) = room_state(&pool, room_id).await?;
    assert_eq!(status, "stop");
    assert_eq!(ended_at.unwrap(), first_ended_at);

    // session ended, recording attached once
    let (room_status, refs): (String, serde_json::Value) =
        sqlx::query_as("SELECT room_status, recording_refs FROM sessions WHERE session_id = $1")
            .bind(session_id)
            .fetch_one(&pool)
            .await?;
    assert_eq!(room_status, "ended");
    assert_eq!(refs.as_array().unwrap().len(), 1);

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_ended_before_started_leaves_room_pending(pool: PgPool) -> Result<()> {
    let server = TestRoomServer::spawn(pool.clone()).await?;
    let (_instructor, _session_id, room_id, meeting_id) =
        setup_pending_room(&server, &pool).await?;

    // ended before started: guard expects living, so nothing happens
    assert_eq!(
        post_hook(&server, &envelope("meeting.ended", &meeting_id)).await?,
        200
    );
    let (status, _started, ended_at) = room_state(&pool, room_id).await?;
    assert_eq!(status, "pending");
    assert!(ended_at.is_none());

    // the late started still goes through
    post_hook(&server, &envelope("meeting.started", &meeting_id)).await?;
    let (status, _started, _ended) = room_state(&pool, room_id).await?;
    assert_eq!(status, "living");

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_duplicate_recording_id_is_ignored(pool: PgPool) -> Result<()> {
    let server = TestRoomServer::spawn(pool.clone()).await?;
    let (_instructor, session_id, _room_id, meeting_id) =
        setup_pending_room(&server, &pool).await?;

    post_hook(&server, &envelope("meeting.started", &meeting_id)).await?;
    post_hook(&server, &envelope("meeting.ended", &meeting_id)).await?;

    post_hook(&server, &recording_envelope(&meeting_id, "rec-1")).await?;
    post_hook(&server, &recording_envelope(&meeting_id, "rec-1")).await?;
    post_hook(&server, &recording_envelope(&meeting_id, "rec-2")).await?;

    let refs: serde_json::Value =
        sqlx::query_scalar("SELECT recording_refs FROM sessions WHERE session_id = $1")
            .bind(session_id)
            .fetch_one(&pool)
            .await?;
    let refs = refs.as_array().unwrap();
    assert_eq!(refs.len(), 2);

    Ok(())
}

// ============================================================================
// Presence via participant events
// ============================================================================

#[sqlx::test(migrations = "../../migrations")]
async fn test_participant_join_and_leave_drive_viewer_count(pool: PgPool) -> Result<()> {
    let server = TestRoomServer::spawn(pool.clone()).await?;
    let (instructor, session_id, room_id, meeting_id) =
        setup_pending_room(&server, &pool).await?;
    let learner = seed_user(&pool, "learner", "grace").await?;
    seed_registration(&pool, session_id, learner.user_id).await?;

    post_hook(&server, &envelope("meeting.started", &meeting_id)).await?;

    let participant = |event: &str, email: &str| {
        json!({
            "event": event,
            "event_ts": 1723000000001i64,
            "payload": {"object": {"id": meeting_id, "participant": {"email": email}}}
        })
    };

    post_hook(
        &server,
        &participant("meeting.participant_joined", &learner.email),
    )
    .await?;
    post_hook(
        &server,
        &participant("meeting.participant_joined", &instructor.email),
    )
    .await?;

    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM room_registrants WHERE room_id = $1 AND status = 'joined'",
    )
    .bind(room_id)
    .fetch_one(&pool)
    .await?;
    assert_eq!(count, 2);

    post_hook(
        &server,
        &participant("meeting.participant_left", &learner.email),
    )
    .await?;

    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM room_registrants WHERE room_id = $1 AND status = 'joined'",
    )
    .bind(room_id)
    .fetch_one(&pool)
    .await?;
    assert_eq!(count, 1);

    // A participant email with no platform user is ledgered but tracked
    // nowhere
    post_hook(
        &server,
        &participant("meeting.participant_joined", "stranger@elsewhere.net"),
    )
    .await?;
    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM room_registrants WHERE room_id = $1")
        .bind(room_id)
        .fetch_one(&pool)
        .await?;
    assert_eq!(rows, 2);

    Ok(())
}

// ============================================================================
// Unmatched and unknown events
// ============================================================================

#[sqlx::test(migrations = "../../migrations")]
async fn test_events_for_unknown_meetings_are_ledgered_noops(pool: PgPool) -> Result<()> {
    let server = TestRoomServer::spawn(pool.clone()).await?;

    for event in [
        "meeting.started",
        "meeting.ended",
        "recording.completed",
        "meeting.participant_joined",
    ] {
        assert_eq!(post_hook(&server, &envelope(event, "never-allocated")).await?, 200);
    }

    assert_eq!(ledger_count(&pool, "never-allocated").await?, 4);

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_unknown_event_name_is_acknowledged(pool: PgPool) -> Result<()> {
    let server = TestRoomServer::spawn(pool.clone()).await?;

    assert_eq!(
        post_hook(&server, &envelope("meeting.sharing_started", "m-77")).await?,
        200
    );
    assert_eq!(ledger_count(&pool, "m-77").await?, 1);

    Ok(())
}

// ============================================================================
// Invariant: one living room per session
// ============================================================================

#[sqlx::test(migrations = "../../migrations")]
async fn test_at_most_one_living_room_per_session(pool: PgPool) -> Result<()> {
    let server = TestRoomServer::spawn(pool.clone()).await?;
    let (_instructor, session_id, _room_id, meeting_id) =
        setup_pending_room(&server, &pool).await?;

    post_hook(&server, &envelope("meeting.started", &meeting_id)).await?;

    // A second pending room for the same session (e.g. a racing allocation
    // whose started webhook arrives late) cannot go living while the first
    // one is: the partial unique index rejects it and the webhook is
    // swallowed.
    let stray_meeting = "stray-meeting-1";
    sqlx::query(
        r#"
        INSERT INTO rooms (session_id, account_id, account_email,
                           provider_meeting_id, provider_host_url, provider_join_url)
        SELECT session_id, account_id, account_email, $2, 'https://x/start', 'https://x/join'
        FROM rooms WHERE session_id = $1 LIMIT 1
        "#,
    )
    .bind(session_id)
    .bind(stray_meeting)
    .execute(&pool)
    .await?;

    assert_eq!(
        post_hook(&server, &envelope("meeting.started", stray_meeting)).await?,
        200
    );

    let living: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM rooms WHERE session_id = $1 AND status = 'living'",
    )
    .bind(session_id)
    .fetch_one(&pool)
    .await?;
    assert_eq!(living, 1);

    Ok(())
}
