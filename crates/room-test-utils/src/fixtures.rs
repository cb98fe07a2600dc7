//! Database fixtures for integration tests.
//!
//! Helpers that seed the externally-owned tables (users, sessions, unit
//! roles, rosters) and the host-account pool. Each helper returns the
//! generated id so tests can wire rows together.

use chrono::{Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// A seeded user, with the bearer token tests authenticate with.
#[derive(Debug, Clone)]
pub struct SeededUser {
    pub user_id: Uuid,
    pub email: String,
    pub api_token: String,
}

/// Insert a user. `kind` is one of `learner`, `instructor`, `admin`,
/// `super_admin`.
pub async fn seed_user(pool: &PgPool, kind: &str, name: &str) -> Result<SeededUser, sqlx::Error> {
    let user_id = Uuid::new_v4();
    let email = format!("{name}-{user_id}@example.com");
    let api_token = format!("token-{user_id}");

    sqlx::query(
        r#"
        INSERT INTO users (user_id, email, display_name, kind, api_token)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(user_id)
    .bind(&email)
    .bind(name)
    .bind(kind)
    .bind(&api_token)
    .execute(pool)
    .await?;

    Ok(SeededUser {
        user_id,
        email,
        api_token,
    })
}

/// Insert a webinar session starting now with a one-hour window.
pub async fn seed_session(
    pool: &PgPool,
    instructor_user_id: Uuid,
    name: &str,
    access_code: Option<&str>,
) -> Result<Uuid, sqlx::Error> {
    seed_session_of_kind(pool, instructor_user_id, name, access_code, "webinar").await
}

/// Insert a session of an arbitrary kind.
pub async fn seed_session_of_kind(
    pool: &PgPool,
    instructor_user_id: Uuid,
    name: &str,
    access_code: Option<&str>,
    kind: &str,
) -> Result<Uuid, sqlx::Error> {
    let session_id = Uuid::new_v4();
    let begins_at = Utc::now();
    let ends_at = begins_at + Duration::minutes(60);

    sqlx::query(
        r#"
        INSERT INTO sessions (session_id, unit_id, name, kind, instructor_user_id,
                              begins_at, ends_at, access_code)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(session_id)
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(kind)
    .bind(instructor_user_id)
    .bind(begins_at)
    .bind(ends_at)
    .bind(access_code)
    .execute(pool)
    .await?;

    Ok(session_id)
}

/// Insert an enabled host account. The host email doubles as the mock
/// provider's busy-count key.
pub async fn seed_account(pool: &PgPool, label: &str) -> Result<(Uuid, String), sqlx::Error> {
    let account_id = Uuid::new_v4();
    let host_email = format!("{label}-{account_id}@pool.example.com");

    sqlx::query(
        r#"
        INSERT INTO host_accounts (account_id, label, client_id, client_secret, host_email)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(account_id)
    .bind(label)
    .bind(format!("client-{label}"))
    .bind("test-secret")
    .bind(&host_email)
    .execute(pool)
    .await?;

    Ok((account_id, host_email))
}

/// Register a user on a session's roster.
pub async fn seed_registration(
    pool: &PgPool,
    session_id: Uuid,
    user_id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO registrations (session_id, user_id, status)
        VALUES ($1, $2, 'active')
        "#,
    )
    .bind(session_id)
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Grant a user a course role on a unit.
pub async fn seed_unit_role(
    pool: &PgPool,
    user_id: Uuid,
    unit_id: Uuid,
    role: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO unit_roles (user_id, unit_id, role)
        VALUES ($1, $2, $3)
        "#,
    )
    .bind(user_id)
    .bind(unit_id)
    .bind(role)
    .execute(pool)
    .await?;

    Ok(())
}

/// Look up the unit id of a session (for role grants).
pub async fn session_unit_id(pool: &PgPool, session_id: Uuid) -> Result<Uuid, sqlx::Error> {
    sqlx::query_scalar("SELECT unit_id FROM sessions WHERE session_id = $1")
        .bind(session_id)
        .fetch_one(pool)
        .await
}
