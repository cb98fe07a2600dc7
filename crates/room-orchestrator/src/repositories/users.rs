//! User, roster, and course-role reads.
//!
//! All tables here belong to the course CRUD layer; the orchestrator only
//! reads them to resolve identity, start permission, and roster membership.

use crate::errors::RoomError;
use crate::models::UserRow;
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

/// Repository for user and roster reads.
pub struct UsersRepository;

impl UsersRepository {
    /// Resolve a user by their opaque API token.
    ///
    /// The token itself is issued and validated upstream by the auth layer;
    /// this lookup is the only coupling the orchestrator has to it.
    #[instrument(skip_all)]
    pub async fn find_by_api_token(
        pool: &PgPool,
        api_token: &str,
    ) -> Result<Option<UserRow>, RoomError> {
        let row: Option<UserRow> = sqlx::query_as(
            r#"
            SELECT user_id, email, display_name, kind
            FROM users
            WHERE api_token = $1
            "#,
        )
        .bind(api_token)
        .fetch_optional(pool)
        .await?;

        Ok(row)
    }

    /// Fetch a user by id.
    #[instrument(skip_all, fields(user_id = %user_id))]
    pub async fn find_by_id(pool: &PgPool, user_id: Uuid) -> Result<Option<UserRow>, RoomError> {
        let row: Option<UserRow> = sqlx::query_as(
            r#"
            SELECT user_id, email, display_name, kind
            FROM users
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        Ok(row)
    }

    /// Resolve a user by email.
    ///
    /// Used to map provider participants (identified by email) back to
    /// platform users.
    #[instrument(skip_all)]
    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<UserRow>, RoomError> {
        let row: Option<UserRow> = sqlx::query_as(
            r#"
            SELECT user_id, email, display_name, kind
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(pool)
        .await?;

        Ok(row)
    }

    /// Whether the user holds an active roster registration for a session.
    #[instrument(skip_all, fields(session_id = %session_id, user_id = %user_id))]
    pub async fn has_active_registration(
        pool: &PgPool,
        session_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, RoomError> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM registrations
                WHERE session_id = $1
                  AND user_id = $2
                  AND status = 'active'
            )
            "#,
        )
        .bind(session_id)
        .bind(user_id)
        .fetch_one(pool)
        .await?;

        Ok(exists)
    }

    /// Whether the user holds the given course role for a unit.
    #[instrument(skip_all, fields(user_id = %user_id, unit_id = %unit_id, role = %role))]
    pub async fn has_unit_role(
        pool: &PgPool,
        user_id: Uuid,
        unit_id: Uuid,
        role: &str,
    ) -> Result<bool, RoomError> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM unit_roles
                WHERE user_id = $1
                  AND unit_id = $2
                  AND role = $3
            )
            "#,
        )
        .bind(user_id)
        .bind(unit_id)
        .bind(role)
        .fetch_one(pool)
        .await?;

        Ok(exists)
    }

    /// List users with an active registration for a session.
    ///
    /// Each user appears exactly once — this is the notification roster.
    #[instrument(skip_all, fields(session_id = %session_id))]
    pub async fn list_active_roster(
        pool: &PgPool,
        session_id: Uuid,
    ) -> Result<Vec<UserRow>, RoomError> {
        let rows: Vec<UserRow> = sqlx::query_as(
            r#"
            SELECT DISTINCT u.user_id, u.email, u.display_name, u.kind
            FROM users u
            JOIN registrations r ON r.user_id = u.user_id
            WHERE r.session_id = $1
              AND r.status = 'active'
            "#,
        )
        .bind(session_id)
        .fetch_all(pool)
        .await?;

        Ok(rows)
    }
}
