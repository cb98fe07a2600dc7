//! Host account repository.

use crate::errors::RoomError;
use crate::models::{AccountOnlineStatus, AccountRow};
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

/// Repository for pooled host account operations.
pub struct AccountsRepository;

impl AccountsRepository {
    /// List all enabled accounts, in catalog order.
    ///
    /// Callers are expected to shuffle before probing; returning a stable
    /// order here keeps the randomization policy in one place.
    #[instrument(skip_all)]
    pub async fn list_enabled(pool: &PgPool) -> Result<Vec<AccountRow>, RoomError> {
        let rows: Vec<AccountRow> = sqlx::query_as(
            r#"
            SELECT account_id, label, client_id, client_secret, host_email,
                   online_status, enabled
            FROM host_accounts
            WHERE enabled
            ORDER BY created_at
            "#,
        )
        .fetch_all(pool)
        .await?;

        Ok(rows)
    }

    /// Fetch one account by id, enabled or not.
    ///
    /// Rooms snapshot their account; lifecycle handling must still resolve
    /// the credentials of an account that was disabled mid-meeting.
    #[instrument(skip_all, fields(account_id = %account_id))]
    pub async fn find_by_id(
        pool: &PgPool,
        account_id: Uuid,
    ) -> Result<Option<AccountRow>, RoomError> {
        let row: Option<AccountRow> = sqlx::query_as(
            r#"
            SELECT account_id, label, client_id, client_secret, host_email,
                   online_status, enabled
            FROM host_accounts
            WHERE account_id = $1
            "#,
        )
        .bind(account_id)
        .fetch_optional(pool)
        .await?;

        Ok(row)
    }

    /// Update an account's online status.
    ///
    /// Returns the number of rows changed (0 when the account is unknown).
    #[instrument(skip_all, fields(account_id = %account_id, status = status.as_str()))]
    pub async fn set_online_status(
        pool: &PgPool,
        account_id: Uuid,
        status: AccountOnlineStatus,
    ) -> Result<u64, RoomError> {
        let result = sqlx::query(
            r#"
            UPDATE host_accounts
            SET online_status = $2
            WHERE account_id = $1
            "#,
        )
        .bind(account_id)
        .bind(status.as_str())
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }
}
