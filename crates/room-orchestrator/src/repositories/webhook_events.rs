//! Webhook event ledger.
//!
//! Immutable append of every raw inbound provider event. The ledger is
//! written before any guard evaluation so that suppressed replays remain
//! diagnosable, and it is never mutated after insert.

use crate::errors::RoomError;
use crate::models::WebhookEnvelope;
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

/// Repository for the append-only webhook ledger.
pub struct WebhookEventsRepository;

impl WebhookEventsRepository {
    /// Append a raw event to the ledger. Returns the ledger entry id.
    ///
    /// # Errors
    ///
    /// A failed append aborts webhook processing entirely — no guard may
    /// run against an event that is not on the ledger.
    #[instrument(skip_all, fields(event = %envelope.event))]
    pub async fn append(pool: &PgPool, envelope: &WebhookEnvelope) -> Result<Uuid, RoomError> {
        let payload = serde_json::to_value(envelope).map_err(|_| RoomError::Internal)?;

        let event_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO webhook_events (event_name, event_ts, provider_meeting_id, payload)
            VALUES ($1, $2, $3, $4)
            RETURNING event_id
            "#,
        )
        .bind(&envelope.event)
        .bind(envelope.event_ts)
        .bind(&envelope.payload.object.id)
        .bind(payload)
        .fetch_one(pool)
        .await?;

        Ok(event_id)
    }

    /// Count ledger entries for a provider meeting (audit queries, tests).
    #[instrument(skip_all, fields(provider_meeting_id = %provider_meeting_id))]
    pub async fn count_for_meeting(
        pool: &PgPool,
        provider_meeting_id: &str,
    ) -> Result<i64, RoomError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM webhook_events
            WHERE provider_meeting_id = $1
            "#,
        )
        .bind(provider_meeting_id)
        .fetch_one(pool)
        .await?;

        Ok(count)
    }
}
