//! Provider webhook handlers.
//!
//! - `POST /rooms/hook` - meeting lifecycle and participant events
//! - `POST /rooms/hook/recorded` - recording-completed events
//!
//! Both endpoints acknowledge with 200 regardless of what the guard did
//! with the event: a non-2xx response makes the provider redeliver, and a
//! redelivered event is at best a ledgered no-op. The only failure that
//! surfaces is a ledger append failure - an event that was never recorded
//! must be retried.

use crate::errors::RoomError;
use crate::models::{HookAck, WebhookEnvelope};
use crate::routes::AppState;
use crate::services::LifecycleService;
use axum::{extract::State, Json};
use std::sync::Arc;
use tracing::instrument;

/// Handler for POST /rooms/hook
#[instrument(skip_all, fields(event = %envelope.event))]
pub async fn provider_hook(
    State(state): State<Arc<AppState>>,
    Json(envelope): Json<WebhookEnvelope>,
) -> Result<Json<HookAck>, RoomError> {
    ingest(&state, &envelope).await
}

/// Handler for POST /rooms/hook/recorded
///
/// Same pipeline as the main hook; providers deliver recording events to a
/// separate endpoint, the envelope shape is identical.
#[instrument(skip_all, fields(event = %envelope.event))]
pub async fn provider_hook_recorded(
    State(state): State<Arc<AppState>>,
    Json(envelope): Json<WebhookEnvelope>,
) -> Result<Json<HookAck>, RoomError> {
    ingest(&state, &envelope).await
}

async fn ingest(state: &AppState, envelope: &WebhookEnvelope) -> Result<Json<HookAck>, RoomError> {
    LifecycleService::ingest(
        &state.pool,
        state.locks.as_ref(),
        state.provider.as_ref(),
        state.notifier.as_ref(),
        envelope,
    )
    .await?;

    Ok(Json(HookAck { success: true }))
}
