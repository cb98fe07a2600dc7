//! Health check handler.

use crate::models::HealthResponse;
use crate::routes::AppState;
use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;
use tracing::instrument;

/// Handler for GET /v1/health
///
/// Pings the database and reports liveness. Returns 503 when the database
/// is unreachable so load balancers stop routing to this instance.
#[instrument(skip_all)]
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<HealthResponse>) {
    let database_healthy = sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(&state.pool)
        .await
        .is_ok();

    if database_healthy {
        (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy".to_string(),
                database: Some("healthy".to_string()),
            }),
        )
    } else {
        tracing::warn!(target: "room.handlers.health", "Database ping failed");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "unhealthy".to_string(),
                database: Some("unhealthy".to_string()),
            }),
        )
    }
}
