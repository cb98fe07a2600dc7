//! Authentication middleware for protected routes.
//!
//! Token issuance and validation belong to the platform's auth layer; this
//! middleware only resolves the opaque bearer token to a user row and
//! injects it into request extensions. Webhook endpoints are exempt - the
//! provider does not authenticate this way.

use crate::errors::RoomError;
use crate::models::UserRow;
use crate::repositories::UsersRepository;
use crate::routes::AppState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::instrument;

/// The authenticated user, available to handlers via `Extension`.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserRow);

/// Authentication middleware that resolves bearer tokens to users.
///
/// # Authorization Header Format
///
/// ```text
/// Authorization: Bearer <token>
/// ```
///
/// # Response
///
/// - Returns 401 Unauthorized if the token is missing or unknown
/// - Continues to the next handler with `CurrentUser` in extensions otherwise
#[instrument(skip(state, req, next), name = "room.middleware.auth")]
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, RoomError> {
    // Extract Authorization header
    let auth_header = req
        .headers()
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            tracing::debug!(target: "room.middleware.auth", "Missing Authorization header");
            RoomError::Unauthorized("Missing Authorization header".to_string())
        })?;

    // Extract Bearer token
    let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
        tracing::debug!(target: "room.middleware.auth", "Invalid Authorization header format");
        RoomError::Unauthorized("Invalid Authorization header format".to_string())
    })?;

    // Resolve the user
    let user = UsersRepository::find_by_api_token(&state.pool, token)
        .await?
        .ok_or_else(|| {
            tracing::debug!(target: "room.middleware.auth", "Unknown bearer token");
            RoomError::Unauthorized("Invalid token".to_string())
        })?;

    // Store the user in request extensions for downstream handlers
    req.extensions_mut().insert(CurrentUser(user));

    // Continue to next handler
    Ok(next.run(req).await)
}
