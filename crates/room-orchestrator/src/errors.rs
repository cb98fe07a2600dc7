//! Room orchestrator error types.
//!
//! All errors map to HTTP status codes and structured reason codes via the
//! `IntoResponse` impl. The reason codes (`accessCodeNotMatch`,
//! `userAndUserEventIsRequired`, ...) are part of the product's client
//! contract and must stay stable. Database details are logged server-side
//! and never returned to clients.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Reason a join request was refused with 403.
///
/// Each variant maps to a structured reason code the web client switches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeniedReason {
    /// The user has no active roster registration for the session.
    RegistrationRequired,
    /// The user holds no role that permits this action.
    InsufficientRole,
    /// The session exists but is not in a joinable state anymore.
    MeetingNotValid,
    /// The provider returned no usable URL for this room.
    JoinUrlNotFound,
}

impl DeniedReason {
    /// Returns the wire-level reason code.
    pub fn code(&self) -> &'static str {
        match self {
            DeniedReason::RegistrationRequired => "userAndUserEventIsRequired",
            DeniedReason::InsufficientRole => "permissionDenied",
            DeniedReason::MeetingNotValid => "meetingNotValid",
            DeniedReason::JoinUrlNotFound => "joinUrlNotFound",
        }
    }

    /// Human-readable message for the reason.
    pub fn message(&self) -> &'static str {
        match self {
            DeniedReason::RegistrationRequired => {
                "An active registration for this session is required"
            }
            DeniedReason::InsufficientRole => "You are not allowed to perform this action",
            DeniedReason::MeetingNotValid => "This session can no longer be joined",
            DeniedReason::JoinUrlNotFound => "No join URL is available for this room",
        }
    }
}

/// Room orchestrator error type.
///
/// Maps to HTTP status codes:
/// - Database, Internal: 500 Internal Server Error
/// - Unauthorized: 401 Unauthorized
/// - PermissionDenied, AccessCodeMismatch, NotStartedYet: 403 Forbidden
/// - NotFound: 404 Not Found
/// - Validation: 422 Unprocessable Entity
/// - PoolExhausted, Provider: 503 Service Unavailable
#[derive(Debug, Error)]
pub enum RoomError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Permission denied: {}", .0.code())]
    PermissionDenied(DeniedReason),

    #[error("Access code does not match")]
    AccessCodeMismatch,

    #[error("Session has not been started yet")]
    NotStartedYet,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("No free host account in the pool")]
    PoolExhausted,

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Internal server error")]
    Internal,
}

impl RoomError {
    /// Returns the HTTP status code for this error (for metrics recording).
    pub fn status_code(&self) -> u16 {
        match self {
            RoomError::Database(_) | RoomError::Internal => 500,
            RoomError::Unauthorized(_) => 401,
            RoomError::PermissionDenied(_)
            | RoomError::AccessCodeMismatch
            | RoomError::NotStartedYet => 403,
            RoomError::NotFound(_) => 404,
            RoomError::Validation(_) => 422,
            RoomError::PoolExhausted | RoomError::Provider(_) => 503,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for RoomError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            RoomError::Database(err) => {
                // Log actual error server-side, return generic message to client
                tracing::error!(target: "room.database", error = %err, "Database operation failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "databaseError",
                    "An internal database error occurred".to_string(),
                )
            }
            RoomError::Unauthorized(reason) => {
                (StatusCode::UNAUTHORIZED, "unauthorized", reason.clone())
            }
            RoomError::PermissionDenied(reason) => (
                StatusCode::FORBIDDEN,
                reason.code(),
                reason.message().to_string(),
            ),
            RoomError::AccessCodeMismatch => (
                StatusCode::FORBIDDEN,
                "accessCodeNotMatch",
                "The supplied access code does not match".to_string(),
            ),
            // Attendees see "meeting not found" until the host starts the room.
            RoomError::NotStartedYet => (
                StatusCode::FORBIDDEN,
                "meetingNotFound",
                "The session has not been started yet".to_string(),
            ),
            RoomError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                "sessionNotFound",
                resource.clone(),
            ),
            RoomError::Validation(reason) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "validationError",
                reason.clone(),
            ),
            RoomError::PoolExhausted => (
                StatusCode::SERVICE_UNAVAILABLE,
                "poolExhausted",
                "All host accounts are busy, please set up more accounts".to_string(),
            ),
            RoomError::Provider(reason) => {
                // Log actual reason server-side
                tracing::warn!(target: "room.provider", reason = %reason, "Provider call failed");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "providerError",
                    "The meeting provider is temporarily unavailable".to_string(),
                )
            }
            RoomError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internalError",
                "An internal error occurred".to_string(),
            ),
        };

        let error_response = ErrorResponse {
            success: false,
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        (status, Json(error_response)).into_response()
    }
}

/// Convert sqlx errors to RoomError
impl From<sqlx::Error> for RoomError {
    fn from(err: sqlx::Error) -> Self {
        RoomError::Database(err.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;

    // Helper function to read the response body as JSON
    async fn read_body_json(body: Body) -> serde_json::Value {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_display_database_error() {
        let error = RoomError::Database("connection failed".to_string());
        assert_eq!(format!("{}", error), "Database error: connection failed");
    }

    #[test]
    fn test_display_pool_exhausted() {
        let error = RoomError::PoolExhausted;
        assert_eq!(format!("{}", error), "No free host account in the pool");
    }

    #[test]
    fn test_denied_reason_codes() {
        assert_eq!(
            DeniedReason::RegistrationRequired.code(),
            "userAndUserEventIsRequired"
        );
        assert_eq!(DeniedReason::InsufficientRole.code(), "permissionDenied");
        assert_eq!(DeniedReason::MeetingNotValid.code(), "meetingNotValid");
        assert_eq!(DeniedReason::JoinUrlNotFound.code(), "joinUrlNotFound");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(RoomError::Database("x".to_string()).status_code(), 500);
        assert_eq!(RoomError::Unauthorized("x".to_string()).status_code(), 401);
        assert_eq!(
            RoomError::PermissionDenied(DeniedReason::InsufficientRole).status_code(),
            403
        );
        assert_eq!(RoomError::AccessCodeMismatch.status_code(), 403);
        assert_eq!(RoomError::NotStartedYet.status_code(), 403);
        assert_eq!(RoomError::NotFound("x".to_string()).status_code(), 404);
        assert_eq!(RoomError::Validation("x".to_string()).status_code(), 422);
        assert_eq!(RoomError::PoolExhausted.status_code(), 503);
        assert_eq!(RoomError::Provider("x".to_string()).status_code(), 503);
        assert_eq!(RoomError::Internal.status_code(), 500);
    }

    #[tokio::test]
    async fn test_into_response_database_error_is_generic() {
        let error = RoomError::Database("password=oops host=db1".to_string());
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body_json = read_body_json(response.into_body()).await;
        assert_eq!(body_json["success"], false);
        assert_eq!(body_json["error"]["code"], "databaseError");
        // Internal details must not leak to the client
        assert!(!body_json["error"]["message"]
            .as_str()
            .unwrap()
            .contains("password"));
    }

    #[tokio::test]
    async fn test_into_response_access_code_mismatch() {
        let response = RoomError::AccessCodeMismatch.into_response();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let body_json = read_body_json(response.into_body()).await;
        assert_eq!(body_json["error"]["code"], "accessCodeNotMatch");
    }

    #[tokio::test]
    async fn test_into_response_not_started_yet_maps_to_meeting_not_found() {
        let response = RoomError::NotStartedYet.into_response();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let body_json = read_body_json(response.into_body()).await;
        assert_eq!(body_json["error"]["code"], "meetingNotFound");
    }

    #[tokio::test]
    async fn test_into_response_registration_required() {
        let response =
            RoomError::PermissionDenied(DeniedReason::RegistrationRequired).into_response();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let body_json = read_body_json(response.into_body()).await;
        assert_eq!(body_json["error"]["code"], "userAndUserEventIsRequired");
    }

    #[tokio::test]
    async fn test_into_response_pool_exhausted() {
        let response = RoomError::PoolExhausted.into_response();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body_json = read_body_json(response.into_body()).await;
        assert_eq!(body_json["error"]["code"], "poolExhausted");
        assert!(body_json["error"]["message"]
            .as_str()
            .unwrap()
            .contains("more accounts"));
    }

    #[tokio::test]
    async fn test_into_response_provider_error_is_generic() {
        let error = RoomError::Provider("connect timeout to 10.0.0.5".to_string());
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body_json = read_body_json(response.into_body()).await;
        assert_eq!(body_json["error"]["code"], "providerError");
        assert!(!body_json["error"]["message"]
            .as_str()
            .unwrap()
            .contains("10.0.0.5"));
    }

    #[tokio::test]
    async fn test_into_response_validation() {
        let error = RoomError::Validation("access code must be exactly 6 characters".to_string());
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body_json = read_body_json(response.into_body()).await;
        assert_eq!(body_json["error"]["code"], "validationError");
        assert_eq!(
            body_json["error"]["message"],
            "access code must be exactly 6 characters"
        );
    }
}
