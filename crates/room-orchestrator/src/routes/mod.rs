//! HTTP routes for the room orchestrator.
//!
//! Defines the Axum router and application state. The provider gateway,
//! account lock manager, and notification sender live in the state as
//! trait objects so tests can swap in doubles.

use crate::config::Config;
use crate::handlers;
use crate::middleware::auth::require_auth;
use crate::redis::lock::AccountLockManager;
use crate::services::{NotificationSender, ProviderClient};
use axum::{middleware, routing::get, routing::post, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: PgPool,

    /// Service configuration.
    pub config: Config,

    /// Distributed account lock manager.
    pub locks: Arc<dyn AccountLockManager>,

    /// Meeting provider gateway.
    pub provider: Arc<dyn ProviderClient>,

    /// Notification fanout seam.
    pub notifier: Arc<dyn NotificationSender>,

    /// Prometheus exporter handle; `None` when no recorder is installed
    /// (test harnesses).
    pub metrics_handle: Option<PrometheusHandle>,
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/v1/health` - Health check endpoint (database ping)
/// - `/rooms/hook`, `/rooms/hook/recorded` - provider webhooks (no auth;
///   the provider retries on non-2xx)
/// - `/rooms/{session_id}/join`, `/rooms/{session_id}/viewers` - bearer
///   token required
/// - TraceLayer for request logging
/// - 30 second request timeout
pub fn build_routes(state: Arc<AppState>) -> Router {
    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/v1/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_handler))
        .route("/rooms/hook", post(handlers::provider_hook))
        .route("/rooms/hook/recorded", post(handlers::provider_hook_recorded));

    // Authenticated routes
    let protected_routes = Router::new()
        .route("/rooms/:session_id/join", get(handlers::join_session))
        .route("/rooms/:session_id/viewers", get(handlers::viewer_count))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    // Apply global middleware layers
    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer - Timeout the request (innermost)
    // 2. TraceLayer - Log request details
    public_routes
        .merge(protected_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
}
