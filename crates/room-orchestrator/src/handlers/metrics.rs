//! Prometheus metrics endpoint handler.
//!
//! Provides the `/metrics` endpoint for Prometheus scraping.
//!
//! # Security
//!
//! This endpoint is unauthenticated to allow Prometheus to scrape metrics.
//! No PII or secrets are exposed in metrics, only operational data with
//! bounded cardinality labels.

use crate::routes::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, response::Response};
use std::sync::Arc;

/// Handler for GET /metrics
///
/// Returns Prometheus-formatted metrics for scraping. This is an
/// operational endpoint, not part of the product API.
///
/// The exporter handle is optional in state: test harnesses run without a
/// recorder (it can only be installed once per process), in which case the
/// endpoint reports 404.
#[tracing::instrument(skip_all, name = "room.metrics.scrape")]
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    match &state.metrics_handle {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics exporter disabled").into_response(),
    }
}

#[cfg(test)]
mod tests {
    // Testing the endpoint requires a PrometheusHandle, which can only be
    // created once per process via PrometheusBuilder. Metric recording
    // itself is covered by the observability module tests.
}
