//! HTTP request handlers.

pub mod health;
pub mod join;
pub mod metrics;
pub mod webhooks;

pub use health::health_check;
pub use join::{join_session, viewer_count};
pub use metrics::metrics_handler;
pub use webhooks::{provider_hook, provider_hook_recorded};
