//! Live Session Room Orchestrator Library
//!
//! This library provides the core functionality for the Atrium live-room
//! orchestrator - the subsystem that:
//!
//! - Allocates pooled external host accounts to scheduled live sessions
//! - Drives rooms through their lifecycle from asynchronous, possibly
//!   duplicated and out-of-order provider webhooks
//! - Decides per-user start-vs-join semantics
//! - Tracks live presence per room
//!
//! # Architecture
//!
//! The service follows the Handler -> Service -> Repository pattern:
//!
//! ```text
//! routes/mod.rs -> handlers/*.rs -> services/*.rs -> repositories/*.rs
//! ```
//!
//! There is no in-process coordinator: any number of instances run
//! concurrently and agree through Postgres (guarded transitions, partial
//! unique index) and Redis (TTL-bound account locks).
//!
//! # Modules
//!
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status and reason-code mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - Bearer-token resolution
//! - `models` - Data models and webhook envelope types
//! - `observability` - Metrics
//! - `redis` - Distributed account locks
//! - `repositories` - Database access
//! - `routes` - Axum router setup
//! - `services` - Pool, allocator, lifecycle, broker, presence, seams

pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod redis;
pub mod repositories;
pub mod routes;
pub mod services;
