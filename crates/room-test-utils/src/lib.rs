//! Test utilities for the room orchestrator.
//!
//! Provides `TestRoomServer` for spawning real orchestrator instances in
//! integration tests, plus fixture helpers that seed the externally-owned
//! tables (users, sessions, rosters) and the account pool.

pub mod fixtures;
pub mod server_harness;

pub use fixtures::*;
pub use server_harness::TestRoomServer;
