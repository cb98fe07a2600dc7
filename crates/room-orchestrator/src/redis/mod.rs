//! Redis-backed coordination primitives.

pub mod lock;

pub use lock::{AccountLockManager, LockToken, RedisLockManager};
