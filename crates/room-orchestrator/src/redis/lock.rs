//! Distributed per-account locks.
//!
//! Every server instance may try to reserve the same pooled host account
//! concurrently; the only mutual exclusion in the system is this TTL-bound
//! lock. A crashed allocator loses its reservation when the TTL lapses, so
//! an account can never be starved permanently.
//!
//! # Key Pattern
//!
//! - `account:{id}:lock` - holder token, expires after the configured TTL
//!
//! # Connection Pattern
//!
//! The redis-rs `MultiplexedConnection` is designed to be cloned cheaply and
//! used concurrently. No locking is needed - just clone the connection for
//! each operation.

use crate::errors::RoomError;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{Client, Script};
use std::time::Duration;
use tracing::{error, instrument, warn};
use uuid::Uuid;

/// Lua script releasing a lock only when the caller still holds it.
///
/// Arguments:
/// - KEYS[1]: Lock key (e.g., `account:{id}:lock`)
/// - ARGV[1]: Holder token
///
/// Returns:
/// - 1: Released
/// - 0: Not held by this token (expired or taken over), nothing deleted
const RELEASE_IF_HOLDER: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
else
    return 0
end
"#;

/// Opaque holder token for an acquired account lock.
///
/// The token is compared inside Redis on release, so a holder whose lock
/// already expired (and was possibly re-acquired by another instance) can
/// never delete someone else's lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken(String);

impl LockToken {
    fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// The raw token value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Trait for account lock operations (enables mocking).
#[async_trait]
pub trait AccountLockManager: Send + Sync {
    /// Try to acquire the lock for an account.
    ///
    /// Returns `Some(token)` when this caller now holds the lock, `None`
    /// when another holder has it.
    async fn try_acquire(&self, account_id: Uuid) -> Result<Option<LockToken>, RoomError>;

    /// Release the lock if `token` still holds it.
    ///
    /// Returns whether the lock was actually deleted.
    async fn release(&self, account_id: Uuid, token: &LockToken) -> Result<bool, RoomError>;

    /// Unconditionally delete the lock for an account.
    ///
    /// Used by the `started` webhook handler, which may run on a different
    /// instance than the allocator and therefore has no holder token. At
    /// that point the room is confirmed live and the account's busy-state
    /// is tracked through its online status instead.
    async fn force_release(&self, account_id: Uuid) -> Result<(), RoomError>;
}

/// Redis-backed account lock manager.
///
/// This struct is cheaply cloneable - the underlying `MultiplexedConnection`
/// is designed to be shared across tasks.
#[derive(Clone)]
pub struct RedisLockManager {
    /// Multiplexed connection (cheaply cloneable, designed for concurrent use).
    connection: MultiplexedConnection,
    /// Lock TTL.
    ttl: Duration,
    /// Precompiled release script.
    release_script: Script,
}

impl RedisLockManager {
    /// Connect to Redis and build a lock manager.
    ///
    /// # Arguments
    ///
    /// * `redis_url` - Redis connection URL (e.g., `redis://localhost:6379`)
    /// * `ttl` - Lock TTL; an allocation attempt that dies keeps its
    ///   reservation at most this long
    ///
    /// # Errors
    ///
    /// Returns `RoomError::Internal` if connection fails.
    pub async fn connect(redis_url: &str, ttl: Duration) -> Result<Self, RoomError> {
        let client = Client::open(redis_url).map_err(|e| {
            // Note: Do NOT log redis_url as it may contain credentials
            // (e.g., redis://:password@host:port)
            error!(
                target: "room.redis.lock",
                error = %e,
                "Failed to open Redis client"
            );
            RoomError::Internal
        })?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                error!(
                    target: "room.redis.lock",
                    error = %e,
                    "Failed to connect to Redis"
                );
                RoomError::Internal
            })?;

        Ok(Self {
            connection,
            ttl,
            release_script: Script::new(RELEASE_IF_HOLDER),
        })
    }

    fn key(account_id: Uuid) -> String {
        format!("account:{account_id}:lock")
    }
}

#[async_trait]
impl AccountLockManager for RedisLockManager {
    #[instrument(skip_all, fields(account_id = %account_id))]
    async fn try_acquire(&self, account_id: Uuid) -> Result<Option<LockToken>, RoomError> {
        // Clone the connection (cheap operation) for this request
        let mut conn = self.connection.clone();
        let key = Self::key(account_id);
        let token = LockToken::new();

        // SET NX PX: atomically take the lock with a TTL
        let reply: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(token.as_str())
            .arg("NX")
            .arg("PX")
            .arg(self.ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                warn!(
                    target: "room.redis.lock",
                    error = %e,
                    account_id = %account_id,
                    "Failed to acquire account lock"
                );
                RoomError::Internal
            })?;

        Ok(reply.map(|_| token))
    }

    #[instrument(skip_all, fields(account_id = %account_id))]
    async fn release(&self, account_id: Uuid, token: &LockToken) -> Result<bool, RoomError> {
        let mut conn = self.connection.clone();
        let key = Self::key(account_id);

        let deleted: i64 = self
            .release_script
            .key(&key)
            .arg(token.as_str())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| {
                warn!(
                    target: "room.redis.lock",
                    error = %e,
                    account_id = %account_id,
                    "Failed to release account lock"
                );
                RoomError::Internal
            })?;

        Ok(deleted == 1)
    }

    #[instrument(skip_all, fields(account_id = %account_id))]
    async fn force_release(&self, account_id: Uuid) -> Result<(), RoomError> {
        let mut conn = self.connection.clone();
        let key = Self::key(account_id);

        let _: i64 = redis::cmd("DEL")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                warn!(
                    target: "room.redis.lock",
                    error = %e,
                    account_id = %account_id,
                    "Failed to force-release account lock"
                );
                RoomError::Internal
            })?;

        Ok(())
    }
}

/// Mock lock manager module for testing.
pub mod mock {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    /// In-memory lock manager honoring the same holder-token semantics as
    /// the Redis implementation (minus TTL expiry, which tests drive by
    /// calling `force_release`).
    #[derive(Default)]
    pub struct MockLockManager {
        held: Mutex<HashMap<Uuid, String>>,
        /// Accounts whose lock is permanently held by "someone else".
        blocked: Mutex<HashSet<Uuid>>,
    }

    impl MockLockManager {
        /// Create a mock where every acquisition succeeds.
        pub fn new() -> Self {
            Self::default()
        }

        /// Mark an account as locked by another (never-releasing) holder.
        pub fn block(&self, account_id: Uuid) {
            #[allow(clippy::unwrap_used)]
            self.blocked.lock().unwrap().insert(account_id);
        }

        /// Whether an account lock is currently held.
        pub fn is_held(&self, account_id: Uuid) -> bool {
            #[allow(clippy::unwrap_used)]
            let held = self.held.lock().unwrap().contains_key(&account_id);
            #[allow(clippy::unwrap_used)]
            let blocked = self.blocked.lock().unwrap().contains(&account_id);
            held || blocked
        }
    }

    #[async_trait]
    impl AccountLockManager for MockLockManager {
        async fn try_acquire(&self, account_id: Uuid) -> Result<Option<LockToken>, RoomError> {
            #[allow(clippy::unwrap_used)]
            if self.blocked.lock().unwrap().contains(&account_id) {
                return Ok(None);
            }

            #[allow(clippy::unwrap_used)]
            let mut held = self.held.lock().unwrap();
            if held.contains_key(&account_id) {
                return Ok(None);
            }

            let token = LockToken::new();
            held.insert(account_id, token.as_str().to_string());
            Ok(Some(token))
        }

        async fn release(&self, account_id: Uuid, token: &LockToken) -> Result<bool, RoomError> {
            #[allow(clippy::unwrap_used)]
            let mut held = self.held.lock().unwrap();
            match held.get(&account_id) {
                Some(holder) if holder == token.as_str() => {
                    held.remove(&account_id);
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn force_release(&self, account_id: Uuid) -> Result<(), RoomError> {
            #[allow(clippy::unwrap_used)]
            self.held.lock().unwrap().remove(&account_id);
            Ok(())
        }
    }

    #[cfg(test)]
    #[allow(clippy::unwrap_used, clippy::expect_used)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn test_mock_acquire_then_conflict() {
            let locks = MockLockManager::new();
            let account = Uuid::new_v4();

            let token = locks.try_acquire(account).await.unwrap();
            assert!(token.is_some());

            // Second acquisition must fail while held
            let second = locks.try_acquire(account).await.unwrap();
            assert!(second.is_none());
        }

        #[tokio::test]
        async fn test_mock_release_requires_holder_token() {
            let locks = MockLockManager::new();
            let account = Uuid::new_v4();

            let token = locks.try_acquire(account).await.unwrap().unwrap();

            // A foreign token must not release the lock
            let foreign = LockToken::new();
            assert!(!locks.release(account, &foreign).await.unwrap());
            assert!(locks.is_held(account));

            // The holder token does
            assert!(locks.release(account, &token).await.unwrap());
            assert!(!locks.is_held(account));
        }

        #[tokio::test]
        async fn test_mock_force_release_ignores_token() {
            let locks = MockLockManager::new();
            let account = Uuid::new_v4();

            locks.try_acquire(account).await.unwrap().unwrap();
            locks.force_release(account).await.unwrap();

            assert!(!locks.is_held(account));
            assert!(locks.try_acquire(account).await.unwrap().is_some());
        }

        #[tokio::test]
        async fn test_mock_blocked_account_never_acquires() {
            let locks = MockLockManager::new();
            let account = Uuid::new_v4();
            locks.block(account);

            assert!(locks.try_acquire(account).await.unwrap().is_none());
        }
    }
}
