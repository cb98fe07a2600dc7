//! Account pool service.
//!
//! Reserves one free pooled host account for a session start. Candidates
//! are probed in randomized order so that no single account becomes the
//! default first choice across the fleet, and every probe happens under a
//! TTL-bound distributed lock so concurrent starts on different instances
//! never double-book an account.
//!
//! The winning account is returned with its lock still held. Release
//! happens when the `started` webhook confirms the room is live, or via
//! TTL expiry when the allocation attempt dies mid-flight.
//!
//! A known race remains: the busy check and create-meeting are not one
//! atomic step, so a lock expiring mid-flight can let two allocations pass
//! for the same account. This is accepted as an eventual-consistency risk;
//! the one-living-room-per-session index keeps the core invariant intact.

use crate::errors::RoomError;
use crate::models::AccountRow;
use crate::observability::metrics;
use crate::redis::lock::{AccountLockManager, LockToken};
use crate::repositories::AccountsRepository;
use crate::services::provider::{HostCredentials, ProviderClient};
use ring::rand::{SecureRandom, SystemRandom};
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

/// An account reserved for allocation, with its pool lock still held.
pub struct AcquiredAccount {
    /// The reserved account.
    pub account: AccountRow,
    /// Holder token of the distributed lock.
    pub lock: LockToken,
}

/// Service for reserving pooled host accounts.
pub struct AccountPoolService;

impl AccountPoolService {
    /// Reserve a free account for a session start.
    ///
    /// For each enabled account, in randomized order:
    /// 1. Try the distributed lock; held elsewhere means another request is
    ///    already probing it - skip.
    /// 2. Ask the provider how many meetings the account currently hosts.
    /// 3. Zero active meetings: return the account with the lock held.
    ///    Otherwise release the lock and continue.
    ///
    /// # Errors
    ///
    /// - `RoomError::PoolExhausted` - every account is locked or busy
    /// - `RoomError::Database` - catalog read failed
    #[instrument(skip_all, fields(session_id = %session_id))]
    pub async fn acquire(
        pool: &PgPool,
        locks: &dyn AccountLockManager,
        provider: &dyn ProviderClient,
        session_id: Uuid,
    ) -> Result<AcquiredAccount, RoomError> {
        let accounts = AccountsRepository::list_enabled(pool).await?;

        if accounts.is_empty() {
            tracing::warn!(
                target: "room.services.pool",
                session_id = %session_id,
                "No host accounts configured"
            );
            metrics::record_pool_exhausted();
            return Err(RoomError::PoolExhausted);
        }

        for index in shuffled_indices(accounts.len(), None) {
            let Some(account) = accounts.get(index) else {
                continue;
            };

            let Some(token) = locks.try_acquire(account.account_id).await? else {
                tracing::debug!(
                    target: "room.services.pool",
                    account_id = %account.account_id,
                    "Account lock held elsewhere, skipping"
                );
                continue;
            };

            match Self::probe_account(provider, account).await {
                Ok(0) => {
                    tracing::info!(
                        target: "room.services.pool",
                        session_id = %session_id,
                        account_id = %account.account_id,
                        label = %account.label,
                        "Reserved free host account"
                    );
                    return Ok(AcquiredAccount {
                        account: account.clone(),
                        lock: token,
                    });
                }
                Ok(active) => {
                    tracing::debug!(
                        target: "room.services.pool",
                        account_id = %account.account_id,
                        active_meetings = active,
                        "Account busy, releasing lock"
                    );
                    Self::release_quietly(locks, account.account_id, &token).await;
                }
                Err(e) => {
                    // An unreachable provider proves nothing about the
                    // account; treat it as unavailable for this pass.
                    tracing::warn!(
                        target: "room.services.pool",
                        account_id = %account.account_id,
                        error = %e,
                        "Provider probe failed, releasing lock"
                    );
                    Self::release_quietly(locks, account.account_id, &token).await;
                }
            }
        }

        tracing::warn!(
            target: "room.services.pool",
            session_id = %session_id,
            tried = accounts.len(),
            "All host accounts locked or busy"
        );
        metrics::record_pool_exhausted();
        Err(RoomError::PoolExhausted)
    }

    async fn probe_account(
        provider: &dyn ProviderClient,
        account: &AccountRow,
    ) -> Result<u32, RoomError> {
        let creds = HostCredentials::from_account(account);
        provider.active_meeting_count(&creds).await
    }

    async fn release_quietly(locks: &dyn AccountLockManager, account_id: Uuid, token: &LockToken) {
        if let Err(e) = locks.release(account_id, token).await {
            // The TTL will reclaim the lock; nothing else to do here.
            tracing::warn!(
                target: "room.services.pool",
                account_id = %account_id,
                error = %e,
                "Failed to release account lock, TTL will reclaim it"
            );
        }
    }
}

/// Produce a random permutation of `0..len`.
///
/// The randomized probe order is deliberate load-spreading policy, not an
/// accident, so it lives in one seedable function: passing `Some(seed)`
/// yields a deterministic permutation for tests, `None` draws the seed from
/// the system CSPRNG.
pub fn shuffled_indices(len: usize, seed: Option<u64>) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..len).collect();
    if len < 2 {
        return indices;
    }

    let mut state = match seed {
        Some(s) if s != 0 => s,
        Some(_) => 1,
        None => {
            let rng = SystemRandom::new();
            let mut bytes = [0u8; 8];
            if rng.fill(&mut bytes).is_err() {
                // CSPRNG failure leaves catalog order; allocation still works,
                // only the load-spreading degrades.
                tracing::warn!(
                    target: "room.services.pool",
                    "CSPRNG failed, falling back to catalog order"
                );
                return indices;
            }
            u64::from_le_bytes(bytes) | 1
        }
    };

    // Fisher-Yates driven by xorshift64
    for i in (1..len).rev() {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        let j = (state % (i as u64 + 1)) as usize;
        indices.swap(i, j);
    }

    indices
}
