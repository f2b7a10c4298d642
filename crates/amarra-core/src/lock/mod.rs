mod mutex;

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use uuid::Uuid;

use crate::error::{LockError, LockResult};
use crate::store::{KvStore, keys};

pub use mutex::{LeaseMutex, MutexOptions};

/// Primitive distributed lock over a single store key.
///
/// Existence of the key is the sole proof of ownership: `release` and
/// `extend` act for any caller who knows the key — no ownership token is
/// compared. The value stored at acquire time is a random id kept for
/// debugging only. Whether the missing token check is intentional is an open
/// question inherited from the original design; it is deliberately not
/// "fixed" here.
#[derive(Clone)]
pub struct DistributedLock {
    store: Arc<dyn KvStore>,
    namespace: String,
}

impl DistributedLock {
    pub fn new(store: Arc<dyn KvStore>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
        }
    }

    /// Single atomic set-if-absent with TTL. Never blocks, never retries;
    /// `false` is lock contention, not an error.
    pub async fn acquire(&self, name: &str, ttl: Duration) -> LockResult<bool> {
        let token = Uuid::now_v7();
        let acquired = self
            .store
            .set_if_absent(
                &keys::lock(&self.namespace, name),
                token.to_string().as_bytes(),
                ttl,
            )
            .await?;
        if acquired {
            debug!(%name, ttl_ms = ttl.as_millis() as u64, "lock acquired");
        }
        Ok(acquired)
    }

    /// Atomic check-then-delete. Errors with `NotHeld` if the key does not
    /// exist (already released or expired).
    pub async fn release(&self, name: &str) -> LockResult<()> {
        if self
            .store
            .delete_if_exists(&keys::lock(&self.namespace, name))
            .await?
        {
            debug!(%name, "lock released");
            Ok(())
        } else {
            Err(LockError::NotHeld)
        }
    }

    /// Atomic check-then-refresh of the key's TTL. Errors with `NotHeld` if
    /// the key does not exist.
    pub async fn extend(&self, name: &str, ttl: Duration) -> LockResult<()> {
        if self
            .store
            .refresh_ttl(&keys::lock(&self.namespace, name), ttl)
            .await?
        {
            Ok(())
        } else {
            Err(LockError::NotHeld)
        }
    }

    /// Inspection only; no side effects.
    pub async fn is_locked(&self, name: &str) -> LockResult<bool> {
        Ok(self
            .store
            .exists(&keys::lock(&self.namespace, name))
            .await?)
    }

    /// Remaining lease time. Errors with `NotHeld` if the key does not exist
    /// or carries no TTL.
    pub async fn ttl(&self, name: &str) -> LockResult<Duration> {
        self.store
            .ttl(&keys::lock(&self.namespace, name))
            .await?
            .ok_or(LockError::NotHeld)
    }
}
