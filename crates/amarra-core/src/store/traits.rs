use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreResult;

/// Operation-level contract the coordination layer consumes from the shared
/// key-value store. Implementations must be safe for concurrent use by many
/// tasks; each method must execute atomically on the store side — the
/// conditional operations are the sole consistency mechanism of this crate.
#[async_trait]
pub trait KvStore: Send + Sync {
    // --- String / TTL operations ---

    /// Set `key` to `value` with a TTL only if the key does not exist.
    /// Returns whether the set happened.
    async fn set_if_absent(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<bool>;

    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Atomic check-then-delete. Returns whether a key was deleted.
    async fn delete_if_exists(&self, key: &str) -> StoreResult<bool>;

    /// Atomic check-then-expire: refresh the TTL of an existing key.
    /// Returns false if the key does not exist.
    async fn refresh_ttl(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    /// Remaining TTL, or `None` if the key does not exist or carries no TTL.
    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>>;

    // --- List operations ---

    /// Append a value to the tail of the list at `key`.
    async fn push_back(&self, key: &str, value: &[u8]) -> StoreResult<()>;

    /// Append many (key, value) pairs in a single round-trip. Partial failure
    /// surfaces as one error covering the whole batch.
    async fn push_back_many(&self, items: &[(String, Vec<u8>)]) -> StoreResult<()>;

    /// Atomically pop the head of `source` and push it to the tail of `dest`,
    /// blocking up to `timeout` if `source` is empty. Returns the moved value,
    /// or `None` on timeout.
    async fn move_blocking(
        &self,
        source: &str,
        dest: &str,
        timeout: Duration,
    ) -> StoreResult<Option<Vec<u8>>>;

    /// Remove every list element equal to `value`. Returns the removal count.
    async fn remove_value(&self, key: &str, value: &[u8]) -> StoreResult<u64>;

    async fn list_len(&self, key: &str) -> StoreResult<u64>;

    /// Elements in `[start, stop]` (inclusive, negative indexes count from the
    /// tail, `-1` meaning the last element).
    async fn list_range(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<Vec<u8>>>;

    // --- Sorted-set operations ---

    /// Add (or rescore) a member with the given score.
    async fn zadd(&self, key: &str, score: u64, member: &[u8]) -> StoreResult<()>;

    /// Atomically remove and return all members with `score <= max_score`,
    /// in score order. Read-and-remove is a single step so two concurrent
    /// callers can never observe the same member.
    async fn zpop_by_score(&self, key: &str, max_score: u64) -> StoreResult<Vec<Vec<u8>>>;

    /// Members with `score <= max_score`, in score order, without removing.
    async fn zrange_by_score(&self, key: &str, max_score: u64) -> StoreResult<Vec<Vec<u8>>>;

    /// Remove a member by exact value. Returns whether it was present.
    async fn zrem(&self, key: &str, member: &[u8]) -> StoreResult<bool>;

    // --- Health ---

    /// Round-trip liveness probe.
    async fn ping(&self) -> StoreResult<()>;
}
