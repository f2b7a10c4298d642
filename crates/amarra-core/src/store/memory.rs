//! In-memory implementation of the `KvStore` contract.
//!
//! Exists for tests, local development, and single-process deployments where
//! an external store is not worth operating. Not durable: all state is lost
//! on restart, and there is no cross-process sharing — the atomicity
//! guarantees hold only within one process.
//!
//! TTLs are tracked against `tokio::time::Instant`, so tests running under a
//! paused clock (`tokio::time::pause`) exercise expiry deterministically.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::StoreResult;
use crate::store::KvStore;

struct StringEntry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

#[derive(Default)]
struct Inner {
    strings: HashMap<String, StringEntry>,
    lists: HashMap<String, VecDeque<Vec<u8>>>,
    /// Members kept sorted by score; ties preserve insertion order.
    zsets: HashMap<String, Vec<(u64, Vec<u8>)>>,
}

impl Inner {
    /// Drop the string entry at `key` if its TTL has lapsed.
    fn purge(&mut self, key: &str) {
        let expired = self
            .strings
            .get(key)
            .and_then(|e| e.expires_at)
            .is_some_and(|at| at <= Instant::now());
        if expired {
            self.strings.remove(key);
        }
    }
}

/// In-process `KvStore`.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    /// Woken on every list push so blocked `move_blocking` callers re-check.
    writes: Notify,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn set_if_absent(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<bool> {
        let mut inner = self.lock();
        inner.purge(key);
        if inner.strings.contains_key(key) {
            return Ok(false);
        }
        inner.strings.insert(
            key.to_string(),
            StringEntry {
                value: value.to_vec(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(true)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut inner = self.lock();
        inner.purge(key);
        Ok(inner.strings.contains_key(key))
    }

    async fn delete_if_exists(&self, key: &str) -> StoreResult<bool> {
        let mut inner = self.lock();
        inner.purge(key);
        Ok(inner.strings.remove(key).is_some())
    }

    async fn refresh_ttl(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let mut inner = self.lock();
        inner.purge(key);
        match inner.strings.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>> {
        let mut inner = self.lock();
        inner.purge(key);
        Ok(inner
            .strings
            .get(key)
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(Instant::now())))
    }

    async fn push_back(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        {
            let mut inner = self.lock();
            inner
                .lists
                .entry(key.to_string())
                .or_default()
                .push_back(value.to_vec());
        }
        self.writes.notify_waiters();
        Ok(())
    }

    async fn push_back_many(&self, items: &[(String, Vec<u8>)]) -> StoreResult<()> {
        {
            let mut inner = self.lock();
            for (key, value) in items {
                inner
                    .lists
                    .entry(key.clone())
                    .or_default()
                    .push_back(value.clone());
            }
        }
        self.writes.notify_waiters();
        Ok(())
    }

    async fn move_blocking(
        &self,
        source: &str,
        dest: &str,
        timeout: Duration,
    ) -> StoreResult<Option<Vec<u8>>> {
        let deadline = Instant::now() + timeout;
        loop {
            // Register for wakeups before checking, so a push between the
            // check and the await cannot be missed.
            let notified = self.writes.notified();
            {
                let mut inner = self.lock();
                let popped = inner.lists.get_mut(source).and_then(VecDeque::pop_front);
                if let Some(value) = popped {
                    inner
                        .lists
                        .entry(dest.to_string())
                        .or_default()
                        .push_back(value.clone());
                    return Ok(Some(value));
                }
            }
            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep_until(deadline) => return Ok(None),
            }
        }
    }

    async fn remove_value(&self, key: &str, value: &[u8]) -> StoreResult<u64> {
        let mut inner = self.lock();
        let Some(list) = inner.lists.get_mut(key) else {
            return Ok(0);
        };
        let before = list.len();
        list.retain(|v| v != value);
        let removed = (before - list.len()) as u64;
        if list.is_empty() {
            inner.lists.remove(key);
        }
        Ok(removed)
    }

    async fn list_len(&self, key: &str) -> StoreResult<u64> {
        let inner = self.lock();
        Ok(inner.lists.get(key).map_or(0, |l| l.len() as u64))
    }

    async fn list_range(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<Vec<u8>>> {
        let inner = self.lock();
        let Some(list) = inner.lists.get(key) else {
            return Ok(Vec::new());
        };
        let len = list.len() as i64;
        let resolve = |idx: i64| -> i64 {
            if idx < 0 { len + idx } else { idx }
        };
        let from = resolve(start).max(0);
        let to = resolve(stop).min(len - 1);
        if from > to {
            return Ok(Vec::new());
        }
        Ok(list
            .iter()
            .skip(from as usize)
            .take((to - from + 1) as usize)
            .cloned()
            .collect())
    }

    async fn zadd(&self, key: &str, score: u64, member: &[u8]) -> StoreResult<()> {
        let mut inner = self.lock();
        let set = inner.zsets.entry(key.to_string()).or_default();
        set.retain(|(_, m)| m != member);
        set.push((score, member.to_vec()));
        set.sort_by_key(|(s, _)| *s);
        Ok(())
    }

    async fn zpop_by_score(&self, key: &str, max_score: u64) -> StoreResult<Vec<Vec<u8>>> {
        let mut inner = self.lock();
        let Some(set) = inner.zsets.get_mut(key) else {
            return Ok(Vec::new());
        };
        // The set is sorted, so due members form a prefix.
        let due = set.iter().take_while(|(s, _)| *s <= max_score).count();
        let popped = set.drain(..due).map(|(_, m)| m).collect();
        if set.is_empty() {
            inner.zsets.remove(key);
        }
        Ok(popped)
    }

    async fn zrange_by_score(&self, key: &str, max_score: u64) -> StoreResult<Vec<Vec<u8>>> {
        let inner = self.lock();
        let Some(set) = inner.zsets.get(key) else {
            return Ok(Vec::new());
        };
        Ok(set
            .iter()
            .take_while(|(s, _)| *s <= max_score)
            .map(|(_, m)| m.clone())
            .collect())
    }

    async fn zrem(&self, key: &str, member: &[u8]) -> StoreResult<bool> {
        let mut inner = self.lock();
        let Some(set) = inner.zsets.get_mut(key) else {
            return Ok(false);
        };
        let before = set.len();
        set.retain(|(_, m)| m != member);
        let removed = set.len() != before;
        if set.is_empty() {
            inner.zsets.remove(key);
        }
        Ok(removed)
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
