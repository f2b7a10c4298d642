use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::config::MutexConfig;
use crate::error::{LockError, LockResult};
use crate::lock::DistributedLock;
use crate::store::KvStore;

/// Per-mutex tuning. `From<&MutexConfig>` lifts the TOML-level defaults.
#[derive(Debug, Clone)]
pub struct MutexOptions {
    /// Lease TTL set on acquire and on every renewal.
    pub ttl: Duration,
    /// Sleep between acquire attempts in the blocking `lock` path.
    pub retry_interval: Duration,
    /// Acquire attempts before `lock` gives up with `NotAcquired`.
    pub max_attempts: u32,
    pub auto_renew: bool,
    /// Renewal period; must be strictly shorter than `ttl`.
    pub renew_interval: Duration,
}

impl Default for MutexOptions {
    fn default() -> Self {
        Self::from(&MutexConfig::default())
    }
}

impl From<&MutexConfig> for MutexOptions {
    fn from(config: &MutexConfig) -> Self {
        Self {
            ttl: Duration::from_millis(config.ttl_ms),
            retry_interval: Duration::from_millis(config.retry_interval_ms),
            max_attempts: config.max_attempts,
            auto_renew: config.auto_renew,
            renew_interval: Duration::from_millis(config.renew_interval_ms),
        }
    }
}

struct RenewalTask {
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct MutexState {
    locked: bool,
    /// Present only while `locked` is true and auto-renew is enabled.
    renewal: Option<RenewalTask>,
}

/// Lease-based mutual exclusion across processes, built on `DistributedLock`
/// plus process-local bookkeeping and an optional background renewal task.
///
/// The renewal task stops on its first failed extend — the lease then lapses
/// naturally. Holders that need to know they lost the lease mid-critical-
/// section must watch `lease_lost()`.
pub struct LeaseMutex {
    lock: DistributedLock,
    name: String,
    options: MutexOptions,
    state: Mutex<MutexState>,
    lost_tx: watch::Sender<bool>,
}

impl LeaseMutex {
    pub fn new(
        store: Arc<dyn KvStore>,
        namespace: impl Into<String>,
        name: impl Into<String>,
        options: MutexOptions,
    ) -> Self {
        let (lost_tx, _) = watch::channel(false);
        Self {
            lock: DistributedLock::new(store, namespace),
            name: name.into(),
            options,
            state: Mutex::new(MutexState::default()),
            lost_tx,
        }
    }

    fn state(&self) -> MutexGuard<'_, MutexState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Blocking acquire: retries at a fixed interval until the lock is won or
    /// `max_attempts` is exhausted (`NotAcquired`). Errors immediately with
    /// `AlreadyLocked` if this instance already holds the mutex.
    pub async fn lock(&self) -> LockResult<()> {
        if self.state().locked {
            return Err(LockError::AlreadyLocked);
        }
        for attempt in 1..=self.options.max_attempts {
            if self.lock.acquire(&self.name, self.options.ttl).await? {
                self.mark_locked();
                debug!(name = %self.name, attempt, "mutex locked");
                return Ok(());
            }
            if attempt < self.options.max_attempts {
                tokio::time::sleep(self.options.retry_interval).await;
            }
        }
        Err(LockError::NotAcquired(self.options.max_attempts))
    }

    /// Single acquire attempt; `Ok(false)` is contention, not an error.
    pub async fn try_lock(&self) -> LockResult<bool> {
        if self.state().locked {
            return Err(LockError::AlreadyLocked);
        }
        if self.lock.acquire(&self.name, self.options.ttl).await? {
            self.mark_locked();
            debug!(name = %self.name, "mutex locked without waiting");
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Cancel the renewal task, wait for it to exit, then release the store
    /// key. Local state is cleared even when the release reports `NotHeld`
    /// (the lease expired out from under us); that error propagates so the
    /// caller learns the lease was lost.
    pub async fn unlock(&self) -> LockResult<()> {
        let renewal = {
            let mut state = self.state();
            if !state.locked {
                return Err(LockError::NotHeld);
            }
            state.locked = false;
            state.renewal.take()
        };
        if let Some(task) = renewal {
            let _ = task.cancel.send(true);
            let _ = task.handle.await;
        }
        self.lock.release(&self.name).await
    }

    /// `false` without a store round-trip when the local flag says unlocked;
    /// otherwise the store key decides.
    pub async fn is_locked(&self) -> LockResult<bool> {
        if !self.state().locked {
            return Ok(false);
        }
        self.lock.is_locked(&self.name).await
    }

    /// Watch that flips to `true` when the renewal task observed a failed
    /// extend and gave up. Reset on every successful lock.
    pub fn lease_lost(&self) -> watch::Receiver<bool> {
        self.lost_tx.subscribe()
    }

    fn mark_locked(&self) {
        self.lost_tx.send_replace(false);
        let renewal = self.options.auto_renew.then(|| self.spawn_renewal());
        let mut state = self.state();
        // A previous renewal task can linger here only if the lease expired
        // while the local flag was stale; replace it outright.
        if let Some(old) = state.renewal.take() {
            let _ = old.cancel.send(true);
        }
        state.locked = true;
        state.renewal = renewal;
    }

    fn spawn_renewal(&self) -> RenewalTask {
        let lock = self.lock.clone();
        let name = self.name.clone();
        let ttl = self.options.ttl;
        let period = self.options.renew_interval;
        let lost = self.lost_tx.clone();
        let (cancel_tx, mut cancel_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first interval tick fires immediately; skip it so the first
            // extend happens one period after acquire.
            tick.tick().await;
            loop {
                tokio::select! {
                    _ = cancel_rx.changed() => break,
                    _ = tick.tick() => {
                        if let Err(e) = lock.extend(&name, ttl).await {
                            warn!(%name, error = %e, "lease renewal failed, stopping renewal task");
                            let _ = lost.send(true);
                            break;
                        }
                        debug!(%name, "lease renewed");
                    }
                }
            }
        });

        RenewalTask {
            cancel: cancel_tx,
            handle,
        }
    }
}
