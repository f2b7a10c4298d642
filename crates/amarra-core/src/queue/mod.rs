mod scheduler;
mod stats;
mod worker;

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::QueueConfig;
use crate::error::{QueueError, QueueResult, StoreError};
use crate::message::{self, Message, PublishOptions, SubscribeOptions};
use crate::store::{KvStore, keys};

pub use stats::HealthStatus;

/// Subscriber callback. Returning an error counts one retry against the
/// message; the reason is logged but never propagated past the worker loop.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, message: Message) -> anyhow::Result<()>;
}

/// Adapts an async closure to the `Handler` trait.
pub struct HandlerFn<F>(F);

/// Wrap an async closure as a `Handler`.
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(Message) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    HandlerFn(f)
}

#[async_trait]
impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(Message) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn handle(&self, message: Message) -> anyhow::Result<()> {
        (self.0)(message).await
    }
}

/// One active subscription: the cancel signal and the worker tasks it owns.
struct Subscription {
    cancel: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
}

struct SchedulerTask {
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct EngineState {
    running: bool,
    scheduler: Option<SchedulerTask>,
    /// At most one subscription per topic; owned by this engine instance,
    /// cleared on `unsubscribe` and `stop`.
    subscriptions: HashMap<String, Subscription>,
}

/// Reliable queue engine over a shared key-value store.
///
/// At-least-once delivery: a message is claimed by atomically moving it from
/// its topic's ready list to the processing list, so no two workers ever hold
/// the same message at once. Failed handlers reschedule the message through
/// the shared delay structure with a capped linear backoff until the retry
/// budget is spent, after which it lands on the topic's dead-letter list.
pub struct Queue {
    store: Arc<dyn KvStore>,
    config: QueueConfig,
    state: Mutex<EngineState>,
}

impl Queue {
    pub fn new(store: Arc<dyn KvStore>, config: QueueConfig) -> Self {
        Self {
            store,
            config,
            state: Mutex::new(EngineState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn encode(msg: &Message) -> QueueResult<Vec<u8>> {
        Ok(serde_json::to_vec(msg).map_err(StoreError::from)?)
    }

    /// Publish a message for immediate delivery. Store failures surface to
    /// the caller; nothing is retried at this layer.
    pub async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        opts: &PublishOptions,
    ) -> QueueResult<()> {
        let msg = Message::new(topic, payload, opts);
        let raw = Self::encode(&msg)?;
        self.store
            .push_back(&keys::ready(&self.config.namespace, topic), &raw)
            .await?;
        debug!(%topic, msg_id = %msg.id, "message published");
        Ok(())
    }

    /// Stage a message in the delay structure for delivery at `now + delay`.
    /// The ready list is not touched until the scheduler promotes the entry.
    pub async fn publish_with_delay(
        &self,
        topic: &str,
        payload: Vec<u8>,
        delay: Duration,
        opts: &PublishOptions,
    ) -> QueueResult<()> {
        let mut msg = Message::new(topic, payload, opts);
        let scheduled_ms = msg.created_at_ms + delay.as_millis() as u64;
        msg.delay_ms = delay.as_millis() as u64;
        msg.scheduled_at_ms = Some(scheduled_ms);
        let raw = Self::encode(&msg)?;
        // Round the seconds-resolution score up so a delayed message is never
        // promoted before its due time.
        self.store
            .zadd(
                &keys::delayed(&self.config.namespace),
                scheduled_ms.div_ceil(1_000),
                &raw,
            )
            .await?;
        debug!(%topic, msg_id = %msg.id, delay_ms = msg.delay_ms, "message staged for delayed delivery");
        Ok(())
    }

    /// Publish a batch of caller-built messages in one store round-trip.
    /// Missing ids and timestamps are assigned first; partial failure
    /// surfaces as a single error covering the whole batch.
    pub async fn publish_batch(&self, mut messages: Vec<Message>) -> QueueResult<()> {
        let now_ms = message::epoch_ms();
        let mut items = Vec::with_capacity(messages.len());
        for msg in &mut messages {
            msg.ensure_identity(now_ms);
            items.push((
                keys::ready(&self.config.namespace, &msg.topic),
                Self::encode(msg)?,
            ));
        }
        self.store.push_back_many(&items).await?;
        debug!(count = items.len(), "batch published");
        Ok(())
    }

    /// Register the only subscription allowed for `topic` and start its
    /// worker pool (`concurrency` independent loops sharing one cancel
    /// signal).
    pub fn subscribe(
        &self,
        topic: &str,
        handler: Arc<dyn Handler>,
        options: SubscribeOptions,
    ) -> QueueResult<()> {
        let mut state = self.state();
        if state.subscriptions.contains_key(topic) {
            return Err(QueueError::AlreadySubscribed(topic.to_string()));
        }

        let concurrency = options.concurrency.max(1);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let mut workers = Vec::with_capacity(concurrency);
        for worker_id in 0..concurrency {
            let ctx = worker::WorkerContext {
                store: self.store.clone(),
                namespace: self.config.namespace.clone(),
                topic: topic.to_string(),
                handler: handler.clone(),
                options: options.clone(),
                claim_block: Duration::from_millis(self.config.claim_block_ms),
            };
            workers.push(tokio::spawn(worker::run(ctx, cancel_rx.clone(), worker_id)));
        }
        state.subscriptions.insert(
            topic.to_string(),
            Subscription {
                cancel: cancel_tx,
                workers,
            },
        );
        info!(%topic, concurrency, "subscribed");
        Ok(())
    }

    /// Cancel the topic's subscription and wait for all of its workers to
    /// exit. Errors with `NotSubscribed` if the topic has no subscription.
    pub async fn unsubscribe(&self, topic: &str) -> QueueResult<()> {
        let sub = self
            .state()
            .subscriptions
            .remove(topic)
            .ok_or_else(|| QueueError::NotSubscribed(topic.to_string()))?;
        let _ = sub.cancel.send(true);
        for handle in sub.workers {
            let _ = handle.await;
        }
        info!(%topic, "unsubscribed");
        Ok(())
    }

    /// Launch the delay-scheduler loop. Errors if already running.
    pub fn start(&self) -> QueueResult<()> {
        let mut state = self.state();
        if state.running {
            return Err(QueueError::AlreadyStarted);
        }
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let handle = tokio::spawn(scheduler::run(
            self.store.clone(),
            self.config.clone(),
            cancel_rx,
        ));
        state.scheduler = Some(SchedulerTask {
            cancel: cancel_tx,
            handle,
        });
        state.running = true;
        info!("queue engine started");
        Ok(())
    }

    /// Cancel the scheduler and every subscription, then block until all of
    /// their tasks have exited — no task may outlive the engine. A no-op if
    /// not running.
    pub async fn stop(&self) -> QueueResult<()> {
        let (scheduler, subscriptions) = {
            let mut state = self.state();
            if !state.running {
                return Ok(());
            }
            state.running = false;
            (
                state.scheduler.take(),
                std::mem::take(&mut state.subscriptions),
            )
        };

        if let Some(task) = scheduler {
            let _ = task.cancel.send(true);
            let _ = task.handle.await;
        }
        for (topic, sub) in subscriptions {
            let _ = sub.cancel.send(true);
            for handle in sub.workers {
                let _ = handle.await;
            }
            debug!(%topic, "subscription stopped");
        }
        info!("queue engine stopped");
        Ok(())
    }

    /// Read-only health snapshot: engine state plus a store liveness probe.
    pub async fn health(&self) -> HealthStatus {
        let store_healthy = self.store.ping().await.is_ok();
        let state = self.state();
        HealthStatus {
            running: state.running,
            subscriptions: state.subscriptions.len(),
            store_healthy,
        }
    }
}
