//! Shared fixtures for the end-to-end tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;

use amarra_core::{Handler, Message, MemoryStore, Queue, QueueConfig, handler_fn};

pub const NAMESPACE: &str = "e2e";

/// Queue with a fast scheduler tick and claim block so tests settle quickly.
pub fn test_queue() -> (Arc<Queue>, Arc<MemoryStore>) {
    amarra_core::telemetry::init_tracing();
    let store = Arc::new(MemoryStore::new());
    let config = QueueConfig {
        namespace: NAMESPACE.to_string(),
        scheduler_tick_ms: 100,
        claim_block_ms: 100,
    };
    (Arc::new(Queue::new(store.clone(), config)), store)
}

/// Handler that fails its first `fail_first` invocations, then succeeds,
/// counting every attempt.
pub struct FlakyHandler {
    pub calls: AtomicU32,
    pub fail_first: u32,
}

impl FlakyHandler {
    pub fn new(fail_first: u32) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
            fail_first,
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Handler for FlakyHandler {
    async fn handle(&self, message: Message) -> anyhow::Result<()> {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.fail_first {
            anyhow::bail!("induced failure on attempt {attempt} for {}", message.id);
        }
        Ok(())
    }
}

/// Handler that forwards every received message into a channel.
pub fn recording_handler() -> (Arc<dyn Handler>, mpsc::UnboundedReceiver<Message>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler = Arc::new(handler_fn(move |msg: Message| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(msg);
            Ok(())
        }
    }));
    (handler, rx)
}
