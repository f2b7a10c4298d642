use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Retry ceiling applied when neither the publisher nor the subscriber set one.
pub const DEFAULT_MAX_RETRY: u32 = 3;

/// Upper bound on the retry backoff delay.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Core message domain type. This is the serialized form stored in the ready,
/// processing, dead-letter and delay structures — the exact bytes act as the
/// entry's identity for removal, so the struct must round-trip stably.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: Uuid,
    pub topic: String,
    pub payload: Vec<u8>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// Delivery attempts consumed so far. Starts at 0, incremented on each
    /// handler failure; exceeding `max_retry` routes the message to the
    /// dead-letter list.
    pub retry: u32,
    pub max_retry: u32,
    /// Requested delivery delay in milliseconds (0 for immediate publish).
    #[serde(default)]
    pub delay_ms: u64,
    pub created_at_ms: u64,
    /// Set if and only if the message is currently staged in the delay
    /// structure.
    pub scheduled_at_ms: Option<u64>,
}

impl Message {
    /// Build a message ready for immediate publish.
    pub fn new(topic: impl Into<String>, payload: Vec<u8>, opts: &PublishOptions) -> Self {
        Self {
            id: Uuid::now_v7(),
            topic: topic.into(),
            payload,
            headers: opts.headers.clone(),
            metadata: opts.metadata.clone(),
            retry: 0,
            max_retry: opts.max_retry,
            delay_ms: 0,
            created_at_ms: epoch_ms(),
            scheduled_at_ms: None,
        }
    }

    /// Fill in identity fields a caller-built message may lack: a nil id gets
    /// a fresh UUIDv7, a zero `created_at_ms` gets the current time.
    pub(crate) fn ensure_identity(&mut self, now_ms: u64) {
        if self.id.is_nil() {
            self.id = Uuid::now_v7();
        }
        if self.created_at_ms == 0 {
            self.created_at_ms = now_ms;
        }
    }

    /// Capped linear backoff for the current retry count: `retry` seconds,
    /// at most `MAX_BACKOFF`. The subscription's `retry_delay` is advisory
    /// only; the actual schedule always derives from the retry count.
    pub fn backoff(&self) -> Duration {
        MAX_BACKOFF.min(Duration::from_secs(u64::from(self.retry)))
    }
}

/// Options recognized by the publish operations.
#[derive(Debug, Clone)]
pub struct PublishOptions {
    pub headers: HashMap<String, String>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub max_retry: u32,
    /// Accepted for forward compatibility; not yet applied to scheduling.
    pub priority: u32,
    /// Accepted for forward compatibility; not yet applied to scheduling.
    pub expiration: Option<Duration>,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            headers: HashMap::new(),
            metadata: HashMap::new(),
            max_retry: DEFAULT_MAX_RETRY,
            priority: 0,
            expiration: None,
        }
    }
}

/// Options recognized by `Queue::subscribe`.
#[derive(Debug, Clone)]
pub struct SubscribeOptions {
    /// Number of independent worker loops for this subscription.
    pub concurrency: usize,
    /// Retry ceiling applied to messages that carry `max_retry == 0`
    /// (publish-time values win otherwise).
    pub max_retry: u32,
    /// Advisory base delay; the actual backoff is computed from the retry
    /// count (see `Message::backoff`).
    pub retry_delay: Duration,
    /// Bound on a single handler invocation. Also the threshold after which
    /// an unacknowledged claim is swept back to the ready list.
    pub ack_timeout: Option<Duration>,
    /// Accepted for forward compatibility; not yet applied.
    pub prefetch_count: usize,
    /// Accepted for forward compatibility; not yet applied.
    pub auto_ack: bool,
}

impl SubscribeOptions {
    pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(30);
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            max_retry: DEFAULT_MAX_RETRY,
            retry_delay: Duration::from_secs(1),
            ack_timeout: Some(Self::DEFAULT_ACK_TIMEOUT),
            prefetch_count: 0,
            auto_ack: false,
        }
    }
}

/// Current wall-clock time as milliseconds since the Unix epoch.
pub(crate) fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
