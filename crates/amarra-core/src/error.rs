/// Low-level store errors (transport, serialization).
/// This is the error type for the `KvStore` trait — store operations can only
/// fail with infrastructure errors, never domain errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Queue-engine errors. Store failures pass through transparently so callers
/// can distinguish transport trouble from misuse of the engine surface.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("already subscribed to topic: {0}")]
    AlreadySubscribed(String),

    #[error("not subscribed to topic: {0}")]
    NotSubscribed(String),

    #[error("queue engine already started")]
    AlreadyStarted,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Lock and lease-mutex errors.
///
/// `NotHeld` is a domain result (the key does not exist), distinct from a
/// transport failure — callers must be able to tell the two apart.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("lock not held")]
    NotHeld,

    #[error("lock not acquired after {0} attempts")]
    NotAcquired(u32),

    #[error("mutex already locked by this instance")]
    AlreadyLocked,

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
pub type QueueResult<T> = std::result::Result<T, QueueError>;
pub type LockResult<T> = std::result::Result<T, LockError>;
