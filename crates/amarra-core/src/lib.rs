pub mod config;
pub mod error;
pub mod lock;
pub mod message;
pub mod queue;
pub mod store;
pub mod telemetry;

pub use config::{CoordinatorConfig, MutexConfig, QueueConfig};
pub use error::{LockError, LockResult, QueueError, QueueResult, StoreError, StoreResult};
pub use lock::{DistributedLock, LeaseMutex, MutexOptions};
pub use message::{Message, PublishOptions, SubscribeOptions};
pub use queue::{Handler, HandlerFn, HealthStatus, Queue, handler_fn};
pub use store::{KvStore, MemoryStore};
