pub mod keys;
mod memory;
mod traits;

pub use memory::MemoryStore;
pub use traits::KvStore;
