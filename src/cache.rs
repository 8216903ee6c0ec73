//! Layered search result cache
//!
//! Three tiers sit behind one [`CacheChain`]: a process-lifetime memory map,
//! a session-scoped store bounded by entry count and byte quota, and a
//! durable store whose entries expire after a TTL. Reads go fastest tier
//! first and promote hits upward; writes go to every tier.

mod blob;
mod chain;
mod durable;
mod entry;
mod memory;
mod quota;
mod session;
mod store;

pub use blob::{BlobStorage, FileBlob, MemoryBlob};
pub use chain::{CacheChain, CacheStats, TierStats};
pub use durable::DurableStore;
pub use entry::{CacheEntry, Tier};
pub use memory::MemoryStore;
pub use quota::{PersistOutcome, QuotaManager, QuotaPolicy};
pub use session::SessionStore;
pub use store::{KvStore, StorageUsage, StoreError};
