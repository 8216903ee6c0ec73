//! Key-value store contract shared by every cache tier

use thiserror::Error;

use super::entry::{CacheEntry, Tier};
use crate::model::StorageKey;

/// Errors a tier backend can report
///
/// None of these ever reach callers of the cache chain; they are logged and
/// turned into misses or dropped writes there.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// The backing storage refused a write because it would exceed its quota
    #[error("Storage quota exceeded: {needed} bytes needed, capacity is {capacity} bytes")]
    QuotaExceeded { needed: usize, capacity: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Byte usage of a tier that serializes its contents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageUsage {
    pub used: usize,
    pub capacity: usize,
}

impl StorageUsage {
    /// Fraction of capacity in use, 0.0 when capacity is zero
    pub fn ratio(&self) -> f64 {
        if self.capacity == 0 {
            0.0
        } else {
            self.used as f64 / self.capacity as f64
        }
    }
}

/// Uniform get/set/delete/scan/clear contract over one cache tier
pub trait KvStore {
    fn tier(&self) -> Tier;

    fn get(&mut self, key: &StorageKey) -> Result<Option<CacheEntry>, StoreError>;

    /// Insert or replace the entry stored under `key` (last write wins)
    fn set(&mut self, key: &StorageKey, entry: CacheEntry) -> Result<(), StoreError>;

    fn delete(&mut self, key: &StorageKey) -> Result<(), StoreError>;

    /// All entries matching `predicate`, in no particular order
    fn scan(
        &self,
        predicate: &dyn Fn(&StorageKey, &CacheEntry) -> bool,
    ) -> Result<Vec<(StorageKey, CacheEntry)>, StoreError>;

    fn clear(&mut self) -> Result<(), StoreError>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delete every entry belonging to `project_id`, returning how many went
    fn remove_partition(&mut self, project_id: &str) -> Result<usize, StoreError> {
        let doomed = self.scan(&|_, entry| entry.key.project_id() == project_id)?;
        for (key, _) in &doomed {
            self.delete(key)?;
        }
        Ok(doomed.len())
    }

    /// Byte usage for tiers with a storage budget
    fn usage(&self) -> Option<StorageUsage> {
        None
    }
}
