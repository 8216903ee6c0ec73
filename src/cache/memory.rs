//! Process-lifetime memory tier

use std::collections::HashMap;

use super::entry::{CacheEntry, Tier};
use super::store::{KvStore, StoreError};
use crate::model::StorageKey;

/// Unbounded map with no TTL; the other tiers bound what reaches it
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: HashMap<StorageKey, CacheEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryStore {
    fn tier(&self) -> Tier {
        Tier::Memory
    }

    fn get(&mut self, key: &StorageKey) -> Result<Option<CacheEntry>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &StorageKey, entry: CacheEntry) -> Result<(), StoreError> {
        self.entries.insert(key.clone(), entry);
        Ok(())
    }

    fn delete(&mut self, key: &StorageKey) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }

    fn scan(
        &self,
        predicate: &dyn Fn(&StorageKey, &CacheEntry) -> bool,
    ) -> Result<Vec<(StorageKey, CacheEntry)>, StoreError> {
        Ok(self
            .entries
            .iter()
            .filter(|(key, entry)| predicate(key, entry))
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        self.entries.clear();
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
