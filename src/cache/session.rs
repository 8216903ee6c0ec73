//! Session-scoped tier
//!
//! Lives for the browsing session rather than the process: contents are
//! serialized into a [`BlobStorage`] after every change and reloaded when the
//! store is opened again. Bounded by entry count and a soft byte budget.

use std::collections::HashMap;

use super::blob::{encode_entries, load_entries, BlobStorage, MemoryBlob};
use super::entry::{CacheEntry, Tier};
use super::quota::{PersistOutcome, QuotaManager, QuotaPolicy};
use super::store::{KvStore, StorageUsage, StoreError};
use crate::model::StorageKey;

pub struct SessionStore {
    entries: HashMap<StorageKey, CacheEntry>,
    blob: Box<dyn BlobStorage>,
    quota: QuotaManager,
    /// Size of the last snapshot written to the blob
    serialized_bytes: usize,
}

impl SessionStore {
    /// Open the tier over `blob`, loading whatever it already holds
    pub fn open(blob: Box<dyn BlobStorage>, policy: QuotaPolicy) -> Self {
        let entries = load_entries(blob.as_ref());
        let serialized_bytes = encode_entries(&entries).map(|s| s.len()).unwrap_or(0);
        let mut quota = QuotaManager::new(Tier::Session, policy);
        quota.seed(&entries);
        log::debug!("[session] opened with {} entries", entries.len());

        Self {
            entries,
            blob,
            quota,
            serialized_bytes,
        }
    }

    /// Tier backed by a process-local blob sized to the policy's quota
    pub fn in_memory(policy: QuotaPolicy) -> Self {
        Self::open(Box::new(MemoryBlob::new(policy.quota_bytes)), policy)
    }

    fn persist(&mut self) -> Result<(), StoreError> {
        let blob = &mut self.blob;
        let mut written = 0;
        let outcome = self.quota.persist(&mut self.entries, |entries| {
            let contents = encode_entries(entries)?;
            blob.save(&contents)?;
            written = contents.len();
            Ok(())
        })?;

        match outcome {
            PersistOutcome::Written => {}
            PersistOutcome::Pruned { evicted } => {
                log::warn!("[session] evicted {} entries to fit quota", evicted);
            }
            PersistOutcome::Cleared => {
                log::warn!("[session] cleared after repeated quota failures, write dropped");
                if let Err(e) = self.blob.remove() {
                    log::warn!("[session] failed to remove blob: {}", e);
                }
                written = 0;
            }
        }

        self.serialized_bytes = written;
        Ok(())
    }
}

impl KvStore for SessionStore {
    fn tier(&self) -> Tier {
        Tier::Session
    }

    fn get(&mut self, key: &StorageKey) -> Result<Option<CacheEntry>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    /// A write the blob rejects is taken back out of the map
    fn set(&mut self, key: &StorageKey, entry: CacheEntry) -> Result<(), StoreError> {
        let previous = self.entries.insert(key.clone(), entry);
        let previous_stamp = self.quota.record_write(key);
        let evicted = self.quota.enforce(&mut self.entries);
        if evicted > 0 {
            log::debug!("[session] evicted {} oldest entries", evicted);
        }

        let result = self.persist();
        if result.is_err() {
            match previous {
                Some(previous) => self.entries.insert(key.clone(), previous),
                None => self.entries.remove(key),
            };
            self.quota.revert_write(key, previous_stamp);
        }
        result
    }

    fn delete(&mut self, key: &StorageKey) -> Result<(), StoreError> {
        if self.entries.remove(key).is_some() {
            self.persist()?;
        }
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
        self.quota.reset();
        self.serialized_bytes = 0;
        self.blob.remove()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    /// One rewrite for the whole partition instead of one per entry
    fn remove_partition(&mut self, project_id: &str) -> Result<usize, StoreError> {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.key.project_id() != project_id);
        let removed = before - self.entries.len();
        if removed > 0 {
            self.persist()?;
        }
        Ok(removed)
    }

    fn usage(&self) -> Option<StorageUsage> {
        Some(StorageUsage {
            used: self.serialized_bytes,
            capacity: self.quota.policy().quota_bytes,
        })
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod session_tests;
