//! Durable TTL-bound tier
//!
//! Survives restarts through its blob. Two secondary indexes sit beside the
//! entry map: one ordered by creation time for age-based range deletes and
//! one by project for partition deletes. Expired entries are never returned;
//! they are swept opportunistically on a fraction of writes rather than on
//! every write.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, TimeDelta, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::blob::{encode_entries, load_entries, BlobStorage, MemoryBlob};
use super::entry::{CacheEntry, Tier};
use super::quota::{PersistOutcome, QuotaManager, QuotaPolicy};
use super::store::{KvStore, StorageUsage, StoreError};
use crate::model::StorageKey;

pub struct DurableStore {
    entries: HashMap<StorageKey, CacheEntry>,
    by_age: BTreeSet<(i64, StorageKey)>,
    by_project: HashMap<String, BTreeSet<StorageKey>>,
    blob: Box<dyn BlobStorage>,
    quota: QuotaManager,
    ttl: TimeDelta,
    cleanup_probability: f64,
    rng: StdRng,
    serialized_bytes: usize,
}

impl DurableStore {
    /// Open the tier over `blob`, dropping entries that already expired
    pub fn open(
        blob: Box<dyn BlobStorage>,
        policy: QuotaPolicy,
        ttl: TimeDelta,
        cleanup_probability: f64,
    ) -> Self {
        let mut store = Self {
            entries: load_entries(blob.as_ref()),
            by_age: BTreeSet::new(),
            by_project: HashMap::new(),
            blob,
            quota: QuotaManager::new(Tier::Durable, policy),
            ttl,
            cleanup_probability: cleanup_probability.clamp(0.0, 1.0),
            rng: StdRng::from_os_rng(),
            serialized_bytes: 0,
        };
        store.reindex();
        store.quota.seed(&store.entries);
        let expired = store.purge_expired(Utc::now());
        store.serialized_bytes = encode_entries(&store.entries)
            .map(|s| s.len())
            .unwrap_or(0);
        log::debug!(
            "[durable] opened with {} entries ({} expired on load)",
            store.entries.len(),
            expired
        );
        store
    }

    pub fn in_memory(policy: QuotaPolicy, ttl: TimeDelta, cleanup_probability: f64) -> Self {
        Self::open(
            Box::new(MemoryBlob::new(policy.quota_bytes)),
            policy,
            ttl,
            cleanup_probability,
        )
    }

    /// Replace the cleanup sampler, for deterministic sweeps
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn ttl(&self) -> TimeDelta {
        self.ttl
    }

    /// Range-delete every entry created before `now - ttl`
    ///
    /// Only touches the in-memory map; the blob catches up on the next write.
    pub fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let Some(cutoff) = now.checked_sub_signed(self.ttl) else {
            return 0;
        };
        let cutoff = cutoff.timestamp_millis();
        let expired: Vec<StorageKey> = self
            .by_age
            .iter()
            .take_while(|(created_ms, _)| *created_ms < cutoff)
            .map(|(_, key)| key.clone())
            .collect();

        for key in &expired {
            self.remove_indexed(key);
        }
        expired.len()
    }

    fn index(&mut self, key: &StorageKey, entry: &CacheEntry) {
        self.by_age.insert((entry.created_ms(), key.clone()));
        self.by_project
            .entry(entry.key.project_id().to_string())
            .or_default()
            .insert(key.clone());
    }

    fn unindex(&mut self, key: &StorageKey, entry: &CacheEntry) {
        self.by_age.remove(&(entry.created_ms(), key.clone()));
        let project = entry.key.project_id();
        if let Some(keys) = self.by_project.get_mut(project) {
            keys.remove(key);
            if keys.is_empty() {
                self.by_project.remove(project);
            }
        }
    }

    fn remove_indexed(&mut self, key: &StorageKey) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.unindex(key, &entry);
        Some(entry)
    }

    /// Rebuild both indexes after a bulk change to the entry map
    fn reindex(&mut self) {
        self.by_age.clear();
        self.by_project.clear();
        let entries = std::mem::take(&mut self.entries);
        for (key, entry) in &entries {
            self.index(key, entry);
        }
        self.entries = entries;
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
                log::warn!("[durable] evicted {} entries to fit quota", evicted);
                self.reindex();
            }
            PersistOutcome::Cleared => {
                log::warn!("[durable] cleared after repeated quota failures, write dropped");
                self.reindex();
                if let Err(e) = self.blob.remove() {
                    log::warn!("[durable] failed to remove blob: {}", e);
                }
                written = 0;
            }
        }

        self.serialized_bytes = written;
        Ok(())
    }
}

impl KvStore for DurableStore {
    fn tier(&self) -> Tier {
        Tier::Durable
    }

    fn get(&mut self, key: &StorageKey) -> Result<Option<CacheEntry>, StoreError> {
        let expired = match self.entries.get(key) {
            None => return Ok(None),
            Some(entry) => entry.is_expired(self.ttl, Utc::now()),
        };

        if expired {
            log::debug!("[durable] entry {} expired", key);
            self.remove_indexed(key);
            return Ok(None);
        }
        Ok(self.entries.get(key).cloned())
    }

    /// A write the blob rejects is taken back out of the map
    fn set(&mut self, key: &StorageKey, entry: CacheEntry) -> Result<(), StoreError> {
        let previous = self.remove_indexed(key);
        self.index(key, &entry);
        self.entries.insert(key.clone(), entry);
        let previous_stamp = self.quota.record_write(key);

        if self.cleanup_probability > 0.0 && self.rng.random_bool(self.cleanup_probability) {
            let purged = self.purge_expired(Utc::now());
            if purged > 0 {
                log::debug!("[durable] swept {} expired entries", purged);
            }
        }

        if self.quota.enforce(&mut self.entries) > 0 {
            self.reindex();
        }

        let result = self.persist();
        if result.is_err() {
            self.remove_indexed(key);
            if let Some(previous) = previous {
                self.index(key, &previous);
                self.entries.insert(key.clone(), previous);
            }
            self.quota.revert_write(key, previous_stamp);
        }
        result
    }

    fn delete(&mut self, key: &StorageKey) -> Result<(), StoreError> {
        if self.remove_indexed(key).is_some() {
            self.persist()?;
        }
        Ok(())
    }

    fn scan(
        &self,
        predicate: &dyn Fn(&StorageKey, &CacheEntry) -> bool,
    ) -> Result<Vec<(StorageKey, CacheEntry)>, StoreError> {
        let now = Utc::now();
        Ok(self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired(self.ttl, now))
            .filter(|(key, entry)| predicate(key, entry))
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        self.entries.clear();
        self.quota.reset();
        self.by_age.clear();
        self.by_project.clear();
        self.serialized_bytes = 0;
        self.blob.remove()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn remove_partition(&mut self, project_id: &str) -> Result<usize, StoreError> {
        let Some(keys) = self.by_project.remove(project_id) else {
            return Ok(0);
        };
        for key in &keys {
            if let Some(entry) = self.entries.remove(key) {
                self.by_age.remove(&(entry.created_ms(), key.clone()));
            }
        }
        self.persist()?;
        Ok(keys.len())
    }

    fn usage(&self) -> Option<StorageUsage> {
        Some(StorageUsage {
            used: self.serialized_bytes,
            capacity: self.quota.policy().quota_bytes,
        })
    }
}

#[cfg(test)]
#[path = "durable_tests.rs"]
mod durable_tests;
