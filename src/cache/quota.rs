//! Size and count ceilings for the serialized tiers
//!
//! The manager works directly on a tier's entry map. It evicts the entries
//! written to the tier longest ago first and owns the recovery path for a
//! backend that rejects a write with `QuotaExceeded`: prune hard, retry once,
//! and clear the tier if that also fails.
//!
//! Write order is tracked per tier, not taken from `created_at`: an old entry
//! promoted from a slower tier counts as the newest write.

use std::collections::HashMap;

use super::entry::{CacheEntry, Tier};
use super::store::StoreError;
use crate::model::StorageKey;

/// Fraction of the entry cap kept after a backend rejects a write
const EMERGENCY_KEEP_RATIO: f64 = 0.25;

/// Per-entry overhead in a serialized snapshot (quotes, colon, comma)
const ENTRY_OVERHEAD_BYTES: usize = 4;

/// Budget for one tier
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuotaPolicy {
    /// Most entries the tier may hold
    pub max_entries: usize,
    /// Assumed byte quota of the backing storage
    pub quota_bytes: usize,
    /// Fraction of `quota_bytes` the tier tries to stay under
    pub soft_ratio: f64,
}

impl QuotaPolicy {
    /// Session tier defaults: 500 entries, 80% of 10 MiB
    pub fn session() -> Self {
        Self {
            max_entries: 500,
            quota_bytes: 10 * 1024 * 1024,
            soft_ratio: 0.8,
        }
    }

    /// Durable tier defaults: 1000 entries, 80% of 50 MiB
    pub fn durable() -> Self {
        Self {
            max_entries: 1000,
            quota_bytes: 50 * 1024 * 1024,
            soft_ratio: 0.8,
        }
    }

    pub fn soft_budget_bytes(&self) -> usize {
        (self.quota_bytes as f64 * self.soft_ratio) as usize
    }

    /// Entries kept after the backend itself reports the quota as exceeded
    pub fn emergency_keep(&self) -> usize {
        (self.max_entries as f64 * EMERGENCY_KEEP_RATIO).floor() as usize
    }
}

/// What happened when a tier was written out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    Written,
    /// The first write hit the quota; `evicted` entries went before the retry
    Pruned { evicted: usize },
    /// The retry failed too; the tier was emptied and the write dropped
    Cleared,
}

#[derive(Debug, Clone)]
pub struct QuotaManager {
    tier: Tier,
    policy: QuotaPolicy,
    /// Write sequence number of each key; larger is more recent
    stamps: HashMap<StorageKey, u64>,
    next_stamp: u64,
}

impl QuotaManager {
    pub fn new(tier: Tier, policy: QuotaPolicy) -> Self {
        Self {
            tier,
            policy,
            stamps: HashMap::new(),
            next_stamp: 1,
        }
    }

    /// Stamp entries loaded from a blob, oldest creation time first
    ///
    /// A snapshot does not record write order, so creation time stands in.
    pub fn seed(&mut self, entries: &HashMap<StorageKey, CacheEntry>) {
        self.reset();
        for key in self.by_age(entries) {
            self.record_write(&key);
        }
    }

    /// Mark `key` as the most recent write. Returns its previous stamp.
    pub fn record_write(&mut self, key: &StorageKey) -> Option<u64> {
        let stamp = self.next_stamp;
        self.next_stamp += 1;
        self.stamps.insert(key.clone(), stamp)
    }

    /// Undo [`record_write`](Self::record_write) for a write that never
    /// reached the backend
    pub fn revert_write(&mut self, key: &StorageKey, previous: Option<u64>) {
        match previous {
            Some(stamp) => {
                self.stamps.insert(key.clone(), stamp);
            }
            None => {
                self.stamps.remove(key);
            }
        }
    }

    pub fn reset(&mut self) {
        self.stamps.clear();
    }

    pub fn policy(&self) -> &QuotaPolicy {
        &self.policy
    }

    /// Apply the count cap, then the soft byte budget. Returns entries evicted.
    pub fn enforce(&mut self, entries: &mut HashMap<StorageKey, CacheEntry>) -> usize {
        let mut evicted = 0;

        if entries.len() > self.policy.max_entries {
            log::warn!(
                "[{}] {} entries over cap of {}, evicting oldest",
                self.tier,
                entries.len(),
                self.policy.max_entries
            );
            evicted += self.evict_oldest(entries, self.policy.max_entries);
        }

        let budget = self.policy.soft_budget_bytes();
        let mut used = estimated_size(entries);
        if used > budget {
            let mut oldest = self.by_age(entries);
            oldest.reverse();
            while used > budget {
                let Some(key) = oldest.pop() else {
                    break;
                };
                if let Some(entry) = entries.remove(&key) {
                    used = used.saturating_sub(entry_size(&key, &entry));
                    evicted += 1;
                }
            }
            log::debug!(
                "[{}] soft budget of {} bytes enforced, now ~{} bytes",
                self.tier,
                budget,
                used
            );
        }

        self.forget_missing(entries);
        evicted
    }

    /// Write `entries` through `write`, recovering from a quota rejection
    ///
    /// On `QuotaExceeded` the map is pruned to a quarter of the entry cap and
    /// written once more. If that fails as well the map is cleared and
    /// `Cleared` is returned; the caller is expected to drop its backing
    /// blob. Other errors are returned untouched.
    pub fn persist<F>(
        &mut self,
        entries: &mut HashMap<StorageKey, CacheEntry>,
        mut write: F,
    ) -> Result<PersistOutcome, StoreError>
    where
        F: FnMut(&HashMap<StorageKey, CacheEntry>) -> Result<(), StoreError>,
    {
        match write(entries) {
            Ok(()) => Ok(PersistOutcome::Written),
            Err(StoreError::QuotaExceeded { needed, capacity }) => {
                log::warn!(
                    "[{}] storage quota exceeded ({} > {} bytes), pruning to {} entries",
                    self.tier,
                    needed,
                    capacity,
                    self.policy.emergency_keep()
                );
                let evicted = self.evict_oldest(entries, self.policy.emergency_keep());
                self.forget_missing(entries);

                match write(entries) {
                    Ok(()) => Ok(PersistOutcome::Pruned { evicted }),
                    Err(e) => {
                        log::error!(
                            "[{}] write failed after pruning ({}), clearing tier",
                            self.tier,
                            e
                        );
                        entries.clear();
                        self.reset();
                        Ok(PersistOutcome::Cleared)
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Keys ordered least recently written first
    ///
    /// Unstamped keys sort before stamped ones, by creation time and then by
    /// key.
    fn by_age(&self, entries: &HashMap<StorageKey, CacheEntry>) -> Vec<StorageKey> {
        let mut keys: Vec<(Option<u64>, i64, &StorageKey)> = entries
            .iter()
            .map(|(key, entry)| (self.stamps.get(key).copied(), entry.created_ms(), key))
            .collect();
        keys.sort();
        keys.into_iter().map(|(_, _, key)| key.clone()).collect()
    }

    /// Remove the oldest writes until at most `keep` entries remain. Returns
    /// how many went.
    pub fn evict_oldest(&self, entries: &mut HashMap<StorageKey, CacheEntry>, keep: usize) -> usize {
        if entries.len() <= keep {
            return 0;
        }
        let excess = entries.len() - keep;
        for key in self.by_age(entries).into_iter().take(excess) {
            entries.remove(&key);
        }
        excess
    }

    fn forget_missing(&mut self, entries: &HashMap<StorageKey, CacheEntry>) {
        self.stamps.retain(|key, _| entries.contains_key(key));
    }
}

fn entry_size(key: &StorageKey, entry: &CacheEntry) -> usize {
    let body = serde_json::to_vec(entry).map(|v| v.len()).unwrap_or(0);
    key.as_str().len() + body + ENTRY_OVERHEAD_BYTES
}

/// Approximate serialized size of the whole map
pub fn estimated_size(entries: &HashMap<StorageKey, CacheEntry>) -> usize {
    entries
        .iter()
        .map(|(key, entry)| entry_size(key, entry))
        .sum()
}

#[cfg(test)]
#[path = "quota_tests.rs"]
mod quota_tests;
