//! Read-through, write-through composition of the cache tiers
//!
//! The chain is the only place storage failures are handled: a failing tier
//! read is a miss, a failing tier write is logged and its siblings proceed.
//! Nothing below this boundary is ever surfaced to a caller.

use std::path::PathBuf;

use chrono::TimeDelta;

use super::blob::FileBlob;
use super::durable::DurableStore;
use super::entry::{CacheEntry, Tier};
use super::memory::MemoryStore;
use super::session::SessionStore;
use super::store::{KvStore, StorageUsage};
use crate::config::CacheConfig;
use crate::model::{KeywordSuggestion, SearchKey};

const CACHE_DIR: &str = "scattershot";
const SESSION_FILE: &str = "session.json";
const DURABLE_FILE: &str = "durable.json";

/// Entry count and byte usage of one tier
#[derive(Debug, Clone, PartialEq)]
pub struct TierStats {
    pub tier: Tier,
    pub entries: usize,
    pub usage: Option<StorageUsage>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    pub tiers: Vec<TierStats>,
}

impl CacheStats {
    pub fn tier(&self, tier: Tier) -> Option<&TierStats> {
        self.tiers.iter().find(|stats| stats.tier == tier)
    }
}

/// Layered cache keyed by [`SearchKey`]
///
/// Construct one per process and hand it to consumers by reference.
pub struct CacheChain {
    /// Fastest first
    tiers: Vec<Box<dyn KvStore>>,
}

impl CacheChain {
    pub fn new(memory: MemoryStore, session: SessionStore, durable: DurableStore) -> Self {
        Self::from_tiers(vec![Box::new(memory), Box::new(session), Box::new(durable)])
    }

    /// Chain over arbitrary tiers, ordered fastest first
    pub fn from_tiers(tiers: Vec<Box<dyn KvStore>>) -> Self {
        Self { tiers }
    }

    /// All three tiers held in process memory
    pub fn in_memory(config: &CacheConfig) -> Self {
        Self::new(
            MemoryStore::new(),
            SessionStore::in_memory(config.session_policy()),
            DurableStore::in_memory(
                config.durable_policy(),
                durable_ttl(config),
                config.cleanup_probability,
            ),
        )
    }

    /// Tiers as configured: file-backed when `persist` is set
    ///
    /// The session blob lives in the runtime directory (cleared at logout on
    /// most systems), the durable blob in the user cache directory.
    pub fn from_config(config: &CacheConfig) -> Self {
        if !config.persist {
            return Self::in_memory(config);
        }

        let Some(durable_path) = durable_blob_path() else {
            log::warn!("No cache directory available, keeping cache in memory");
            return Self::in_memory(config);
        };

        let session_policy = config.session_policy();
        let durable_policy = config.durable_policy();
        Self::new(
            MemoryStore::new(),
            SessionStore::open(
                Box::new(FileBlob::new(session_blob_path(), session_policy.quota_bytes)),
                session_policy,
            ),
            DurableStore::open(
                Box::new(FileBlob::new(durable_path, durable_policy.quota_bytes)),
                durable_policy,
                durable_ttl(config),
                config.cleanup_probability,
            ),
        )
    }

    /// Look a search up, fastest tier first
    ///
    /// A hit below the memory tier is copied into every faster tier before it
    /// is returned, so the next lookup is served from memory.
    pub fn get_cached_result(&mut self, key: &SearchKey) -> Option<CacheEntry> {
        let storage_key = key.storage_key();

        for depth in 0..self.tiers.len() {
            let tier = &mut self.tiers[depth];
            let entry = match tier.get(&storage_key) {
                Ok(Some(entry)) => entry,
                Ok(None) => continue,
                Err(e) => {
                    log::warn!("[{}] read failed, treating as miss: {}", tier.tier(), e);
                    continue;
                }
            };

            if entry.key != *key {
                log::warn!(
                    "[{}] storage key collision for {} (stored {}), treating as miss",
                    tier.tier(),
                    key,
                    entry.key
                );
                continue;
            }

            log::debug!("Cache HIT: {} tier for {}", tier.tier(), key);
            for faster in &mut self.tiers[..depth] {
                if let Err(e) = faster.set(&storage_key, entry.clone()) {
                    log::warn!("[{}] promotion failed: {}", faster.tier(), e);
                }
            }
            return Some(entry);
        }

        log::debug!("Cache MISS: {}", key);
        None
    }

    /// Store a finished suggestion list in every tier
    ///
    /// Each tier's failure is independent; a failed tier never rolls back the
    /// others.
    pub fn set_cached_result(
        &mut self,
        key: &SearchKey,
        suggestions: Vec<KeywordSuggestion>,
    ) -> CacheEntry {
        let storage_key = key.storage_key();
        let entry = CacheEntry::new(key.clone(), suggestions);

        for tier in &mut self.tiers {
            if let Err(e) = tier.set(&storage_key, entry.clone()) {
                log::warn!("[{}] write dropped: {}", tier.tier(), e);
            }
        }
        log::debug!("Cached {} suggestions for {}", entry.suggestions.len(), key);
        entry
    }

    /// Forget one search in every tier
    pub fn remove(&mut self, key: &SearchKey) {
        let storage_key = key.storage_key();
        for tier in &mut self.tiers {
            if let Err(e) = tier.delete(&storage_key) {
                log::warn!("[{}] delete failed: {}", tier.tier(), e);
            }
        }
    }

    pub fn clear(&mut self) {
        for tier in &mut self.tiers {
            if let Err(e) = tier.clear() {
                log::warn!("[{}] clear failed: {}", tier.tier(), e);
            }
        }
        log::debug!("Cleared all search caches");
    }

    /// Remove every cached search of one project. Returns the most entries
    /// removed from any single tier.
    pub fn clear_partition(&mut self, project_id: &str) -> usize {
        let mut removed = 0;
        for tier in &mut self.tiers {
            match tier.remove_partition(project_id) {
                Ok(count) => removed = removed.max(count),
                Err(e) => log::warn!("[{}] partition delete failed: {}", tier.tier(), e),
            }
        }
        log::debug!("Cleared cache for project {}", project_id);
        removed
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            tiers: self
                .tiers
                .iter()
                .map(|tier| TierStats {
                    tier: tier.tier(),
                    entries: tier.len(),
                    usage: tier.usage(),
                })
                .collect(),
        }
    }
}

fn durable_ttl(config: &CacheConfig) -> TimeDelta {
    i64::try_from(config.durable_ttl_secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .unwrap_or(TimeDelta::MAX)
}

fn session_blob_path() -> PathBuf {
    dirs::runtime_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(CACHE_DIR)
        .join(SESSION_FILE)
}

fn durable_blob_path() -> Option<PathBuf> {
    dirs::cache_dir().map(|p| p.join(CACHE_DIR).join(DURABLE_FILE))
}

#[cfg(test)]
#[path = "chain_tests.rs"]
mod chain_tests;
