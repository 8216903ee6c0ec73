//! Tests for the durable TTL tier

use super::*;
use crate::model::{KeywordSuggestion, SearchKey, SearchMode};
use tempfile::TempDir;

use crate::cache::FileBlob;

fn hours(n: i64) -> TimeDelta {
    TimeDelta::hours(n)
}

fn store(cleanup_probability: f64) -> DurableStore {
    DurableStore::in_memory(QuotaPolicy::durable(), hours(2), cleanup_probability)
        .with_rng(StdRng::seed_from_u64(7))
}

fn entry_aged(project: &str, query: &str, age: TimeDelta) -> (StorageKey, CacheEntry) {
    let key = SearchKey::new(project, query, SearchMode::Or);
    (
        key.storage_key(),
        CacheEntry::with_timestamp(
            key,
            vec![KeywordSuggestion::new("thunder"), KeywordSuggestion::new("lightning")],
            Utc::now() - age,
        ),
    )
}

#[test]
fn test_fresh_entry_is_returned() {
    let mut store = store(0.0);
    let (key, value) = entry_aged("p1", "storms", TimeDelta::minutes(5));
    store.set(&key, value.clone()).unwrap();
    assert_eq!(store.get(&key).unwrap(), Some(value));
}

#[test]
fn test_expired_entry_is_a_miss_and_dropped() {
    let mut store = store(0.0);
    let (key, value) = entry_aged("p1", "storms", hours(3));
    store.set(&key, value).unwrap();
    assert_eq!(store.len(), 1);

    assert_eq!(store.get(&key).unwrap(), None);
    assert_eq!(store.len(), 0);
}

#[test]
fn test_scan_skips_expired_entries() {
    let mut store = store(0.0);
    let (old_key, old) = entry_aged("p1", "old", hours(3));
    let (new_key, new) = entry_aged("p1", "new", TimeDelta::minutes(1));
    store.set(&old_key, old).unwrap();
    store.set(&new_key, new).unwrap();

    let found = store.scan(&|_, _| true).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].0, new_key);
}

#[test]
fn test_purge_expired_is_range_delete_by_age() {
    let mut store = store(0.0);
    for (query, age) in [("a", hours(5)), ("b", hours(3)), ("c", hours(1)), ("d", TimeDelta::zero())] {
        let (key, value) = entry_aged("p1", query, age);
        store.set(&key, value).unwrap();
    }

    assert_eq!(store.purge_expired(Utc::now()), 2);
    assert_eq!(store.len(), 2);
}

#[test]
fn test_write_sweeps_expired_when_sampled() {
    let mut store = store(1.0);
    let (old_key, old) = entry_aged("p1", "old", hours(3));
    store.set(&old_key, old).unwrap();
    // Sampled on every write, so the stale entry is swept by its own insert
    assert_eq!(store.len(), 0);

    let (key, value) = entry_aged("p1", "fresh", TimeDelta::zero());
    store.set(&key, value).unwrap();
    assert_eq!(store.len(), 1);
}

#[test]
fn test_write_skips_sweep_when_not_sampled() {
    let mut store = store(0.0);
    let (old_key, old) = entry_aged("p1", "old", hours(3));
    let (key, value) = entry_aged("p1", "fresh", TimeDelta::zero());
    store.set(&old_key, old).unwrap();
    store.set(&key, value).unwrap();
    assert_eq!(store.len(), 2);
}

#[test]
fn test_remove_partition_uses_project_index() {
    let mut store = store(0.0);
    for (project, query) in [("p1", "a"), ("p1", "b"), ("p2", "a")] {
        let (key, value) = entry_aged(project, query, TimeDelta::zero());
        store.set(&key, value).unwrap();
    }

    assert_eq!(store.remove_partition("p1").unwrap(), 2);
    assert_eq!(store.remove_partition("p1").unwrap(), 0);
    assert_eq!(store.len(), 1);
    // Age index no longer references the removed entries
    assert_eq!(store.purge_expired(Utc::now() + hours(10)), 1);
}

#[test]
fn test_overwrite_keeps_single_index_entry() {
    let mut store = store(0.0);
    let (key, first) = entry_aged("p1", "storms", hours(1));
    let (_, second) = entry_aged("p1", "storms", TimeDelta::zero());
    store.set(&key, first).unwrap();
    store.set(&key, second.clone()).unwrap();

    assert_eq!(store.len(), 1);
    assert_eq!(store.by_age.len(), 1);
    assert_eq!(store.get(&key).unwrap(), Some(second));
}

#[test]
fn test_reopen_from_file_drops_expired() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("durable.json");
    let policy = QuotaPolicy::durable();

    {
        let mut store = DurableStore::open(
            Box::new(FileBlob::new(&path, policy.quota_bytes)),
            policy,
            hours(2),
            0.0,
        );
        let (old_key, old) = entry_aged("p1", "old", hours(3));
        let (key, value) = entry_aged("p1", "fresh", TimeDelta::zero());
        store.set(&old_key, old).unwrap();
        store.set(&key, value).unwrap();
    }

    let reopened = DurableStore::open(
        Box::new(FileBlob::new(&path, policy.quota_bytes)),
        policy,
        hours(2),
        0.0,
    );
    assert_eq!(reopened.len(), 1);
    assert!(reopened.usage().unwrap().used > 0);
}

#[test]
fn test_cap_evicts_least_recent_write() {
    let policy = QuotaPolicy {
        max_entries: 2,
        ..QuotaPolicy::durable()
    };
    let mut store = DurableStore::in_memory(policy, hours(2), 0.0);
    let (a, first) = entry_aged("p1", "a", TimeDelta::minutes(10));
    let (b, second) = entry_aged("p1", "b", TimeDelta::minutes(5));
    let (c, oldest) = entry_aged("p1", "c", TimeDelta::minutes(30));
    store.set(&a, first).unwrap();
    store.set(&b, second).unwrap();
    store.set(&c, oldest).unwrap();

    assert_eq!(store.get(&a).unwrap(), None);
    assert!(store.get(&b).unwrap().is_some());
    assert!(store.get(&c).unwrap().is_some());
    assert_eq!(store.by_age.len(), 2);
}

#[test]
fn test_failed_write_leaves_map_and_indexes_untouched() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, "not a directory").unwrap();
    let policy = QuotaPolicy::durable();
    let mut store = DurableStore::open(
        Box::new(FileBlob::new(blocker.join("durable.json"), policy.quota_bytes)),
        policy,
        hours(2),
        0.0,
    );

    let (key, value) = entry_aged("p1", "storms", TimeDelta::zero());
    assert!(matches!(store.set(&key, value), Err(StoreError::Io(_))));
    assert_eq!(store.get(&key).unwrap(), None);
    assert!(store.by_age.is_empty());
    assert_eq!(store.remove_partition("p1").unwrap(), 0);
}
