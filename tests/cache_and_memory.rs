//! Cache protection and tiered memory retention

mod common;

use attune_core::cache::content_key;
use attune_core::config::CacheConfig;
use attune_core::{CacheFlags, MemoryStore, MemoryType, PriorityCache, PriorityTier};
use common::{days_after, epoch, test_engine};
use proptest::prelude::*;
use std::collections::HashSet;

fn flags_for(kind: u8) -> CacheFlags {
    match kind {
        0 => CacheFlags::core(),
        1 => CacheFlags::verse(),
        2 => CacheFlags::meditation(),
        _ => CacheFlags::default(),
    }
}

fn small_cache() -> PriorityCache {
    PriorityCache::new(CacheConfig {
        max_bytes: 600,
        ..Default::default()
    })
}

proptest! {
    #[test]
    fn protected_entries_survive_any_write_sequence(
        writes in prop::collection::vec((0u8..24, 1usize..160, 0u8..4), 1..80)
    ) {
        let cache = small_cache();
        let mut protected: HashSet<String> = HashSet::new();

        for (key, size, kind) in writes {
            let key = format!("k{}", key);
            let flags = flags_for(kind);
            cache.set(key.clone(), vec![0u8; size], flags);
            if flags.is_protected() {
                protected.insert(key);
            } else {
                protected.remove(&key);
            }
        }

        for key in &protected {
            prop_assert!(cache.contains(key), "protected entry {} was evicted", key);
        }
    }

    #[test]
    fn unprotected_writes_respect_the_budget(
        writes in prop::collection::vec((0u8..24, 1usize..160), 1..80)
    ) {
        let cache = small_cache();
        for (key, size) in writes {
            cache.set(format!("k{}", key), vec![1u8; size], CacheFlags::meditation());
            prop_assert!(cache.total_bytes() <= 600);
        }
    }
}

#[test]
fn frequently_used_entries_outlast_cold_ones() {
    let cache = small_cache();
    cache.set("hot", vec![0; 250], CacheFlags::default());
    cache.set("cold", vec![0; 250], CacheFlags::default());
    for _ in 0..5 {
        assert!(cache.get("hot").is_some());
    }

    cache.set("new", vec![0; 250], CacheFlags::default());
    assert!(cache.contains("hot"));
    assert!(!cache.contains("cold"));
    assert_eq!(cache.stats().evictions, 1);
}

#[test]
fn engine_cache_round_trip_and_miss() {
    let engine = test_engine();
    let key = content_key("Breathe in for four counts", "meditation");
    assert!(engine.cache_get(&key).is_none());

    engine.cache_put(&key, b"audio".to_vec(), CacheFlags::meditation());
    let entry = engine.cache_get(&key).unwrap();
    assert_eq!(entry.payload, b"audio");
    assert_eq!(entry.frequency, 1);

    let stats = engine.cache().stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
}

fn seeded_store() -> MemoryStore {
    let store = MemoryStore::default();
    let start = epoch();
    let seeds = [
        (MemoryType::LifeEvent, PriorityTier::Critical, "loss.father", "Father passed away"),
        (MemoryType::Goal, PriorityTier::High, "work.promotion", "Hoping for promotion"),
        (MemoryType::Concern, PriorityTier::Medium, "sleep.quality", "Poor sleep"),
        (MemoryType::General, PriorityTier::Low, "weather", "Rainy week"),
    ];
    for (memory_type, tier, key, content) in seeds {
        store.store_at("u1", memory_type, tier, key, content, start);
    }
    store
}

/// Recalled keys after `days` without access, sorted
fn recalled_after(days: i64) -> Vec<String> {
    let mut keys: Vec<String> = seeded_store()
        .get_relevant_at("u1", None, 10, days_after(epoch(), days))
        .into_iter()
        .map(|m| m.key)
        .collect();
    keys.sort();
    keys
}

#[test]
fn memory_tiers_control_retention() {
    assert_eq!(recalled_after(0).len(), 4);
    assert_eq!(
        recalled_after(30),
        vec!["loss.father", "sleep.quality", "work.promotion"]
    );
    assert_eq!(recalled_after(100), vec!["loss.father", "work.promotion"]);
    assert_eq!(recalled_after(1000), vec!["loss.father"]);
}

#[test]
fn daily_recall_does_not_extend_low_tier_retention() {
    let store = MemoryStore::default();
    let start = epoch();
    store.store_at("u1", MemoryType::General, PriorityTier::Low, "weather", "Rainy week", start);

    let recalled_days: Vec<i64> = (0..60)
        .filter(|day| {
            !store
                .get_relevant_at("u1", None, 5, days_after(start, *day))
                .is_empty()
        })
        .collect();
    assert_eq!(recalled_days, (0..=7).collect::<Vec<i64>>());
    assert_eq!(store.memories("u1")[0].access_count, 8);
}

#[test]
fn restoring_a_snapshot_keeps_newer_memories() {
    let start = epoch();
    let persisted = MemoryStore::default();
    persisted.store_at("u1", MemoryType::Goal, PriorityTier::High, "sleep", "8 hours", start);
    persisted.store_at("u1", MemoryType::Concern, PriorityTier::Medium, "work", "Deadline", start);
    let snapshot = persisted.memories("u1");

    let live = MemoryStore::default();
    let later = days_after(start, 2);
    live.store_at("u1", MemoryType::Goal, PriorityTier::High, "sleep", "7 hours", later);

    assert_eq!(live.restore_user("u1", snapshot), 1);
    let mut memories = live.memories("u1");
    memories.sort_by(|a, b| a.key.cmp(&b.key));
    assert_eq!(memories.len(), 2);
    assert_eq!(memories[0].content, "7 hours");
    assert_eq!(memories[1].key, "work");
}

#[test]
fn purge_removes_only_expired_memories() {
    let store = seeded_store();
    assert_eq!(store.purge_expired_at(days_after(epoch(), 100)), 2);
    assert_eq!(store.count("u1"), 2);
}

#[test]
fn critical_memories_rank_first_without_a_topic() {
    let store = MemoryStore::default();
    let start = epoch();
    store.store_at("u1", MemoryType::General, PriorityTier::Low, "hobby", "Paints", start);
    store.store_at(
        "u1",
        MemoryType::LifeEvent,
        PriorityTier::Critical,
        "loss",
        "Lost a friend",
        start,
    );

    let recalled = store.get_relevant_at("u1", None, 1, start);
    assert_eq!(recalled[0].key, "loss");
}

#[test]
fn recall_through_engine_prefers_topic_matches() {
    let engine = test_engine();
    engine.remember(
        "u1",
        MemoryType::Concern,
        PriorityTier::High,
        "family.sister",
        "Argument with sister",
    );
    engine.remember(
        "u1",
        MemoryType::Goal,
        PriorityTier::High,
        "work.deadline",
        "Project due Friday",
    );

    let recalled = engine.recall_memories("u1", Some("work"), 1);
    assert_eq!(recalled.len(), 1);
    assert_eq!(recalled[0].key, "work.deadline");

    assert!(engine.record_growth("u1", "mindfulness", "Meditated daily").is_some());
    assert!(engine.record_growth("u1", "flight", "Not a dimension").is_none());
    assert_eq!(engine.memory().count("u1"), 3);
}
