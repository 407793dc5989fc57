//! Cross-session memory store
//!
//! Expired memories are excluded from recall immediately but only removed
//! by `purge_expired` or when the per-user cap needs room.

use super::types::{GrowthDimension, Memory, MemoryType, PriorityTier};
use crate::config::MemoryConfig;
use crate::types::UserId;
use crate::utils::sync::{lock, read, write};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct MemoryStore {
    config: MemoryConfig,
    users: RwLock<HashMap<UserId, Arc<Mutex<Vec<Memory>>>>>,
}

impl MemoryStore {
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            config,
            users: RwLock::new(HashMap::new()),
        }
    }

    pub fn store(
        &self,
        user_id: &str,
        memory_type: MemoryType,
        tier: PriorityTier,
        key: &str,
        content: &str,
    ) -> Memory {
        self.store_at(user_id, memory_type, tier, key, content, Utc::now())
    }

    /// Insert a memory, or refresh the existing one with the same type and key
    ///
    /// A refresh replaces the content, touches the memory, raises its
    /// confidence by the configured increment and keeps the more important
    /// of the two tiers.
    pub fn store_at(
        &self,
        user_id: &str,
        memory_type: MemoryType,
        tier: PriorityTier,
        key: &str,
        content: &str,
        now: DateTime<Utc>,
    ) -> Memory {
        let handle = self.user_handle(user_id);
        let mut memories = lock(&handle);

        if let Some(existing) = memories
            .iter_mut()
            .find(|m| m.memory_type == memory_type && m.key == key)
        {
            existing.content = content.to_string();
            existing.touch(now);
            existing.confidence = (existing.confidence + self.config.confidence_increment).min(1.0);
            existing.tier = existing.tier.min(tier);
            debug!(
                "Refreshed {} memory {} for {} (confidence {:.2})",
                memory_type, key, user_id, existing.confidence
            );
            return existing.clone();
        }

        let memory = Memory::new(user_id, memory_type, tier, key, content, now);
        memories.push(memory.clone());
        debug!("Stored {} {} memory {} for {}", tier, memory_type, key, user_id);

        if memories.len() > self.config.max_per_user {
            Self::enforce_cap(&mut memories, self.config.max_per_user, memory.id, now);
        }
        memory
    }

    /// Record progress in a growth dimension
    ///
    /// Unrecognized dimension labels are logged and ignored.
    pub fn record_growth(&self, user_id: &str, dimension: &str, note: &str) -> Option<Memory> {
        let Some(dimension) = GrowthDimension::from_label(dimension) else {
            warn!(
                "Ignoring growth note for {}: unknown dimension {:?}",
                user_id, dimension
            );
            return None;
        };
        Some(self.store(
            user_id,
            MemoryType::Growth,
            PriorityTier::Medium,
            &format!("growth.{}", dimension.label()),
            note,
        ))
    }

    pub fn get_relevant(&self, user_id: &str, topic: Option<&str>, limit: usize) -> Vec<Memory> {
        self.get_relevant_at(user_id, topic, limit, Utc::now())
    }

    /// Highest-ranked unexpired memories; returned memories are touched
    pub fn get_relevant_at(
        &self,
        user_id: &str,
        topic: Option<&str>,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Vec<Memory> {
        let Some(handle) = read(&self.users).get(user_id).cloned() else {
            return Vec::new();
        };
        let mut memories = lock(&handle);

        let mut ranked: Vec<(usize, f64)> = memories
            .iter()
            .enumerate()
            .filter(|(_, m)| !m.is_expired(now))
            .map(|(index, m)| (index, m.relevance_score(topic, now)))
            .collect();
        ranked.sort_by(|(a, score_a), (b, score_b)| {
            score_b
                .total_cmp(score_a)
                .then_with(|| memories[*b].last_accessed.cmp(&memories[*a].last_accessed))
        });

        ranked
            .into_iter()
            .take(limit)
            .map(|(index, _)| {
                let memory = &mut memories[index];
                memory.touch(now);
                memory.clone()
            })
            .collect()
    }

    /// Remove one memory
    pub fn forget(&self, user_id: &str, memory_id: Uuid) -> bool {
        let Some(handle) = read(&self.users).get(user_id).cloned() else {
            return false;
        };
        let mut memories = lock(&handle);
        let before = memories.len();
        memories.retain(|m| m.id != memory_id);
        memories.len() < before
    }

    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Utc::now())
    }

    /// Physically remove expired memories for every user
    pub fn purge_expired_at(&self, now: DateTime<Utc>) -> usize {
        let handles: Vec<Arc<Mutex<Vec<Memory>>>> =
            read(&self.users).values().cloned().collect();
        let mut purged = 0;
        for handle in handles {
            let mut memories = lock(&handle);
            let before = memories.len();
            memories.retain(|m| !m.is_expired(now));
            purged += before - memories.len();
        }
        if purged > 0 {
            info!("Purged {} expired memories", purged);
        }
        purged
    }

    /// Every stored memory for a user, expired included
    pub fn memories(&self, user_id: &str) -> Vec<Memory> {
        match read(&self.users).get(user_id).cloned() {
            Some(handle) => lock(&handle).clone(),
            None => Vec::new(),
        }
    }

    pub fn count(&self, user_id: &str) -> usize {
        match read(&self.users).get(user_id).cloned() {
            Some(handle) => lock(&handle).len(),
            None => 0,
        }
    }

    /// Merge a persisted snapshot into the user's memories
    ///
    /// Memories are matched by id, then by type and key. The in-memory copy
    /// wins unless the snapshot's copy was accessed more recently. Returns
    /// the number of memories taken from the snapshot.
    pub fn restore_user(&self, user_id: &str, snapshot: Vec<Memory>) -> usize {
        let handle = self.user_handle(user_id);
        let mut memories = lock(&handle);
        let mut restored = 0;
        for memory in snapshot.into_iter().filter(|m| m.user_id == user_id) {
            let existing = memories.iter_mut().find(|m| {
                m.id == memory.id || (m.memory_type == memory.memory_type && m.key == memory.key)
            });
            match existing {
                Some(current) if memory.last_accessed > current.last_accessed => {
                    *current = memory;
                    restored += 1;
                }
                Some(_) => {}
                None => {
                    memories.push(memory);
                    restored += 1;
                }
            }
        }
        restored
    }

    fn user_handle(&self, user_id: &str) -> Arc<Mutex<Vec<Memory>>> {
        if let Some(handle) = read(&self.users).get(user_id) {
            return Arc::clone(handle);
        }
        Arc::clone(
            write(&self.users)
                .entry(user_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(Vec::new()))),
        )
    }

    /// Drop expired memories, then the lowest-ranked non-critical ones,
    /// never the memory just written
    fn enforce_cap(memories: &mut Vec<Memory>, cap: usize, keep: Uuid, now: DateTime<Utc>) {
        memories.retain(|m| m.id == keep || !m.is_expired(now));

        while memories.len() > cap {
            let victim = memories
                .iter()
                .enumerate()
                .filter(|(_, m)| m.id != keep && m.tier != PriorityTier::Critical)
                .min_by(|(_, a), (_, b)| {
                    a.relevance_score(None, now)
                        .total_cmp(&b.relevance_score(None, now))
                })
                .map(|(index, _)| index);
            match victim {
                Some(index) => {
                    let removed = memories.remove(index);
                    debug!("Memory cap evicted {} for {}", removed.key, removed.user_id);
                }
                None => break,
            }
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(MemoryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_duplicate_key_refreshes() {
        let store = MemoryStore::default();
        let now = Utc::now();
        let first = store.store_at("u1", MemoryType::Goal, PriorityTier::Low, "sleep", "8 hours", now);
        let later = now + Duration::days(1);
        let second = store.store_at(
            "u1",
            MemoryType::Goal,
            PriorityTier::High,
            "sleep",
            "7 hours",
            later,
        );

        assert_eq!(first.id, second.id);
        assert_eq!(store.count("u1"), 1);
        assert_eq!(second.content, "7 hours");
        assert_eq!(second.access_count, 1);
        assert_eq!(second.last_accessed, later);
        assert!((second.confidence - 0.6).abs() < 1e-6);
        assert_eq!(second.tier, PriorityTier::High);

        // same key under a different type is a separate memory
        store.store_at("u1", MemoryType::Concern, PriorityTier::Low, "sleep", "insomnia", now);
        assert_eq!(store.count("u1"), 2);
    }

    #[test]
    fn test_confidence_capped_at_one() {
        let store = MemoryStore::default();
        let mut memory = store.store("u1", MemoryType::General, PriorityTier::Low, "k", "v");
        for _ in 0..10 {
            memory = store.store("u1", MemoryType::General, PriorityTier::Low, "k", "v");
        }
        assert_eq!(memory.confidence, 1.0);
    }

    #[test]
    fn test_topic_match_ranks_first() {
        let store = MemoryStore::default();
        let now = Utc::now();
        store.store_at("u1", MemoryType::Concern, PriorityTier::Medium, "family.sister", "Argument", now);
        store.store_at("u1", MemoryType::Goal, PriorityTier::Medium, "work.promotion", "Wants it", now);

        let recalled = store.get_relevant_at("u1", Some("work"), 1, now);
        assert_eq!(recalled.len(), 1);
        assert_eq!(recalled[0].key, "work.promotion");
        assert_eq!(recalled[0].access_count, 1);
    }

    #[test]
    fn test_expired_excluded_then_purged() {
        let store = MemoryStore::default();
        let now = Utc::now();
        let old = now - Duration::days(30);
        store.store_at("u1", MemoryType::General, PriorityTier::Low, "weather", "Rainy week", old);
        store.store_at("u1", MemoryType::LifeEvent, PriorityTier::Critical, "loss", "Father passed", old);

        let recalled = store.get_relevant_at("u1", None, 10, now);
        assert_eq!(recalled.len(), 1);
        assert_eq!(recalled[0].key, "loss");
        assert_eq!(store.count("u1"), 2);

        assert_eq!(store.purge_expired_at(now), 1);
        assert_eq!(store.count("u1"), 1);
    }

    #[test]
    fn test_growth_dimension_validation() {
        let store = MemoryStore::default();
        let memory = store.record_growth("u1", "resilience", "Handled setback").unwrap();
        assert_eq!(memory.memory_type, MemoryType::Growth);
        assert_eq!(memory.key, "growth.resilience");

        assert!(store.record_growth("u1", "levitation", "nope").is_none());
        assert_eq!(store.count("u1"), 1);
    }

    #[test]
    fn test_cap_spares_critical_and_new() {
        let store = MemoryStore::new(MemoryConfig {
            max_per_user: 2,
            ..Default::default()
        });
        let now = Utc::now();
        store.store_at("u1", MemoryType::LifeEvent, PriorityTier::Critical, "a", "x", now);
        store.store_at("u1", MemoryType::General, PriorityTier::Low, "b", "x", now);
        store.store_at("u1", MemoryType::General, PriorityTier::Low, "c", "x", now);

        let keys: Vec<String> = store.memories("u1").into_iter().map(|m| m.key).collect();
        assert_eq!(keys, vec!["a", "c"]);
    }

    #[test]
    fn test_forget() {
        let store = MemoryStore::default();
        let memory = store.store("u1", MemoryType::General, PriorityTier::Low, "k", "v");
        assert!(store.forget("u1", memory.id));
        assert!(!store.forget("u1", memory.id));
        assert!(!store.forget("nobody", memory.id));
    }

    #[test]
    fn test_unknown_user_recall_is_empty() {
        let store = MemoryStore::default();
        assert!(store.get_relevant("ghost", Some("anything"), 5).is_empty());
    }
}
