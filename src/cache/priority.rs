//! Importance-scored response cache with a soft byte budget

use super::predictor::{ConversationContext, Prediction};
use crate::config::CacheConfig;
use crate::types::hours_between;
use crate::utils::sync::lock;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::{debug, info};

/// Hours after which an entry keeps only the minimum age factor
const AGE_HORIZON_HOURS: f64 = 168.0;
const MIN_AGE_FACTOR: f64 = 0.1;

const CORE_BONUS: f64 = 200.0;
const VERSE_BONUS: f64 = 150.0;
const MEDITATION_BONUS: f64 = 100.0;
const MAX_FREQUENCY_SCORE: f64 = 100.0;

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Content flags that drive scoring and protection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheFlags {
    pub is_core_response: bool,
    pub is_verse: bool,
    pub is_meditation: bool,
}

impl CacheFlags {
    pub fn core() -> Self {
        Self {
            is_core_response: true,
            ..Default::default()
        }
    }

    pub fn verse() -> Self {
        Self {
            is_verse: true,
            ..Default::default()
        }
    }

    pub fn meditation() -> Self {
        Self {
            is_meditation: true,
            ..Default::default()
        }
    }

    /// Protected entries are never evicted
    pub fn is_protected(&self) -> bool {
        self.is_core_response || self.is_verse
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub payload: Vec<u8>,
    pub content_type: String,
    pub frequency: u32,
    pub last_accessed: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub size: usize,
    pub flags: CacheFlags,
}

impl CacheEntry {
    /// Priority as of `now`; higher survives longer
    pub fn priority_score(&self, now: DateTime<Utc>) -> f64 {
        let mut score = (f64::from(self.frequency) * 10.0).min(MAX_FREQUENCY_SCORE);
        if self.flags.is_core_response {
            score += CORE_BONUS;
        }
        if self.flags.is_verse {
            score += VERSE_BONUS;
        }
        if self.flags.is_meditation {
            score += MEDITATION_BONUS;
        }
        let age_hours = hours_between(self.created_at, now);
        score * (1.0 - age_hours / AGE_HORIZON_HOURS).max(MIN_AGE_FACTOR)
    }
}

/// Point-in-time cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub prewarmed: u64,
    pub entries: usize,
    pub bytes: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    total_bytes: usize,
}

impl CacheState {
    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.total_bytes = self.total_bytes.saturating_sub(entry.size);
        Some(entry)
    }

    /// Lowest-priority evictable entry, oldest access first on ties
    fn eviction_candidate(&self, now: DateTime<Utc>) -> Option<String> {
        self.entries
            .values()
            .filter(|entry| !entry.flags.is_protected())
            .min_by(|a, b| {
                a.priority_score(now)
                    .total_cmp(&b.priority_score(now))
                    .then_with(|| a.last_accessed.cmp(&b.last_accessed))
                    .then_with(|| a.key.cmp(&b.key))
            })
            .map(|entry| entry.key.clone())
    }
}

/// SHA-256 of content and context, 16 hex chars
pub fn content_key(content: &str, context: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hasher.update([0u8]);
    hasher.update(context.as_bytes());
    let digest = hasher.finalize();
    digest.iter().take(8).map(|b| format!("{:02x}", b)).collect()
}

/// Priority-scored cache of rendered responses
///
/// All entry mutations happen under one mutex; counters are atomics so
/// stats never contend with the hot path.
pub struct PriorityCache {
    config: CacheConfig,
    state: Mutex<CacheState>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    prewarmed: AtomicU64,
}

impl PriorityCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            state: Mutex::new(CacheState::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            prewarmed: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        self.get_at(key, Utc::now())
    }

    /// Look up an entry, counting the access
    pub fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<CacheEntry> {
        let mut state = lock(&self.state);
        match state.entries.get_mut(key) {
            Some(entry) => {
                entry.frequency = entry.frequency.saturating_add(1);
                entry.last_accessed = now;
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        lock(&self.state).entries.contains_key(key)
    }

    /// Insert or replace an entry, evicting to stay within budget
    ///
    /// Returns the number of entries evicted. When only protected entries
    /// remain the write still succeeds and the budget is exceeded.
    pub fn set(&self, key: impl Into<String>, payload: Vec<u8>, flags: CacheFlags) -> usize {
        self.set_at(key, payload, DEFAULT_CONTENT_TYPE, flags, Utc::now())
    }

    pub fn set_with_content_type(
        &self,
        key: impl Into<String>,
        payload: Vec<u8>,
        content_type: &str,
        flags: CacheFlags,
    ) -> usize {
        self.set_at(key, payload, content_type, flags, Utc::now())
    }

    pub fn set_at(
        &self,
        key: impl Into<String>,
        payload: Vec<u8>,
        content_type: &str,
        flags: CacheFlags,
        now: DateTime<Utc>,
    ) -> usize {
        let key = key.into();
        let size = key.len() + payload.len();
        let mut state = lock(&self.state);

        // a replaced entry keeps its access history
        let previous = state.remove(&key);
        let (frequency, created_at) = previous
            .map(|entry| (entry.frequency, entry.created_at))
            .unwrap_or((0, now));

        let mut evicted = 0;
        while state.total_bytes + size > self.config.max_bytes {
            let Some(victim) = state.eviction_candidate(now) else {
                debug!(
                    "Cache over budget with only protected entries ({} + {} > {} bytes)",
                    state.total_bytes, size, self.config.max_bytes
                );
                break;
            };
            state.remove(&victim);
            evicted += 1;
        }

        state.total_bytes += size;
        state.entries.insert(
            key.clone(),
            CacheEntry {
                key,
                payload,
                content_type: content_type.to_string(),
                frequency,
                last_accessed: now,
                created_at,
                size,
                flags,
            },
        );

        if evicted > 0 {
            self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
            info!(
                "Evicted {} cache entries, {} bytes in use",
                evicted, state.total_bytes
            );
        }
        evicted
    }

    pub fn invalidate(&self, key: &str) -> bool {
        lock(&self.state).remove(key).is_some()
    }

    pub fn clear(&self) {
        let mut state = lock(&self.state);
        state.entries.clear();
        state.total_bytes = 0;
    }

    pub fn len(&self) -> usize {
        lock(&self.state).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_bytes(&self) -> usize {
        lock(&self.state).total_bytes
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = lock(&self.state).entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn stats(&self) -> CacheStats {
        let (entries, bytes) = {
            let state = lock(&self.state);
            (state.entries.len(), state.total_bytes)
        };
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            prewarmed: self.prewarmed.load(Ordering::Relaxed),
            entries,
            bytes,
        }
    }

    /// Cache generated content for likely next contexts
    ///
    /// Only predictions at or above the configured threshold are generated.
    /// The generator runs outside the cache lock and may decline by
    /// returning `None`. Returns the number of entries written.
    pub fn prewarm<F>(&self, predictions: &[Prediction], mut generate: F) -> usize
    where
        F: FnMut(ConversationContext) -> Option<(String, Vec<u8>, CacheFlags)>,
    {
        let mut written = 0;
        for prediction in predictions
            .iter()
            .filter(|p| p.probability >= self.config.prewarm_threshold)
        {
            let Some((key, payload, flags)) = generate(prediction.context) else {
                continue;
            };
            if self.contains(&key) {
                continue;
            }
            self.set(key, payload, flags);
            written += 1;
        }
        self.prewarmed.fetch_add(written as u64, Ordering::Relaxed);
        debug!("Prewarmed {} cache entries", written);
        written
    }
}

impl Default for PriorityCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}
