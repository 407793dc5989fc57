//! Storage layer for persisted per-user state
//!
//! The engine only needs a key-value abstraction: snapshots are serialized
//! to JSON and written under namespaced keys. Persistence is best-effort;
//! callers log failures and keep the in-memory view authoritative.

use crate::error::Result;
use crate::utils::sync::{read, write};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

/// Key prefix for preference snapshots
pub const PREFERENCES_PREFIX: &str = "preferences";

/// Key prefix for memory snapshots
pub const MEMORIES_PREFIX: &str = "memories";

/// Storage key for a user's preference snapshot
pub fn preferences_key(user_id: &str) -> String {
    format!("{}:{}", PREFERENCES_PREFIX, user_id)
}

/// Storage key for a user's memory snapshot
pub fn memories_key(user_id: &str) -> String {
    format!("{}:{}", MEMORIES_PREFIX, user_id)
}

/// Key-value backend trait defining all required operations
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch a value, `None` if absent
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Insert or overwrite a value
    async fn put(&self, key: &str, value: String) -> Result<()>;

    /// Remove a value, returning whether it existed
    async fn delete(&self, key: &str) -> Result<bool>;
}

/// Process-local store, used by default and in tests
#[derive(Debug, Default)]
pub struct InMemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        read(&self.values).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(read(&self.values).get(key).cloned())
    }

    async fn put(&self, key: &str, value: String) -> Result<()> {
        write(&self.values).insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(write(&self.values).remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = InMemoryStore::new();
        assert!(store.get("k").await.unwrap().is_none());

        store.put("k", "v1".to_string()).await.unwrap();
        store.put("k", "v2".to_string()).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v2"));
        assert_eq!(store.len(), 1);

        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn test_snapshot_keys() {
        assert_eq!(preferences_key("u1"), "preferences:u1");
        assert_eq!(memories_key("u1"), "memories:u1");
    }
}
