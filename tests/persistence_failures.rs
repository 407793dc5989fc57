//! Storage failures never surface to callers

use async_trait::async_trait;
use attune_core::memory::{MemoryType, PriorityTier};
use attune_core::preferences::keys::SPEAKING_RATE;
use attune_core::storage::{memories_key, preferences_key};
use attune_core::{
    AttuneConfig, AttuneError, FeedbackContext, KeyValueStore, PersonalizationEngine,
    PreferenceValue, Result,
};
use mockall::mock;
use std::sync::Arc;

mock! {
    pub Store {}

    #[async_trait]
    impl KeyValueStore for Store {
        async fn get(&self, key: &str) -> Result<Option<String>>;
        async fn put(&self, key: &str, value: String) -> Result<()>;
        async fn delete(&self, key: &str) -> Result<bool>;
    }
}

fn engine_with(store: MockStore) -> PersonalizationEngine {
    PersonalizationEngine::with_store(AttuneConfig::default(), Arc::new(store))
}

#[tokio::test]
async fn failed_writes_keep_in_memory_state() {
    let mut store = MockStore::new();
    store
        .expect_put()
        .returning(|_, _| Err(AttuneError::Storage("disk full".to_string())));
    let engine = engine_with(store);

    engine.remember("u1", MemoryType::Goal, PriorityTier::High, "sleep", "Earlier bedtime");
    engine.record_feedback("u1", "skip", 1.0, None, FeedbackContext::default());
    assert_eq!(engine.process_pending().await, 2);

    assert_eq!(engine.memory().count("u1"), 1);
    assert!(!engine.preferences().snapshot_user("u1").is_empty());
}

#[tokio::test]
async fn snapshots_are_written_once_per_user_per_batch() {
    let mut store = MockStore::new();
    let preferences = preferences_key("u1");
    let memories = memories_key("u1");
    store
        .expect_put()
        .withf(move |key, _| key.to_string() == preferences)
        .times(1)
        .returning(|_, _| Ok(()));
    store
        .expect_put()
        .withf(move |key, _| key.to_string() == memories)
        .times(1)
        .returning(|_, _| Ok(()));
    let engine = engine_with(store);

    for _ in 0..5 {
        engine.record_feedback("u1", "completion", 1.0, None, FeedbackContext::default());
    }
    engine.process_pending().await;
}

#[tokio::test]
async fn failed_reads_leave_user_unhydrated() {
    let mut store = MockStore::new();
    store
        .expect_get()
        .returning(|_| Err(AttuneError::Storage("connection reset".to_string())));
    let engine = engine_with(store);

    assert!(engine.set_preference("u1", SPEAKING_RATE, PreferenceValue::Number(0.9)));
    assert!(!engine.hydrate_user("u1").await);
    // the explicit preference set before the failed load is still in effect
    let segments = engine.adapt_prosody("Hello.", "u1");
    assert!((segments[0].speaking_rate - 0.9).abs() < 1e-6);
}

#[tokio::test]
async fn corrupt_snapshots_are_discarded() {
    let mut store = MockStore::new();
    let preferences = preferences_key("u1");
    let memories = memories_key("u1");
    store
        .expect_get()
        .withf(move |key| key.to_string() == preferences)
        .returning(|_| Ok(Some("{not json".to_string())));
    store
        .expect_get()
        .withf(move |key| key.to_string() == memories)
        .returning(|_| Ok(None));
    let engine = engine_with(store);

    assert!(!engine.hydrate_user("u1").await);
    assert_eq!(engine.preferences().user_count(), 0);
}
