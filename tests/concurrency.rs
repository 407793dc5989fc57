//! Concurrent callers observe consistent state

mod common;

use attune_core::{
    CacheFlags, ExperimentAssignmentEngine, FeedbackType, PreferenceStore, PriorityCache,
};
use common::weighted_experiment;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

#[test]
fn concurrent_assignment_agrees_on_one_variant() {
    let engine = Arc::new(ExperimentAssignmentEngine::new());
    let experiment = weighted_experiment("exp", "tone", &[("a", 0.34), ("b", 0.33), ("c", 0.33)]);
    engine.create_experiment(experiment).unwrap();
    engine.start("exp").unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                (0..50)
                    .map(|_| engine.assign_variant("shared-user", "exp").unwrap().id)
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let seen: HashSet<String> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    assert_eq!(seen.len(), 1);

    let impressions = engine.experiment("exp").unwrap().total_impressions();
    assert_eq!(impressions, 400);
}

#[test]
fn concurrent_cache_reads_count_every_access() {
    let cache = Arc::new(PriorityCache::default());
    cache.set("greeting", b"hello".to_vec(), CacheFlags::core());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for _ in 0..250 {
                    cache.get("greeting");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(cache.get("greeting").unwrap().frequency, 1001);
}

#[test]
fn concurrent_signals_are_all_counted() {
    let store = Arc::new(PreferenceStore::default());
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for _ in 0..25 {
                    store.record_signal("u1", &FeedbackType::Completion, 1.0, None);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let record = store
        .snapshot_user("u1")
        .into_iter()
        .find(|r| r.key == "response.length")
        .unwrap();
    assert_eq!(record.signal_count, 100);
}
