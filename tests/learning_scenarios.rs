//! End-to-end feedback learning through the engine

mod common;

use attune_core::evaluation::{response_hash, FeatureVector, MIN_PERSONAL_SAMPLES};
use attune_core::preferences::keys::{RESPONSE_LENGTH, SPEAKING_RATE};
use attune_core::{FeedbackContext, FeedbackType, PreferenceValue, PreferenceStore};
use common::{days_after, epoch, test_engine};
use serde_json::json;

fn features(pairs: &[(&str, f32)]) -> FeatureVector {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

#[test]
fn skips_then_completions_lengthen_responses() {
    let store = PreferenceStore::default();
    let now = epoch();

    for _ in 0..5 {
        store.record_signal_at("u1", &FeedbackType::Skip, 1.0, None, now);
    }
    let after_skips = store.get_preferences_at("u1", 0.0, now);
    let length = after_skips[RESPONSE_LENGTH].as_number().unwrap();
    assert!((length - 0.2).abs() < 1e-4);
    let rate = after_skips[SPEAKING_RATE].as_number().unwrap();
    assert!((rate - 1.15).abs() < 1e-4);

    for _ in 0..20 {
        store.record_signal_at("u1", &FeedbackType::Completion, 1.0, None, now);
    }
    let confident = store.get_preferences_at("u1", 0.3, now);
    let length = confident[RESPONSE_LENGTH].as_number().unwrap();
    assert!((length - 1.0).abs() < 1e-4);
    // five rate signals are not enough confidence to apply
    assert!(!confident.contains_key(SPEAKING_RATE));
}

#[tokio::test]
async fn engine_feedback_shapes_applied_config() {
    let engine = test_engine();
    for _ in 0..5 {
        engine.record_feedback("u1", "skip", 1.0, None, FeedbackContext::default());
    }
    assert_eq!(engine.process_pending().await, 5);

    let learned = engine.preferences().get_preferences("u1", 0.0);
    assert!((learned[RESPONSE_LENGTH].as_number().unwrap() - 0.2).abs() < 1e-4);
    assert!((learned[SPEAKING_RATE].as_number().unwrap() - 1.15).abs() < 1e-4);

    for _ in 0..20 {
        engine.record_feedback("u1", "completion", 1.0, None, FeedbackContext::default());
    }
    assert_eq!(engine.process_pending().await, 20);

    let base = json!({ "response": { "length": 0.5 }, "voice": { "speaking_rate": 1.0 } });
    let applied = engine.apply_preferences("u1", &base);
    assert!((applied["response"]["length"].as_f64().unwrap() - 1.0).abs() < 1e-4);
    // speaking rate has too little confidence to override the base
    assert_eq!(applied["voice"]["speaking_rate"], json!(1.0));
}

#[test]
fn stale_preferences_fall_below_the_floor() {
    let store = PreferenceStore::default();
    let now = epoch();
    for _ in 0..40 {
        store.record_signal_at("u1", &FeedbackType::Completion, 1.0, None, now);
    }
    assert!(store.get_preferences_at("u1", 0.3, now).contains_key(RESPONSE_LENGTH));

    let later = days_after(now, 30);
    assert!(store.get_preferences_at("u1", 0.3, later).is_empty());
    // the record is still stored, only its confidence decayed
    assert!(store.confidence_at("u1", RESPONSE_LENGTH, later).is_some());
}

#[test]
fn explicit_preferences_override_learned_behaviour() {
    let store = PreferenceStore::default();
    let now = epoch();
    store
        .set_explicit_at("u1", SPEAKING_RATE, PreferenceValue::Number(0.8), now)
        .unwrap();
    for _ in 0..50 {
        store.record_signal_at("u1", &FeedbackType::Skip, 1.0, None, now);
    }

    let far_future = days_after(now, 365);
    let preferences = store.get_preferences_at("u1", 0.3, far_future);
    assert_eq!(preferences[SPEAKING_RATE], PreferenceValue::Number(0.8));
}

#[test]
fn preferences_overlay_nested_config() {
    let engine = test_engine();
    assert!(engine.set_preference("u1", SPEAKING_RATE, PreferenceValue::Number(1.2)));
    assert!(engine.set_preference("u1", "ui.theme", PreferenceValue::from("dusk")));
    assert!(!engine.set_preference("u1", SPEAKING_RATE, PreferenceValue::from("fast")));

    let base = json!({ "voice": { "speaking_rate": 1.0, "pitch": 0.0 }, "model": "small" });
    let applied = engine.apply_preferences("u1", &base);

    assert!((applied["voice"]["speaking_rate"].as_f64().unwrap() - 1.2).abs() < 1e-6);
    assert_eq!(applied["voice"]["pitch"], 0.0);
    assert_eq!(applied["ui"]["theme"], "dusk");
    assert_eq!(applied["model"], "small");

    // unknown users get the base config back untouched
    assert_eq!(engine.apply_preferences("nobody", &base), base);
}

#[tokio::test]
async fn registered_responses_train_the_reward_model() {
    let engine = test_engine();
    let good = response_hash("Let's take three slow breaths together.");
    let bad = response_hash("Here is a long list of facts.");
    engine.register_response(&good, features(&[("empathy", 0.9), ("length", 0.3)]));
    engine.register_response(&bad, features(&[("empathy", 0.1), ("length", 0.9)]));

    for _ in 0..30 {
        engine.record_feedback("u1", "thumbs_up", 1.0, Some(&good), FeedbackContext::default());
        engine.record_feedback("u1", "thumbs_down", 0.0, Some(&bad), FeedbackContext::default());
    }
    assert_eq!(engine.process_pending().await, 60);

    let model = engine.learner().user_model("u1").unwrap();
    assert!(model.training_samples() >= MIN_PERSONAL_SAMPLES);

    let warm = engine
        .learner()
        .predict("u1", &features(&[("empathy", 0.9), ("length", 0.3)]));
    let cold = engine
        .learner()
        .predict("u1", &features(&[("empathy", 0.1), ("length", 0.9)]));
    assert!(warm > cold, "warm {:.3} should beat cold {:.3}", warm, cold);
    assert!((0.0..=1.0).contains(&warm));
}

#[tokio::test]
async fn feedback_without_features_still_shapes_preferences() {
    let engine = test_engine();
    engine.record_feedback("u1", "replay", 1.0, Some("unregistered"), FeedbackContext::default());
    engine.process_pending().await;

    assert!(engine.learner().user_model("u1").is_none());
    let rate = engine
        .preferences()
        .snapshot_user("u1")
        .into_iter()
        .find(|r| r.key == SPEAKING_RATE)
        .and_then(|r| r.value.as_number())
        .unwrap();
    assert!(rate < 1.0);
}
