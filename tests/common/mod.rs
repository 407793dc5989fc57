//! Common test utilities and helpers

#![allow(dead_code)]

use attune_core::{AttuneConfig, Experiment, PersonalizationEngine, Variant};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;

/// Fixed reference time so time-dependent assertions are exact
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()
}

pub fn days_after(start: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    start + Duration::days(days)
}

pub fn test_engine() -> PersonalizationEngine {
    PersonalizationEngine::new(AttuneConfig::default())
}

/// Experiment with one variant per `(id, weight)`; the first is the control
pub fn weighted_experiment(id: &str, experiment_type: &str, weights: &[(&str, f32)]) -> Experiment {
    let variants = weights
        .iter()
        .map(|(variant_id, weight)| {
            Variant::new(*variant_id, *variant_id, *weight, json!({ "variant": variant_id }))
        })
        .collect();
    Experiment::new(id, id, experiment_type, variants)
}

/// Distinct synthetic user ids
pub fn user_ids(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("user-{:05}", i)).collect()
}
