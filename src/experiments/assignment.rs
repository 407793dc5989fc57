//! Deterministic variant assignment
//!
//! Users are routed by hashing, not by randomness, so the same user always
//! lands in the same slice. Each experiment lives in its own slot behind a
//! mutex holding both the experiment state and its assignment cache: an
//! assignment is decided, cached and counted in a single critical section.

use super::analysis::{self, ExperimentAnalysis};
use super::types::{Experiment, ExperimentStatus, Variant};
use crate::error::{AttuneError, Result};
use crate::types::UserId;
use crate::utils::sync::{lock, read, write};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info, warn};

/// Resolution of the variant buckets
const VARIANT_BUCKETS: u64 = 1000;

/// Hash a key into `[0, modulus)` using the first 8 bytes of SHA-256
pub fn hash_bucket(key: &str, modulus: u64) -> u64 {
    let digest = Sha256::digest(key.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix) % modulus.max(1)
}

/// Whether a user falls inside the experiment's allocated slice
pub fn in_allocation(user_id: &str, experiment_id: &str, user_percentage: u8) -> bool {
    hash_bucket(&format!("{}:{}", user_id, experiment_id), 100) < u64::from(user_percentage)
}

/// Index of the variant whose cumulative weight bucket contains the user
///
/// Falls back to the last variant when weights sum below 1.
pub fn choose_variant(user_id: &str, experiment_id: &str, variants: &[Variant]) -> Option<usize> {
    if variants.is_empty() {
        return None;
    }
    let point = hash_bucket(
        &format!("{}:{}:variant", user_id, experiment_id),
        VARIANT_BUCKETS,
    ) as f64;

    let mut cumulative = 0.0f64;
    for (index, variant) in variants.iter().enumerate() {
        cumulative += f64::from(variant.weight) * VARIANT_BUCKETS as f64;
        if cumulative > point {
            return Some(index);
        }
    }
    Some(variants.len() - 1)
}

/// Experiment state plus its per-user assignment cache
///
/// `None` in the cache records a user outside the allocated slice.
#[derive(Debug)]
struct ExperimentSlot {
    experiment: Experiment,
    assignments: HashMap<UserId, Option<usize>>,
}

impl ExperimentSlot {
    fn assigned_index(&mut self, user_id: &str) -> Option<usize> {
        if let Some(cached) = self.assignments.get(user_id) {
            return *cached;
        }
        let experiment = &self.experiment;
        let decision = if in_allocation(user_id, &experiment.id, experiment.targeting.user_percentage)
        {
            choose_variant(user_id, &experiment.id, &experiment.variants)
        } else {
            None
        };
        self.assignments.insert(user_id.to_string(), decision);
        decision
    }
}

/// Runs experiments: lifecycle, assignment, outcome recording, analysis
#[derive(Default)]
pub struct ExperimentAssignmentEngine {
    experiments: RwLock<BTreeMap<String, Arc<Mutex<ExperimentSlot>>>>,
}

impl ExperimentAssignmentEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an experiment in draft state
    pub fn create_experiment(&self, mut experiment: Experiment) -> Result<()> {
        experiment.validate()?;
        let mut experiments = write(&self.experiments);
        if experiments.contains_key(&experiment.id) {
            return Err(AttuneError::InvalidInput(format!(
                "experiment {} already exists",
                experiment.id
            )));
        }

        experiment.status = ExperimentStatus::Draft;
        experiment.winner_id = None;
        info!(
            "Created experiment {} ({} variants, {}% of users)",
            experiment.id,
            experiment.variants.len(),
            experiment.targeting.user_percentage
        );
        experiments.insert(
            experiment.id.clone(),
            Arc::new(Mutex::new(ExperimentSlot {
                experiment,
                assignments: HashMap::new(),
            })),
        );
        Ok(())
    }

    pub fn start(&self, experiment_id: &str) -> Result<()> {
        self.transition(experiment_id, ExperimentStatus::Running, Utc::now())
    }

    pub fn pause(&self, experiment_id: &str) -> Result<()> {
        self.transition(experiment_id, ExperimentStatus::Paused, Utc::now())
    }

    pub fn resume(&self, experiment_id: &str) -> Result<()> {
        self.transition(experiment_id, ExperimentStatus::Running, Utc::now())
    }

    pub fn cancel(&self, experiment_id: &str) -> Result<()> {
        self.transition(experiment_id, ExperimentStatus::Cancelled, Utc::now())
    }

    /// Complete the experiment and freeze its winner
    pub fn stop(&self, experiment_id: &str) -> Result<Option<String>> {
        self.stop_at(experiment_id, Utc::now())
    }

    pub fn stop_at(&self, experiment_id: &str, now: DateTime<Utc>) -> Result<Option<String>> {
        let slot = self.slot(experiment_id)?;
        let mut slot = lock(&slot);
        let winner = analysis::winner_on_stop(&slot.experiment, now);
        slot.experiment.transition(ExperimentStatus::Completed, now)?;
        slot.experiment.winner_id = winner.clone();

        info!(
            "Stopped experiment {} with winner {}",
            experiment_id,
            winner.as_deref().unwrap_or("none")
        );
        Ok(winner)
    }

    /// Variant for a user, counting one impression
    ///
    /// Returns `None` for unknown or non-running experiments and for users
    /// outside the allocation. Repeat calls return the cached decision.
    pub fn assign_variant(&self, user_id: &str, experiment_id: &str) -> Option<Variant> {
        let Ok(slot) = self.slot(experiment_id) else {
            warn!("Assignment requested for unknown experiment {}", experiment_id);
            return None;
        };
        let mut slot = lock(&slot);
        Self::assign_locked(&mut slot, user_id)
    }

    /// Cached variant id for a user without counting an impression
    pub fn assignment_for(&self, user_id: &str, experiment_id: &str) -> Option<String> {
        let slot = self.slot(experiment_id).ok()?;
        let slot = lock(&slot);
        let index = (*slot.assignments.get(user_id)?)?;
        slot.experiment.variants.get(index).map(|v| v.id.clone())
    }

    /// Configuration for the first matching experiment of a type
    ///
    /// Completed experiments serve their frozen winner to everyone; running
    /// experiments serve the user's assigned variant when targeting matches.
    pub fn get_experiment_config(
        &self,
        user_id: &str,
        experiment_type: &str,
        context: Option<&str>,
        language: Option<&str>,
    ) -> Option<Value> {
        let slots: Vec<Arc<Mutex<ExperimentSlot>>> =
            read(&self.experiments).values().cloned().collect();

        for slot in slots {
            let mut slot = lock(&slot);
            if slot.experiment.experiment_type != experiment_type {
                continue;
            }
            match slot.experiment.status {
                ExperimentStatus::Completed => {
                    let experiment = &slot.experiment;
                    let winner = experiment
                        .winner_id
                        .as_deref()
                        .and_then(|id| experiment.variant(id));
                    if let Some(variant) = winner {
                        return Some(variant.config.clone());
                    }
                }
                ExperimentStatus::Running => {
                    if !slot.experiment.targeting.matches(context, language) {
                        continue;
                    }
                    if let Some(variant) = Self::assign_locked(&mut slot, user_id) {
                        return Some(variant.config);
                    }
                }
                _ => {}
            }
        }
        None
    }

    /// Count a conversion for the user's assigned variant
    pub fn record_conversion(&self, user_id: &str, experiment_id: &str) -> bool {
        self.record_outcome(user_id, experiment_id, |variant| variant.conversions += 1)
    }

    /// Add a rating for the user's assigned variant
    pub fn record_rating(&self, user_id: &str, experiment_id: &str, rating: f32) -> bool {
        if !rating.is_finite() {
            warn!("Ignoring non-finite rating for experiment {}", experiment_id);
            return false;
        }
        self.record_outcome(user_id, experiment_id, |variant| {
            variant.rating_sum += f64::from(rating);
            variant.rating_count += 1;
        })
    }

    /// Replace variant weights; existing assignments are kept
    pub fn update_variant_weights(
        &self,
        experiment_id: &str,
        weights: &HashMap<String, f32>,
    ) -> Result<()> {
        if let Some((id, weight)) = weights.iter().find(|(_, w)| !(0.0..=1.0).contains(*w)) {
            return Err(AttuneError::InvalidInput(format!(
                "variant {} weight {} outside [0, 1]",
                id, weight
            )));
        }

        let slot = self.slot(experiment_id)?;
        let mut slot = lock(&slot);
        for variant in slot.experiment.variants.iter_mut() {
            if let Some(weight) = weights.get(&variant.id) {
                variant.weight = *weight;
            }
        }
        info!("Updated variant weights for experiment {}", experiment_id);
        Ok(())
    }

    pub fn analyze(&self, experiment_id: &str) -> Result<ExperimentAnalysis> {
        self.analyze_at(experiment_id, Utc::now())
    }

    pub fn analyze_at(&self, experiment_id: &str, now: DateTime<Utc>) -> Result<ExperimentAnalysis> {
        let slot = self.slot(experiment_id)?;
        let slot = lock(&slot);
        Ok(analysis::analyze(&slot.experiment, now))
    }

    /// Snapshot of an experiment's current state
    pub fn experiment(&self, experiment_id: &str) -> Option<Experiment> {
        let slot = self.slot(experiment_id).ok()?;
        let snapshot = lock(&slot).experiment.clone();
        Some(snapshot)
    }

    pub fn experiment_ids(&self) -> Vec<String> {
        read(&self.experiments).keys().cloned().collect()
    }

    fn transition(&self, experiment_id: &str, to: ExperimentStatus, now: DateTime<Utc>) -> Result<()> {
        let slot = self.slot(experiment_id)?;
        lock(&slot).experiment.transition(to, now)?;
        info!("Experiment {} is now {}", experiment_id, to);
        Ok(())
    }

    fn assign_locked(slot: &mut ExperimentSlot, user_id: &str) -> Option<Variant> {
        if slot.experiment.status != ExperimentStatus::Running {
            debug!(
                "Experiment {} is {}, no assignment",
                slot.experiment.id, slot.experiment.status
            );
            return None;
        }
        let index = slot.assigned_index(user_id)?;
        let variant = slot.experiment.variants.get_mut(index)?;
        variant.impressions += 1;
        Some(variant.clone())
    }

    fn record_outcome(
        &self,
        user_id: &str,
        experiment_id: &str,
        apply: impl FnOnce(&mut Variant),
    ) -> bool {
        let Ok(slot) = self.slot(experiment_id) else {
            warn!("Outcome recorded for unknown experiment {}", experiment_id);
            return false;
        };
        let mut slot = lock(&slot);
        if !matches!(
            slot.experiment.status,
            ExperimentStatus::Running | ExperimentStatus::Paused
        ) {
            debug!(
                "Ignoring outcome for {} experiment {}",
                slot.experiment.status, experiment_id
            );
            return false;
        }
        let Some(Some(index)) = slot.assignments.get(user_id).copied() else {
            warn!(
                "User {} has no assignment in experiment {}",
                user_id, experiment_id
            );
            return false;
        };
        match slot.experiment.variants.get_mut(index) {
            Some(variant) => {
                apply(variant);
                true
            }
            None => false,
        }
    }

    fn slot(&self, experiment_id: &str) -> Result<Arc<Mutex<ExperimentSlot>>> {
        read(&self.experiments)
            .get(experiment_id)
            .cloned()
            .ok_or_else(|| AttuneError::ExperimentNotFound(experiment_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiments::types::Targeting;
    use serde_json::json;

    fn two_way(id: &str, percentage: u8) -> Experiment {
        Experiment::new(
            id,
            "Pacing",
            "voice",
            vec![
                Variant::new("control", "Control", 0.5, json!({"rate": 1.0})),
                Variant::new("slow", "Slow", 0.5, json!({"rate": 0.9})),
            ],
        )
        .with_targeting(Targeting {
            user_percentage: percentage,
            ..Default::default()
        })
        .with_min_sample_size(10)
    }

    fn running(experiment: Experiment) -> ExperimentAssignmentEngine {
        let engine = ExperimentAssignmentEngine::new();
        let id = experiment.id.clone();
        engine.create_experiment(experiment).unwrap();
        engine.start(&id).unwrap();
        engine
    }

    #[test]
    fn test_hash_bucket_range() {
        for i in 0..200 {
            assert!(hash_bucket(&format!("user-{}", i), 100) < 100);
        }
        assert_eq!(hash_bucket("a:b", 1000), hash_bucket("a:b", 1000));
    }

    #[test]
    fn test_draft_experiment_assigns_nothing() {
        let engine = ExperimentAssignmentEngine::new();
        engine.create_experiment(two_way("exp", 100)).unwrap();
        assert!(engine.assign_variant("u1", "exp").is_none());
        assert!(engine.assign_variant("u1", "missing").is_none());
    }

    #[test]
    fn test_assignment_is_sticky_and_counts_impressions() {
        let engine = running(two_way("exp", 100));
        let first = engine.assign_variant("u1", "exp").unwrap();
        for _ in 0..4 {
            assert_eq!(engine.assign_variant("u1", "exp").unwrap().id, first.id);
        }
        let experiment = engine.experiment("exp").unwrap();
        assert_eq!(experiment.variant(&first.id).unwrap().impressions, 5);
        assert_eq!(experiment.total_impressions(), 5);
    }

    #[test]
    fn test_weight_edits_only_affect_new_users() {
        let engine = running(two_way("exp", 100));
        let users: Vec<String> = (0..50).map(|i| format!("user-{}", i)).collect();
        let before: Vec<String> = users
            .iter()
            .map(|u| engine.assign_variant(u, "exp").unwrap().id)
            .collect();

        let weights = HashMap::from([("control".to_string(), 0.0), ("slow".to_string(), 1.0)]);
        engine.update_variant_weights("exp", &weights).unwrap();

        for (user, expected) in users.iter().zip(before) {
            assert_eq!(engine.assign_variant(user, "exp").unwrap().id, expected);
        }
        for i in 0..20 {
            let fresh = engine.assign_variant(&format!("late-{}", i), "exp").unwrap();
            assert_eq!(fresh.id, "slow");
        }
    }

    #[test]
    fn test_excluded_users_stay_excluded() {
        let engine = running(two_way("exp", 0));
        for i in 0..20 {
            assert!(engine.assign_variant(&format!("u{}", i), "exp").is_none());
        }
        assert_eq!(engine.experiment("exp").unwrap().total_impressions(), 0);
    }

    #[test]
    fn test_outcomes_require_assignment() {
        let engine = running(two_way("exp", 100));
        assert!(!engine.record_conversion("u1", "exp"));

        let variant = engine.assign_variant("u1", "exp").unwrap();
        assert!(engine.record_conversion("u1", "exp"));
        assert!(engine.record_rating("u1", "exp", 4.0));
        assert!(!engine.record_rating("u1", "missing", 4.0));

        let experiment = engine.experiment("exp").unwrap();
        let stats = experiment.variant(&variant.id).unwrap();
        assert_eq!(stats.conversions, 1);
        assert_eq!(stats.average_rating(), Some(4.0));
    }

    #[test]
    fn test_stop_freezes_winner() {
        let engine = running(two_way("exp", 100));
        for i in 0..400 {
            let user = format!("u{}", i);
            let variant = engine.assign_variant(&user, "exp").unwrap();
            if variant.id == "slow" || i % 10 == 0 {
                engine.record_conversion(&user, "exp");
            }
        }

        let winner = engine.stop("exp").unwrap();
        assert_eq!(winner.as_deref(), Some("slow"));

        // later outcomes are ignored and the winner never changes
        assert!(!engine.record_conversion("u1", "exp"));
        let analysis = engine.analyze("exp").unwrap();
        assert_eq!(analysis.winner_id.as_deref(), Some("slow"));
        assert!(engine.stop("exp").is_err());
    }

    #[test]
    fn test_completed_experiment_serves_winner() {
        let engine = running(two_way("exp", 0));
        engine.stop("exp").unwrap();

        let config = engine
            .get_experiment_config("anyone", "voice", None, None)
            .unwrap();
        assert_eq!(config, json!({"rate": 1.0}));
        assert!(engine
            .get_experiment_config("anyone", "response", None, None)
            .is_none());
    }

    #[test]
    fn test_config_respects_targeting() {
        let experiment = two_way("exp", 100).with_targeting(Targeting {
            user_percentage: 100,
            languages: vec!["es".to_string()],
            contexts: vec![],
        });
        let engine = running(experiment);

        assert!(engine
            .get_experiment_config("u1", "voice", None, Some("en"))
            .is_none());
        assert!(engine
            .get_experiment_config("u1", "voice", None, Some("es"))
            .is_some());
        assert!(engine.assignment_for("u1", "exp").is_some());
    }

    #[test]
    fn test_unknown_experiment_errors() {
        let engine = ExperimentAssignmentEngine::new();
        assert!(matches!(
            engine.start("nope"),
            Err(AttuneError::ExperimentNotFound(_))
        ));
        assert!(engine.analyze("nope").is_err());
    }

    #[test]
    fn test_duplicate_experiment_rejected() {
        let engine = ExperimentAssignmentEngine::new();
        engine.create_experiment(two_way("exp", 100)).unwrap();
        assert!(engine.create_experiment(two_way("exp", 100)).is_err());
        assert_eq!(engine.experiment_ids(), vec!["exp".to_string()]);
    }
}
