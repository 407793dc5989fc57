//! Online reward model mapping response features to predicted quality.
//!
//! # Learning Algorithm
//!
//! Each feature keeps a learned weight and a running baseline (EMA):
//! 1. Refresh the baselines of the observed features toward their values
//! 2. Predict: `0.5 + Σ weight[f] × (value[f] − baseline[f])`, clamped to [0, 1]
//! 3. Compute prediction error = observed − predicted
//! 4. Gradient step: `weight[f] += α × error × (value[f] − baseline[f])`
//!
//! Baselines are refreshed before the error is computed so that the step
//! always moves the model's prediction for the same vector toward the
//! observed reward. Single pass, no batching: each update is O(features).

use crate::types::clamp_unit;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Named feature values describing one response
pub type FeatureVector = BTreeMap<String, f32>;

/// Default EMA smoothing factor for baselines
pub const DEFAULT_BASELINE_SMOOTHING: f32 = 0.05;

/// Outcome of a single update, for logging and diagnostics
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateOutcome {
    /// Prediction the gradient step was computed against
    pub predicted: f32,
    /// Observed minus predicted
    pub error: f32,
}

/// Small online-learned function from features to a quality score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardModel {
    weights: HashMap<String, f32>,
    baselines: HashMap<String, f32>,
    training_samples: u64,
    last_updated: Option<DateTime<Utc>>,
    baseline_smoothing: f32,
}

impl Default for RewardModel {
    fn default() -> Self {
        Self::new(DEFAULT_BASELINE_SMOOTHING)
    }
}

impl RewardModel {
    pub fn new(baseline_smoothing: f32) -> Self {
        Self {
            weights: HashMap::new(),
            baselines: HashMap::new(),
            training_samples: 0,
            last_updated: None,
            baseline_smoothing: baseline_smoothing.clamp(f32::EPSILON, 1.0),
        }
    }

    /// Predicted quality in [0, 1]; unknown features contribute nothing
    pub fn predict(&self, features: &FeatureVector) -> f32 {
        let raw: f32 = features
            .iter()
            .map(|(name, value)| {
                let weight = self.weights.get(name).copied().unwrap_or(0.0);
                let baseline = self.baselines.get(name).copied().unwrap_or(0.0);
                weight * (value - baseline)
            })
            .sum();
        clamp_unit(0.5 + raw)
    }

    /// Apply one feedback observation
    pub fn update(
        &mut self,
        features: &FeatureVector,
        observed_reward: f32,
        learning_rate: f32,
    ) -> UpdateOutcome {
        let observed = clamp_unit(observed_reward);

        // baselines move first, so the error below is measured against the
        // refreshed baseline rather than the one used by earlier predictions
        for (name, value) in features {
            let baseline = self.baselines.entry(name.clone()).or_insert(0.0);
            *baseline += self.baseline_smoothing * (value - *baseline);
        }

        let predicted = self.predict(features);
        let error = observed - predicted;

        for (name, value) in features {
            let deviation = value - self.baselines.get(name).copied().unwrap_or(0.0);
            *self.weights.entry(name.clone()).or_insert(0.0) += learning_rate * error * deviation;
        }

        self.training_samples += 1;
        self.last_updated = Some(Utc::now());

        debug!(
            "Reward update: predicted={:.3}, observed={:.3}, error={:.3}, samples={}",
            predicted, observed, error, self.training_samples
        );

        UpdateOutcome { predicted, error }
    }

    pub fn training_samples(&self) -> u64 {
        self.training_samples
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    pub fn weight(&self, feature: &str) -> f32 {
        self.weights.get(feature).copied().unwrap_or(0.0)
    }

    pub fn baseline(&self, feature: &str) -> f32 {
        self.baselines.get(feature).copied().unwrap_or(0.0)
    }
}
