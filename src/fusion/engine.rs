//! Confidence-weighted fusion of emotion signals
//!
//! # Algorithm
//!
//! For every category, accumulate `confidence × source_weight` and the sum of
//! the weights that voted for it. The fused score is the quotient, a weighted
//! mean, so sources that did not vote for a category never dilute it.
//!
//! Primary emotion is the argmax, with ties broken by:
//! 1. more contributing signals
//! 2. earliest contributing source in the weight table
//! 3. category declaration order

use super::lexicon::TextEmotionAnalyzer;
use super::signal::{AcousticFeatures, Signal, SignalSource};
use crate::config::FusionConfig;
use crate::types::{clamp_unit, EmotionCategory};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Confidence reported when there is no information at all
pub const NO_INFORMATION_CONFIDENCE: f32 = 0.5;

/// Flat stress boost when a tremor signal is present
const TREMOR_STRESS_BOOST: f32 = 0.8;

/// Stress boost when pitch variance exceeds the configured threshold
const PITCH_VARIANCE_STRESS_BOOST: f32 = 0.3;

const SCORE_EPSILON: f32 = 1e-6;

/// Result of fusing all signals of one analysis call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedEmotionResult {
    pub primary: EmotionCategory,
    pub confidence: f32,
    pub scores: BTreeMap<EmotionCategory, f32>,
    pub stress_level: f32,
    pub energy_level: f32,
    pub signals: Vec<Signal>,
}

impl FusedEmotionResult {
    /// The "no information" result: neutral at 0.5 confidence
    pub fn neutral() -> Self {
        let mut scores = BTreeMap::new();
        scores.insert(EmotionCategory::Neutral, NO_INFORMATION_CONFIDENCE);
        Self {
            primary: EmotionCategory::Neutral,
            confidence: NO_INFORMATION_CONFIDENCE,
            scores,
            stress_level: 0.0,
            energy_level: 0.5,
            signals: Vec::new(),
        }
    }

    /// Fused score for a category, 0.0 when no signal voted for it
    pub fn score(&self, category: EmotionCategory) -> f32 {
        self.scores.get(&category).copied().unwrap_or(0.0)
    }
}

#[derive(Debug, Default)]
struct Accumulator {
    weighted: f32,
    weight_sum: f32,
    count: usize,
    earliest_source: usize,
}

/// Combines independent emotion signals into one estimate
#[derive(Debug, Clone)]
pub struct SignalFusionEngine {
    config: FusionConfig,
    analyzer: TextEmotionAnalyzer,
}

impl SignalFusionEngine {
    pub fn new(config: FusionConfig) -> Self {
        Self {
            config,
            analyzer: TextEmotionAnalyzer::new(),
        }
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// Fuse a set of signals
    ///
    /// Energy comes from pace/volume raw values when such signals exist,
    /// otherwise from the polarity heuristic over the fused scores.
    pub fn fuse(&self, signals: Vec<Signal>) -> FusedEmotionResult {
        self.fuse_inner(signals, None)
    }

    /// Analyze an utterance from its text and optional acoustic features
    pub fn analyze(&self, text: &str, acoustic: Option<&AcousticFeatures>) -> FusedEmotionResult {
        let mut signals = self.analyzer.analyze(text);
        if let Some(features) = acoustic {
            signals.extend(features.to_signals(&self.config));
        }
        self.fuse_inner(signals, acoustic)
    }

    /// Text-only detection, used per sentence by the prosody adapter
    pub fn detect_text(&self, text: &str) -> FusedEmotionResult {
        self.fuse_inner(self.analyzer.analyze(text), None)
    }

    fn fuse_inner(
        &self,
        signals: Vec<Signal>,
        acoustic: Option<&AcousticFeatures>,
    ) -> FusedEmotionResult {
        if signals.is_empty() {
            debug!("No signals to fuse, returning neutral default");
            return FusedEmotionResult::neutral();
        }

        let mut accumulators: BTreeMap<EmotionCategory, Accumulator> = BTreeMap::new();
        for signal in &signals {
            let weight = signal.source().weight();
            let entry = accumulators
                .entry(signal.emotion())
                .or_insert_with(|| Accumulator {
                    earliest_source: usize::MAX,
                    ..Default::default()
                });
            entry.weighted += signal.confidence() * weight;
            entry.weight_sum += weight;
            entry.count += 1;
            entry.earliest_source = entry.earliest_source.min(signal.source().rank());
        }

        let scores: BTreeMap<EmotionCategory, f32> = accumulators
            .iter()
            .map(|(category, acc)| {
                let score = if acc.weight_sum > 0.0 {
                    acc.weighted / acc.weight_sum
                } else {
                    0.0
                };
                (*category, clamp_unit(score))
            })
            .collect();

        let (primary, confidence) = select_primary(&scores, &accumulators);
        let stress_level = self.stress_level(&signals);
        let energy_level = match acoustic {
            Some(features) => features.energy(),
            None => energy_from_signals(&signals).unwrap_or_else(|| polarity_energy(&scores)),
        };

        debug!(
            "Fused {} signals: primary={} confidence={:.2} stress={:.2} energy={:.2}",
            signals.len(),
            primary,
            confidence,
            stress_level,
            energy_level
        );

        FusedEmotionResult {
            primary,
            confidence,
            scores,
            stress_level,
            energy_level,
            signals,
        }
    }

    /// Mean confidence of stress signals plus tremor and pitch-variance boosts
    fn stress_level(&self, signals: &[Signal]) -> f32 {
        let stress: Vec<f32> = signals
            .iter()
            .filter(|s| s.emotion().is_stress())
            .map(|s| s.confidence())
            .collect();
        let mut level = if stress.is_empty() {
            0.0
        } else {
            stress.iter().sum::<f32>() / stress.len() as f32
        };

        if signals.iter().any(|s| s.source() == SignalSource::Tremor) {
            level += TREMOR_STRESS_BOOST;
        }

        let pitch_variance = signals
            .iter()
            .filter(|s| s.source() == SignalSource::Pitch)
            .map(|s| s.raw_value())
            .fold(f32::MIN, f32::max);
        if pitch_variance > self.config.pitch_variance_threshold {
            level += PITCH_VARIANCE_STRESS_BOOST;
        }

        clamp_unit(level)
    }
}

impl Default for SignalFusionEngine {
    fn default() -> Self {
        Self::new(FusionConfig::default())
    }
}

fn select_primary(
    scores: &BTreeMap<EmotionCategory, f32>,
    accumulators: &BTreeMap<EmotionCategory, Accumulator>,
) -> (EmotionCategory, f32) {
    let mut best: Option<(EmotionCategory, f32)> = None;

    // BTreeMap iterates in declaration order, so strict comparisons keep
    // the earlier category on a complete tie.
    for (category, score) in scores {
        let Some((best_category, best_score)) = best else {
            best = Some((*category, *score));
            continue;
        };

        let better = if (score - best_score).abs() > SCORE_EPSILON {
            *score > best_score
        } else {
            let current = &accumulators[category];
            let incumbent = &accumulators[&best_category];
            if current.count != incumbent.count {
                current.count > incumbent.count
            } else {
                current.earliest_source < incumbent.earliest_source
            }
        };

        if better {
            best = Some((*category, *score));
        }
    }

    best.unwrap_or((EmotionCategory::Neutral, NO_INFORMATION_CONFIDENCE))
}

/// Mean raw value of pace and volume signals, if any exist
fn energy_from_signals(signals: &[Signal]) -> Option<f32> {
    let values: Vec<f32> = signals
        .iter()
        .filter(|s| matches!(s.source(), SignalSource::Pace | SignalSource::Volume))
        .map(|s| clamp_unit(s.raw_value()))
        .collect();
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f32>() / values.len() as f32)
    }
}

/// Energy heuristic from score-weighted polarity and arousal
fn polarity_energy(scores: &BTreeMap<EmotionCategory, f32>) -> f32 {
    let total: f32 = scores.values().sum();
    if total <= 0.0 {
        return 0.5;
    }
    let polarity: f32 = scores.iter().map(|(c, s)| c.polarity() * s).sum::<f32>() / total;
    let arousal: f32 = scores.iter().map(|(c, s)| c.arousal() * s).sum::<f32>() / total;
    clamp_unit(0.5 + 0.25 * polarity + 0.5 * (arousal - 0.5))
}
