//! Next-context prediction for cache pre-warming
//!
//! A fixed transition table gives the base likelihood of each follow-up
//! context; the user's current mood boosts contexts that usually follow
//! that mood. Probabilities are capped at 1.0.

use crate::types::EmotionCategory;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationContext {
    Greeting,
    CheckIn,
    Anxiety,
    Sadness,
    Gratitude,
    Meditation,
    Sleep,
    Reflection,
    Encouragement,
    Farewell,
}

impl ConversationContext {
    pub const ALL: [ConversationContext; 10] = [
        ConversationContext::Greeting,
        ConversationContext::CheckIn,
        ConversationContext::Anxiety,
        ConversationContext::Sadness,
        ConversationContext::Gratitude,
        ConversationContext::Meditation,
        ConversationContext::Sleep,
        ConversationContext::Reflection,
        ConversationContext::Encouragement,
        ConversationContext::Farewell,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ConversationContext::Greeting => "greeting",
            ConversationContext::CheckIn => "check_in",
            ConversationContext::Anxiety => "anxiety",
            ConversationContext::Sadness => "sadness",
            ConversationContext::Gratitude => "gratitude",
            ConversationContext::Meditation => "meditation",
            ConversationContext::Sleep => "sleep",
            ConversationContext::Reflection => "reflection",
            ConversationContext::Encouragement => "encouragement",
            ConversationContext::Farewell => "farewell",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let normalized = label.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL.into_iter().find(|c| c.label() == normalized)
    }

    /// Likely follow-ups and their base probabilities
    fn transitions(&self) -> &'static [(ConversationContext, f32)] {
        use ConversationContext::*;
        match self {
            Greeting => &[(CheckIn, 0.7), (Anxiety, 0.3), (Sadness, 0.25), (Gratitude, 0.2)],
            CheckIn => &[
                (Reflection, 0.5),
                (Anxiety, 0.4),
                (Sadness, 0.35),
                (Encouragement, 0.3),
            ],
            Anxiety => &[(Meditation, 0.6), (Encouragement, 0.5), (Sleep, 0.2)],
            Sadness => &[(Encouragement, 0.6), (Reflection, 0.4), (Meditation, 0.3)],
            Gratitude => &[(Reflection, 0.5), (Farewell, 0.4)],
            Meditation => &[(Reflection, 0.5), (Sleep, 0.4), (Farewell, 0.3)],
            Sleep => &[(Meditation, 0.55), (Farewell, 0.5)],
            Reflection => &[(Gratitude, 0.4), (Encouragement, 0.35), (Farewell, 0.3)],
            Encouragement => &[(Reflection, 0.45), (Farewell, 0.4), (Meditation, 0.3)],
            Farewell => &[(Greeting, 0.2)],
        }
    }
}

impl std::fmt::Display for ConversationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Mood-driven boosts added on top of the transition table
fn mood_boosts(mood: EmotionCategory) -> &'static [(ConversationContext, f32)] {
    use ConversationContext::*;
    match mood {
        EmotionCategory::Anxiety | EmotionCategory::Fear => &[(Meditation, 0.2), (Anxiety, 0.15)],
        EmotionCategory::Anger => &[(Meditation, 0.15), (Reflection, 0.1)],
        EmotionCategory::Sadness => &[(Encouragement, 0.2), (Sadness, 0.15)],
        EmotionCategory::Loneliness => &[(CheckIn, 0.2), (Encouragement, 0.15)],
        EmotionCategory::Joy | EmotionCategory::Gratitude => &[(Gratitude, 0.2)],
        EmotionCategory::Hope => &[(Encouragement, 0.1), (Reflection, 0.1)],
        EmotionCategory::Peace => &[(Reflection, 0.15), (Sleep, 0.1)],
        EmotionCategory::Neutral => &[],
    }
}

/// A predicted next context
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub context: ConversationContext,
    pub probability: f32,
}

/// Predicts likely next conversation contexts
#[derive(Debug, Clone)]
pub struct ContextPredictor {
    threshold: f32,
}

impl ContextPredictor {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    /// Ranked predictions, most likely first
    ///
    /// Ties keep table order, so the ranking is deterministic.
    pub fn predict(
        &self,
        current: ConversationContext,
        mood: Option<EmotionCategory>,
    ) -> Vec<Prediction> {
        let mut predictions: Vec<Prediction> = current
            .transitions()
            .iter()
            .map(|(context, probability)| Prediction {
                context: *context,
                probability: *probability,
            })
            .collect();

        if let Some(mood) = mood {
            for (context, boost) in mood_boosts(mood) {
                match predictions.iter_mut().find(|p| p.context == *context) {
                    Some(existing) => existing.probability += boost,
                    None if *context != current => predictions.push(Prediction {
                        context: *context,
                        probability: *boost,
                    }),
                    None => {}
                }
            }
        }

        for prediction in &mut predictions {
            prediction.probability = prediction.probability.min(1.0);
        }
        predictions.sort_by(|a, b| b.probability.total_cmp(&a.probability));
        predictions
    }

    /// Predictions likely enough to pre-generate content for
    pub fn pregeneration_targets(
        &self,
        current: ConversationContext,
        mood: Option<EmotionCategory>,
    ) -> Vec<Prediction> {
        self.predict(current, mood)
            .into_iter()
            .filter(|p| p.probability >= self.threshold)
            .collect()
    }
}

impl Default for ContextPredictor {
    fn default() -> Self {
        Self::new(0.5)
    }
}
