//! Core data types shared across the Attune engine
//!
//! Defines the emotion vocabulary every component speaks (fusion, prosody,
//! prediction, memory) plus the small numeric and time helpers used to keep
//! confidences inside the unit interval.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of an end user
pub type UserId = String;

/// Emotion categories recognised by the engine
///
/// Declaration order is significant: it is the last deterministic
/// tie-break when two categories fuse to identical scores.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EmotionCategory {
    #[default]
    Neutral,
    Joy,
    Sadness,
    Anxiety,
    Fear,
    Anger,
    Hope,
    Peace,
    Gratitude,
    Loneliness,
}

impl EmotionCategory {
    /// Every category in declaration order
    pub const ALL: [EmotionCategory; 10] = [
        EmotionCategory::Neutral,
        EmotionCategory::Joy,
        EmotionCategory::Sadness,
        EmotionCategory::Anxiety,
        EmotionCategory::Fear,
        EmotionCategory::Anger,
        EmotionCategory::Hope,
        EmotionCategory::Peace,
        EmotionCategory::Gratitude,
        EmotionCategory::Loneliness,
    ];

    /// Categories whose confidence feeds the stress estimate
    pub fn is_stress(&self) -> bool {
        matches!(
            self,
            EmotionCategory::Anxiety | EmotionCategory::Fear | EmotionCategory::Anger
        )
    }

    /// Valence in [-1, 1]
    pub fn polarity(&self) -> f32 {
        match self {
            EmotionCategory::Joy => 1.0,
            EmotionCategory::Gratitude => 0.9,
            EmotionCategory::Hope => 0.7,
            EmotionCategory::Peace => 0.6,
            EmotionCategory::Neutral => 0.0,
            EmotionCategory::Loneliness => -0.6,
            EmotionCategory::Sadness => -0.8,
            EmotionCategory::Anxiety => -0.7,
            EmotionCategory::Fear => -0.8,
            EmotionCategory::Anger => -0.9,
        }
    }

    /// Arousal in [0, 1]
    pub fn arousal(&self) -> f32 {
        match self {
            EmotionCategory::Anger => 0.9,
            EmotionCategory::Fear => 0.85,
            EmotionCategory::Anxiety => 0.8,
            EmotionCategory::Joy => 0.75,
            EmotionCategory::Hope => 0.55,
            EmotionCategory::Gratitude => 0.5,
            EmotionCategory::Neutral => 0.5,
            EmotionCategory::Loneliness => 0.3,
            EmotionCategory::Sadness => 0.25,
            EmotionCategory::Peace => 0.2,
        }
    }

    /// Parse a snake_case label
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized = label.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|category| category.to_string() == normalized)
    }
}

impl std::fmt::Display for EmotionCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            EmotionCategory::Neutral => "neutral",
            EmotionCategory::Joy => "joy",
            EmotionCategory::Sadness => "sadness",
            EmotionCategory::Anxiety => "anxiety",
            EmotionCategory::Fear => "fear",
            EmotionCategory::Anger => "anger",
            EmotionCategory::Hope => "hope",
            EmotionCategory::Peace => "peace",
            EmotionCategory::Gratitude => "gratitude",
            EmotionCategory::Loneliness => "loneliness",
        };
        write!(f, "{}", label)
    }
}

/// Clamp to the unit interval, mapping NaN to 0.0
pub fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Fractional days elapsed from `then` to `now`, never negative
pub fn days_between(then: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let seconds = now.signed_duration_since(then).num_milliseconds() as f64 / 1000.0;
    (seconds / 86_400.0).max(0.0)
}

/// Fractional hours elapsed from `then` to `now`, never negative
pub fn hours_between(then: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    days_between(then, now) * 24.0
}
