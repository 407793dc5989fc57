//! Base delivery parameters per emotion
//!
//! Rate and volume are multipliers of normal speech, pitch is an offset in
//! semitones, emphasis is in [0, 1] and pauses are milliseconds. Distressed
//! emotions get slower, lower, softer delivery so the voice stays calming.

use crate::types::EmotionCategory;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProsodyPreset {
    pub speaking_rate: f32,
    pub pitch_offset: f32,
    pub volume: f32,
    pub emphasis: f32,
    pub pause_before_ms: u32,
    pub pause_after_ms: u32,
}

const fn preset(
    speaking_rate: f32,
    pitch_offset: f32,
    volume: f32,
    emphasis: f32,
    pause_before_ms: u32,
    pause_after_ms: u32,
) -> ProsodyPreset {
    ProsodyPreset {
        speaking_rate,
        pitch_offset,
        volume,
        emphasis,
        pause_before_ms,
        pause_after_ms,
    }
}

pub fn preset_for(emotion: EmotionCategory) -> ProsodyPreset {
    match emotion {
        EmotionCategory::Neutral => preset(1.00, 0.0, 1.00, 0.50, 100, 250),
        EmotionCategory::Joy => preset(1.08, 1.5, 1.05, 0.70, 100, 250),
        EmotionCategory::Sadness => preset(0.85, -1.5, 0.90, 0.30, 250, 450),
        EmotionCategory::Anxiety => preset(0.85, -1.0, 0.90, 0.30, 200, 400),
        EmotionCategory::Fear => preset(0.82, -1.2, 0.88, 0.30, 250, 450),
        EmotionCategory::Anger => preset(0.88, -1.5, 0.92, 0.35, 250, 400),
        EmotionCategory::Hope => preset(0.95, 1.0, 1.00, 0.60, 150, 300),
        EmotionCategory::Peace => preset(0.80, -2.0, 0.85, 0.25, 300, 500),
        EmotionCategory::Gratitude => preset(0.98, 0.8, 1.00, 0.55, 150, 300),
        EmotionCategory::Loneliness => preset(0.88, -0.8, 0.92, 0.40, 200, 400),
    }
}
