//! Sentence-by-sentence delivery adaptation
//!
//! Each sentence gets the preset of its detected emotion. When the emotion
//! changes with enough confidence the sentence is a transition point and
//! its prosody is blended with the previous segment instead of snapping.
//! Pauses never shrink across a sentence boundary.

use super::presets::{preset_for, ProsodyPreset};
use crate::config::ProsodyConfig;
use crate::fusion::SignalFusionEngine;
use crate::types::EmotionCategory;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

static SENTENCE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^.!?]+(?:[.!?]+|$)").expect("sentence pattern is valid"));

/// Split text into trimmed sentences, keeping terminal punctuation
///
/// The single-character ellipsis is normalized to `...` first so both forms
/// end a sentence the same way.
pub fn split_sentences(text: &str) -> Vec<String> {
    let normalized = text.replace('…', "...");
    SENTENCE_PATTERN
        .find_iter(&normalized)
        .map(|m| m.as_str().trim())
        .filter(|s| s.chars().any(char::is_alphanumeric))
        .map(str::to_string)
        .collect()
}

/// Delivery parameters for one sentence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProsodySegment {
    pub text: String,
    pub emotion: EmotionCategory,
    pub confidence: f32,
    pub speaking_rate: f32,
    pub pitch_offset: f32,
    pub volume: f32,
    pub emphasis: f32,
    pub pause_before_ms: u32,
    pub pause_after_ms: u32,
    pub is_transition: bool,
}

/// User voice settings applied on top of the presets
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoicePreferences {
    /// Rate multiplier
    pub speaking_rate: f32,
    /// Pitch shift in semitones
    pub pitch: f32,
    /// Volume multiplier
    pub volume: f32,
}

impl Default for VoicePreferences {
    fn default() -> Self {
        Self {
            speaking_rate: 1.0,
            pitch: 0.0,
            volume: 1.0,
        }
    }
}

pub struct SentenceProsodyAdapter {
    config: ProsodyConfig,
    fusion: Arc<SignalFusionEngine>,
}

impl SentenceProsodyAdapter {
    pub fn new(config: ProsodyConfig, fusion: Arc<SignalFusionEngine>) -> Self {
        Self { config, fusion }
    }

    /// Segments in preset space, before user preferences
    pub fn adapt_base(&self, text: &str) -> Vec<ProsodySegment> {
        let mut segments: Vec<ProsodySegment> = Vec::new();

        for sentence in split_sentences(text) {
            let detected = self.fusion.detect_text(&sentence);
            let preset = preset_for(detected.primary);

            let segment = match segments.last() {
                Some(previous)
                    if previous.emotion != detected.primary
                        && detected.confidence > self.config.transition_threshold =>
                {
                    debug!(
                        "Prosody transition {} -> {} at {:.2}",
                        previous.emotion, detected.primary, detected.confidence
                    );
                    let mut blended = self.blend(previous, &preset, sentence, detected.primary);
                    blended.confidence = detected.confidence;
                    blended
                }
                _ => from_preset(sentence, detected.primary, detected.confidence, &preset),
            };

            let segment = match segments.last() {
                Some(previous) => ProsodySegment {
                    pause_before_ms: segment.pause_before_ms.max(previous.pause_after_ms),
                    ..segment
                },
                None => segment,
            };
            segments.push(segment);
        }
        segments
    }

    /// Segments with the user's voice settings applied
    pub fn adapt(&self, text: &str, voice: &VoicePreferences) -> Vec<ProsodySegment> {
        self.adapt_base(text)
            .into_iter()
            .map(|segment| ProsodySegment {
                speaking_rate: segment.speaking_rate * voice.speaking_rate,
                pitch_offset: segment.pitch_offset + voice.pitch,
                volume: segment.volume * voice.volume,
                ..segment
            })
            .collect()
    }

    fn blend(
        &self,
        previous: &ProsodySegment,
        next: &ProsodyPreset,
        text: String,
        emotion: EmotionCategory,
    ) -> ProsodySegment {
        let keep = self.config.previous_weight;
        let take = 1.0 - keep;
        let mix = |a: f32, b: f32| a * keep + b * take;
        ProsodySegment {
            text,
            emotion,
            confidence: 0.0,
            speaking_rate: mix(previous.speaking_rate, next.speaking_rate),
            pitch_offset: mix(previous.pitch_offset, next.pitch_offset),
            volume: mix(previous.volume, next.volume),
            emphasis: mix(previous.emphasis, next.emphasis),
            pause_before_ms: next.pause_before_ms,
            pause_after_ms: next.pause_after_ms,
            is_transition: true,
        }
    }
}

fn from_preset(
    text: String,
    emotion: EmotionCategory,
    confidence: f32,
    preset: &ProsodyPreset,
) -> ProsodySegment {
    ProsodySegment {
        text,
        emotion,
        confidence,
        speaking_rate: preset.speaking_rate,
        pitch_offset: preset.pitch_offset,
        volume: preset.volume,
        emphasis: preset.emphasis,
        pause_before_ms: preset.pause_before_ms,
        pause_after_ms: preset.pause_after_ms,
        is_transition: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> SentenceProsodyAdapter {
        SentenceProsodyAdapter::new(
            ProsodyConfig::default(),
            Arc::new(SignalFusionEngine::default()),
        )
    }

    #[test]
    fn test_split_sentences() {
        assert_eq!(
            split_sentences("Hello there. How are you? Great!"),
            vec!["Hello there.", "How are you?", "Great!"]
        );
        assert_eq!(
            split_sentences("Wait… what... okay"),
            vec!["Wait...", "what...", "okay"]
        );
        assert!(split_sentences("  ... ").is_empty());
    }

    #[test]
    fn test_same_emotion_is_not_a_transition() {
        let segments = adapter().adapt_base("I am so happy. This is wonderful.");
        assert_eq!(segments.len(), 2);
        assert!(segments.iter().all(|s| s.emotion == EmotionCategory::Joy));
        assert!(!segments[1].is_transition);
        assert_eq!(
            segments[1].speaking_rate,
            preset_for(EmotionCategory::Joy).speaking_rate
        );
    }

    #[test]
    fn test_low_confidence_change_snaps_without_blending() {
        // the neutral sentence has no keywords and only 0.5 confidence
        let segments = adapter().adapt_base("I am so happy. The bus comes at noon.");
        assert_eq!(segments[1].emotion, EmotionCategory::Neutral);
        assert!(!segments[1].is_transition);
        assert_eq!(segments[1].speaking_rate, 1.0);
    }

    #[test]
    fn test_pauses_never_shrink() {
        let segments = adapter().adapt_base("I feel so sad. I am happy now.");
        let sad = preset_for(EmotionCategory::Sadness);
        assert_eq!(segments[1].pause_before_ms, sad.pause_after_ms);
    }

    #[test]
    fn test_voice_preferences_scale_presets() {
        let voice = VoicePreferences {
            speaking_rate: 1.2,
            pitch: -1.0,
            volume: 0.5,
        };
        let segments = adapter().adapt("The bus comes at noon.", &voice);
        assert!((segments[0].speaking_rate - 1.2).abs() < 1e-6);
        assert!((segments[0].pitch_offset + 1.0).abs() < 1e-6);
        assert!((segments[0].volume - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_empty_text_has_no_segments() {
        assert!(adapter().adapt("", &VoicePreferences::default()).is_empty());
    }
}
