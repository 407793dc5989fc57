//! Emotion signals and acoustic feature extraction

use crate::config::FusionConfig;
use crate::types::{clamp_unit, EmotionCategory};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Modality a signal was observed through
///
/// Declaration order is the registration order of the fixed weight table
/// and breaks ties toward earlier sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    Text,
    Pitch,
    Pace,
    Volume,
    Tremor,
    Behavioral,
}

impl SignalSource {
    /// Fixed combination weights, summing to 1.0
    pub const WEIGHTS: [(SignalSource, f32); 6] = [
        (SignalSource::Text, 0.35),
        (SignalSource::Pitch, 0.20),
        (SignalSource::Pace, 0.15),
        (SignalSource::Volume, 0.10),
        (SignalSource::Tremor, 0.10),
        (SignalSource::Behavioral, 0.10),
    ];

    /// Combination weight for this source
    pub fn weight(&self) -> f32 {
        Self::WEIGHTS
            .iter()
            .find(|(source, _)| source == self)
            .map(|(_, weight)| *weight)
            .unwrap_or(0.0)
    }

    /// Position in the weight table
    pub fn rank(&self) -> usize {
        Self::WEIGHTS
            .iter()
            .position(|(source, _)| source == self)
            .unwrap_or(Self::WEIGHTS.len())
    }

    /// Whether the source is derived from audio
    pub fn is_acoustic(&self) -> bool {
        matches!(
            self,
            SignalSource::Pitch | SignalSource::Pace | SignalSource::Volume | SignalSource::Tremor
        )
    }
}

impl std::fmt::Display for SignalSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalSource::Text => write!(f, "text"),
            SignalSource::Pitch => write!(f, "pitch"),
            SignalSource::Pace => write!(f, "pace"),
            SignalSource::Volume => write!(f, "volume"),
            SignalSource::Tremor => write!(f, "tremor"),
            SignalSource::Behavioral => write!(f, "behavioral"),
        }
    }
}

/// A single observation of emotional state from one modality
///
/// Fields are private so a signal cannot change after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    source: SignalSource,
    emotion: EmotionCategory,
    confidence: f32,
    raw_value: f32,
    timestamp: DateTime<Utc>,
}

impl Signal {
    /// Create a signal observed now; confidence is clamped to [0, 1]
    pub fn new(
        source: SignalSource,
        emotion: EmotionCategory,
        confidence: f32,
        raw_value: f32,
    ) -> Self {
        Self::observed_at(source, emotion, confidence, raw_value, Utc::now())
    }

    /// Create a signal with an explicit observation time
    pub fn observed_at(
        source: SignalSource,
        emotion: EmotionCategory,
        confidence: f32,
        raw_value: f32,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            source,
            emotion,
            confidence: clamp_unit(confidence),
            raw_value,
            timestamp,
        }
    }

    pub fn source(&self) -> SignalSource {
        self.source
    }

    pub fn emotion(&self) -> EmotionCategory {
        self.emotion
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn raw_value(&self) -> f32 {
        self.raw_value
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Acoustic features of an utterance, normalized by the audio layer
///
/// All fields except `pitch_mean_hz` are in [0, 1]; 0.5 is typical speech.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcousticFeatures {
    pub pitch_mean_hz: f32,
    pub pitch_variance: f32,
    pub speaking_rate: f32,
    pub volume: f32,
    pub tremor: f32,
    pub voice_quality: f32,
}

impl Default for AcousticFeatures {
    fn default() -> Self {
        Self {
            pitch_mean_hz: 180.0,
            pitch_variance: 0.2,
            speaking_rate: 0.5,
            volume: 0.5,
            tremor: 0.0,
            voice_quality: 0.5,
        }
    }
}

impl AcousticFeatures {
    /// Energy estimate from pace, volume and voice quality
    pub fn energy(&self) -> f32 {
        clamp_unit((self.speaking_rate + self.volume + self.voice_quality) / 3.0)
    }

    /// Convert the features into per-modality signals
    ///
    /// Pitch, pace and volume always produce a signal so their raw values
    /// are available to fusion; tremor only above the configured threshold.
    pub fn to_signals(&self, config: &FusionConfig) -> Vec<Signal> {
        let now = Utc::now();
        let mut signals = Vec::with_capacity(4);

        let variance = clamp_unit(self.pitch_variance);
        let (pitch_emotion, pitch_confidence) = if variance > config.pitch_variance_threshold {
            (EmotionCategory::Anxiety, 0.5 + variance / 2.0)
        } else if variance < 0.1 {
            (EmotionCategory::Sadness, 0.5)
        } else {
            (EmotionCategory::Neutral, 0.5)
        };
        signals.push(Signal::observed_at(
            SignalSource::Pitch,
            pitch_emotion,
            pitch_confidence,
            variance,
            now,
        ));

        let rate = clamp_unit(self.speaking_rate);
        let (pace_emotion, pace_confidence) = if rate > 0.7 {
            (EmotionCategory::Anxiety, rate)
        } else if rate < 0.3 {
            (EmotionCategory::Sadness, 1.0 - rate)
        } else {
            (EmotionCategory::Neutral, 0.5)
        };
        signals.push(Signal::observed_at(
            SignalSource::Pace,
            pace_emotion,
            pace_confidence,
            rate,
            now,
        ));

        let volume = clamp_unit(self.volume);
        let (volume_emotion, volume_confidence) = if volume > 0.75 {
            (EmotionCategory::Anger, volume)
        } else if volume < 0.25 {
            (EmotionCategory::Sadness, 1.0 - volume)
        } else {
            (EmotionCategory::Neutral, 0.5)
        };
        signals.push(Signal::observed_at(
            SignalSource::Volume,
            volume_emotion,
            volume_confidence,
            volume,
            now,
        ));

        let tremor = clamp_unit(self.tremor);
        if tremor > config.tremor_threshold {
            signals.push(Signal::observed_at(
                SignalSource::Tremor,
                EmotionCategory::Fear,
                tremor,
                tremor,
                now,
            ));
        }

        signals
    }
}
