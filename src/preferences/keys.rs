//! Declared preference keys and the signal adjustment table

use crate::evaluation::FeedbackType;

/// A numeric preference with its default and permitted range
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeySpec {
    pub key: &'static str,
    pub default: f32,
    pub min: f32,
    pub max: f32,
}

impl KeySpec {
    pub fn clamp(&self, value: f32) -> f32 {
        if value.is_nan() {
            self.default
        } else {
            value.clamp(self.min, self.max)
        }
    }
}

pub const SPEAKING_RATE: &str = "voice.speaking_rate";
pub const PITCH: &str = "voice.pitch";
pub const VOLUME: &str = "voice.volume";
pub const RESPONSE_LENGTH: &str = "response.length";
pub const EMPATHY_LEVEL: &str = "response.empathy_level";
pub const MEDITATION_AFFINITY: &str = "content.meditation_affinity";
pub const VERSE_AFFINITY: &str = "content.verse_affinity";

pub const PREFERENCE_KEYS: &[KeySpec] = &[
    KeySpec { key: SPEAKING_RATE, default: 1.0, min: 0.7, max: 1.3 },
    KeySpec { key: PITCH, default: 0.0, min: -5.0, max: 5.0 },
    KeySpec { key: VOLUME, default: 1.0, min: 0.5, max: 1.5 },
    KeySpec { key: RESPONSE_LENGTH, default: 0.5, min: 0.0, max: 1.0 },
    KeySpec { key: EMPATHY_LEVEL, default: 0.5, min: 0.0, max: 1.0 },
    KeySpec { key: MEDITATION_AFFINITY, default: 0.5, min: 0.0, max: 1.0 },
    KeySpec { key: VERSE_AFFINITY, default: 0.5, min: 0.0, max: 1.0 },
];

/// Look up a declared key
pub fn key_spec(key: &str) -> Option<&'static KeySpec> {
    PREFERENCE_KEYS.iter().find(|spec| spec.key == key)
}

/// How one signal type moves preferences
#[derive(Debug, Clone, Copy)]
pub struct SignalRule {
    /// Strength of the signal relative to others
    pub weight: f32,
    /// Keys and the signed direction each is nudged in
    pub adjustments: &'static [(&'static str, f32)],
}

const SKIP: SignalRule = SignalRule {
    weight: 0.6,
    adjustments: &[(SPEAKING_RATE, 0.5), (RESPONSE_LENGTH, -1.0)],
};
const COMPLETION: SignalRule = SignalRule {
    weight: 0.4,
    adjustments: &[(RESPONSE_LENGTH, 1.0)],
};
const REPLAY: SignalRule = SignalRule {
    weight: 0.5,
    adjustments: &[(SPEAKING_RATE, -0.5)],
};
const INTERRUPT: SignalRule = SignalRule {
    weight: 0.5,
    adjustments: &[(RESPONSE_LENGTH, -0.5), (SPEAKING_RATE, 0.3)],
};
const FOLLOW_UP: SignalRule = SignalRule {
    weight: 0.3,
    adjustments: &[(EMPATHY_LEVEL, 0.5), (RESPONSE_LENGTH, 0.3)],
};
const NONE: SignalRule = SignalRule {
    weight: 0.0,
    adjustments: &[],
};

/// Adjustment rule for a signal type
///
/// Ratings, thumbs, shares and return visits judge the response as a whole
/// and carry no directional preference, so they map to no keys.
pub fn signal_rule(signal: &FeedbackType) -> SignalRule {
    match signal {
        FeedbackType::Skip => SKIP,
        FeedbackType::Completion => COMPLETION,
        FeedbackType::Replay => REPLAY,
        FeedbackType::Interrupt => INTERRUPT,
        FeedbackType::FollowUp => FOLLOW_UP,
        FeedbackType::Rating
        | FeedbackType::ThumbsUp
        | FeedbackType::ThumbsDown
        | FeedbackType::ReturnVisit
        | FeedbackType::Share
        | FeedbackType::Unknown(_) => NONE,
    }
}

/// Signal intensity in [0, 1]: completion scales with the fraction played,
/// other signals count fully
pub fn signal_intensity(signal: &FeedbackType, value: f32) -> f32 {
    match signal {
        FeedbackType::Completion => crate::types::clamp_unit(value),
        _ => 1.0,
    }
}
