//! Keyword lexicon for text emotion detection
//!
//! Pure heuristics: tokenize, skip negated tokens, count category hits.
//! Each category with at least one hit yields one text signal.

use super::signal::{Signal, SignalSource};
use crate::types::EmotionCategory;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

static TOKEN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[a-z]+(?:'[a-z]+)?").expect("token pattern is valid"));

const NEGATIONS: &[&str] = &[
    "not", "no", "never", "don't", "doesn't", "didn't", "isn't", "wasn't", "aren't", "can't",
    "without",
];

/// Tokens preceding a keyword that are checked for negation
const NEGATION_WINDOW: usize = 2;

const LEXICON: &[(EmotionCategory, &[&str])] = &[
    (
        EmotionCategory::Joy,
        &[
            "happy", "glad", "excited", "joy", "joyful", "delighted", "wonderful", "great",
            "amazing", "love", "thrilled",
        ],
    ),
    (
        EmotionCategory::Sadness,
        &[
            "sad", "unhappy", "depressed", "miserable", "crying", "cry", "grief", "grieving",
            "heartbroken", "hopeless", "down",
        ],
    ),
    (
        EmotionCategory::Anxiety,
        &[
            "anxious", "anxiety", "worried", "worry", "worrying", "nervous", "panic",
            "uneasy", "stressed", "overwhelmed", "restless",
        ],
    ),
    (
        EmotionCategory::Fear,
        &[
            "scared", "afraid", "terrified", "fear", "frightened", "dread", "fearful",
        ],
    ),
    (
        EmotionCategory::Anger,
        &[
            "angry", "furious", "mad", "annoyed", "frustrated", "rage", "hate", "irritated",
            "resentful",
        ],
    ),
    (
        EmotionCategory::Hope,
        &[
            "hope", "hopeful", "helps", "helped", "helping", "better", "optimistic",
            "improving", "forward", "encouraged",
        ],
    ),
    (
        EmotionCategory::Peace,
        &[
            "calm", "calmer", "peaceful", "peace", "relaxed", "serene", "settled", "rested",
            "content", "soothed",
        ],
    ),
    (
        EmotionCategory::Gratitude,
        &[
            "thank", "thanks", "grateful", "thankful", "appreciate", "appreciated",
            "blessed",
        ],
    ),
    (
        EmotionCategory::Loneliness,
        &[
            "lonely", "alone", "isolated", "lonesome", "abandoned", "nobody", "disconnected",
        ],
    ),
];

/// Keyword-based text emotion analyzer
#[derive(Debug, Clone, Default)]
pub struct TextEmotionAnalyzer;

impl TextEmotionAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Count lexicon hits per category, ignoring negated keywords
    pub fn category_hits(&self, text: &str) -> BTreeMap<EmotionCategory, usize> {
        let lowered = text.to_lowercase();
        let tokens: Vec<&str> = TOKEN_PATTERN
            .find_iter(&lowered)
            .map(|m| m.as_str())
            .collect();

        let mut hits = BTreeMap::new();
        for (index, token) in tokens.iter().enumerate() {
            let negated = tokens[index.saturating_sub(NEGATION_WINDOW)..index]
                .iter()
                .any(|prior| NEGATIONS.contains(prior));
            if negated {
                continue;
            }

            for (category, keywords) in LEXICON.iter() {
                if keywords.contains(token) {
                    *hits.entry(*category).or_insert(0) += 1;
                }
            }
        }
        hits
    }

    /// Produce one text signal per detected category
    ///
    /// Confidence grows with hits: `min(0.95, 0.5 + 0.15 × hits)`.
    pub fn analyze(&self, text: &str) -> Vec<Signal> {
        self.category_hits(text)
            .into_iter()
            .map(|(category, hits)| {
                let confidence = (0.5 + 0.15 * hits as f32).min(0.95);
                Signal::new(SignalSource::Text, category, confidence, hits as f32)
            })
            .collect()
    }
}
