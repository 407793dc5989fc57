//! Per-sentence voice delivery with smoothed emotional transitions.

pub mod adapter;
pub mod presets;

pub use adapter::{split_sentences, ProsodySegment, SentenceProsodyAdapter, VoicePreferences};
pub use presets::{preset_for, ProsodyPreset};
