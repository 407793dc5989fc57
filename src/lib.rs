//! Attune - Adaptive Personalization & Feedback Learning Engine
//!
//! The learning layer of a conversational wellness companion. It provides:
//! - Multi-modal emotion fusion from text and voice signals
//! - Online reward learning from explicit and implicit feedback
//! - Deterministic experiment assignment with winner analysis
//! - Per-user preferences with decaying confidence
//! - A priority cache that never evicts core content
//! - Sentence-level prosody with smoothed emotional transitions
//! - Tiered cross-session memory
//!
//! # Architecture
//!
//! Each component is an independent, internally synchronized service.
//! [`PersonalizationEngine`] owns them all and exposes the conversation-facing
//! surface; feedback and persistence are deferred through a bounded
//! background queue so they never delay a response.
//!
//! # Example
//!
//! ```ignore
//! use attune_core::{AttuneConfig, FeedbackContext, PersonalizationEngine};
//!
//! #[tokio::main]
//! async fn main() {
//!     let engine = PersonalizationEngine::new(AttuneConfig::default());
//!
//!     let mood = engine.fuse_emotion("I'm so worried about tomorrow", None, "user-1");
//!     let segments = engine.adapt_prosody("Take a breath. You are safe.", "user-1");
//!
//!     engine.record_feedback("user-1", "completion", 1.0, None, FeedbackContext::default());
//!     engine.process_pending().await;
//! }
//! ```

pub mod cache;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod evaluation;
pub mod experiments;
pub mod fusion;
pub mod memory;
pub mod preferences;
pub mod prosody;
pub mod storage;
pub mod types;

pub(crate) mod utils;

// Re-export commonly used types
pub use cache::{CacheEntry, CacheFlags, ContextPredictor, ConversationContext, PriorityCache};
pub use config::AttuneConfig;
pub use dispatch::{BackgroundDispatcher, DispatchOutcome, DispatchStats};
pub use engine::{BackgroundTask, PersonalizationEngine};
pub use error::{AttuneError, Result};
pub use evaluation::{FeedbackContext, FeedbackEvent, FeedbackLearner, FeedbackType, RewardModel};
pub use experiments::{Experiment, ExperimentAssignmentEngine, ExperimentStatus, Targeting, Variant};
pub use fusion::{AcousticFeatures, FusedEmotionResult, Signal, SignalFusionEngine, SignalSource};
pub use memory::{GrowthDimension, Memory, MemoryStore, MemoryType, PriorityTier};
pub use preferences::{PreferenceRecord, PreferenceStore, PreferenceValue};
pub use prosody::{ProsodySegment, SentenceProsodyAdapter, VoicePreferences};
pub use storage::{InMemoryStore, KeyValueStore};
pub use types::{EmotionCategory, UserId};
