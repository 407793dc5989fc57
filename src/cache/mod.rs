//! Predictive response cache
//!
//! - **PriorityCache**: frequency/content/age scored entries under a soft
//!   byte budget; core and verse content is never evicted
//! - **ContextPredictor**: transition table + mood boosts for pre-warming

pub mod predictor;
pub mod priority;

pub use predictor::{ContextPredictor, ConversationContext, Prediction};
pub use priority::{content_key, CacheEntry, CacheFlags, CacheStats, PriorityCache};
