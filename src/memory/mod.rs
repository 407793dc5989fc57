//! Cross-session memory with tiered retention and relevance ranking
//!
//! Tiers control both retention (critical memories are permanent) and the
//! daily confidence decay applied while a memory goes unaccessed.

pub mod store;
pub mod types;

pub use store::MemoryStore;
pub use types::{GrowthDimension, Memory, MemoryType, PriorityTier, INITIAL_CONFIDENCE};
