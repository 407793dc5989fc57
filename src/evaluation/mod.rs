//! Online learning of response quality from user feedback.
//!
//! # Architecture
//!
//! - **FeedbackType**: fixed mapping from each feedback kind to a reward
//! - **RewardModel**: per-feature weights and EMA baselines, single-pass updates
//! - **FeedbackLearner**: one global and one per-user model, plus a bounded
//!   registry of response features keyed by response hash
//!
//! # Privacy
//!
//! Only hashed response references and numeric features are retained.
//! Response text never enters this module.

pub mod feedback_collector;
pub mod reward_model;

pub use feedback_collector::{
    response_hash, FeedbackContext, FeedbackEvent, FeedbackLearner, FeedbackType,
    MIN_PERSONAL_SAMPLES, RESPONSE_REGISTRY_CAPACITY,
};
pub use reward_model::{FeatureVector, RewardModel, UpdateOutcome};
