//! Feedback normalization and online learning from feedback events.
//!
//! Every feedback type maps to a single reward in [0, 1] through a fixed
//! table. Unknown types contribute nothing: they are logged and skipped.
//!
//! Privacy-preserving design: responses are referenced by a truncated
//! SHA-256 hash, never by their text.

use super::reward_model::{FeatureVector, RewardModel};
use crate::config::RewardConfig;
use crate::types::{clamp_unit, UserId};
use crate::utils::bounded::BoundedMap;
use crate::utils::sync::{lock, read, write};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, warn};

/// Maximum number of response feature vectors kept for later feedback
pub const RESPONSE_REGISTRY_CAPACITY: usize = 4096;

/// Samples a personal model needs before it is preferred over the global one
pub const MIN_PERSONAL_SAMPLES: u64 = 10;

/// Hash length stored for response references
const RESPONSE_HASH_LEN: usize = 16;

/// Kind of feedback observed for a response
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackType {
    /// Explicit 1-5 star rating
    Rating,
    ThumbsUp,
    ThumbsDown,
    Skip,
    /// Fraction of the response played back, in [0, 1]
    Completion,
    Replay,
    FollowUp,
    ReturnVisit,
    Interrupt,
    Share,
    Unknown(String),
}

impl FeedbackType {
    /// Parse a snake_case label; anything unrecognized becomes `Unknown`
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "rating" => FeedbackType::Rating,
            "thumbs_up" => FeedbackType::ThumbsUp,
            "thumbs_down" => FeedbackType::ThumbsDown,
            "skip" => FeedbackType::Skip,
            "completion" => FeedbackType::Completion,
            "replay" => FeedbackType::Replay,
            "follow_up" => FeedbackType::FollowUp,
            "return_visit" => FeedbackType::ReturnVisit,
            "interrupt" => FeedbackType::Interrupt,
            "share" => FeedbackType::Share,
            _ => FeedbackType::Unknown(label.to_string()),
        }
    }

    /// Normalize the event into a reward, or `None` for unknown types
    ///
    /// `value` is only read by `Rating` (1-5 stars) and `Completion`
    /// (fraction played); the other types carry fixed rewards.
    pub fn reward(&self, value: f32) -> Option<f32> {
        let reward = match self {
            FeedbackType::Rating => (value - 1.0) / 4.0,
            FeedbackType::ThumbsUp => 1.0,
            FeedbackType::ThumbsDown => 0.0,
            FeedbackType::Skip => 0.2,
            FeedbackType::Completion => value,
            FeedbackType::Replay => 0.8,
            FeedbackType::FollowUp => 0.75,
            FeedbackType::ReturnVisit => 0.9,
            FeedbackType::Interrupt => 0.1,
            FeedbackType::Share => 0.95,
            FeedbackType::Unknown(_) => return None,
        };
        Some(clamp_unit(reward))
    }

    /// Whether the user expressed the feedback deliberately
    pub fn is_explicit(&self) -> bool {
        matches!(
            self,
            FeedbackType::Rating | FeedbackType::ThumbsUp | FeedbackType::ThumbsDown
        )
    }

    /// Whether the feedback signals a positive outcome for experiment tracking
    pub fn is_conversion(&self) -> bool {
        matches!(
            self,
            FeedbackType::ThumbsUp
                | FeedbackType::Replay
                | FeedbackType::FollowUp
                | FeedbackType::ReturnVisit
                | FeedbackType::Share
        )
    }
}

impl std::fmt::Display for FeedbackType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedbackType::Rating => write!(f, "rating"),
            FeedbackType::ThumbsUp => write!(f, "thumbs_up"),
            FeedbackType::ThumbsDown => write!(f, "thumbs_down"),
            FeedbackType::Skip => write!(f, "skip"),
            FeedbackType::Completion => write!(f, "completion"),
            FeedbackType::Replay => write!(f, "replay"),
            FeedbackType::FollowUp => write!(f, "follow_up"),
            FeedbackType::ReturnVisit => write!(f, "return_visit"),
            FeedbackType::Interrupt => write!(f, "interrupt"),
            FeedbackType::Share => write!(f, "share"),
            FeedbackType::Unknown(label) => write!(f, "unknown({})", label),
        }
    }
}

impl From<&str> for FeedbackType {
    fn from(label: &str) -> Self {
        FeedbackType::from_label(label)
    }
}

/// Context attached to a feedback event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedbackContext {
    /// Response features; when empty the registered features for the
    /// response hash are used instead
    #[serde(default)]
    pub features: FeatureVector,
    /// Experiment the response was produced under
    #[serde(default)]
    pub experiment_id: Option<String>,
}

/// One feedback observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEvent {
    pub user_id: UserId,
    pub feedback_type: FeedbackType,
    pub value: f32,
    pub response_hash: Option<String>,
    #[serde(default)]
    pub context: FeedbackContext,
    pub timestamp: DateTime<Utc>,
}

impl FeedbackEvent {
    pub fn new(user_id: impl Into<UserId>, feedback_type: FeedbackType, value: f32) -> Self {
        Self {
            user_id: user_id.into(),
            feedback_type,
            value,
            response_hash: None,
            context: FeedbackContext::default(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_response(mut self, response_hash: impl Into<String>) -> Self {
        self.response_hash = Some(response_hash.into());
        self
    }

    pub fn with_context(mut self, context: FeedbackContext) -> Self {
        self.context = context;
        self
    }
}

/// Truncated SHA-256 reference to a response text
pub fn response_hash(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    hex[..RESPONSE_HASH_LEN].to_string()
}

/// Learns feature→quality associations from feedback events
///
/// Keeps one global model and one model per user. Each model sits behind
/// its own lock so concurrent feedback for different users never contends
/// on the same weights.
pub struct FeedbackLearner {
    config: RewardConfig,
    global: Mutex<RewardModel>,
    per_user: RwLock<BoundedMap<UserId, Arc<Mutex<RewardModel>>>>,
    responses: Mutex<BoundedMap<String, FeatureVector>>,
}

impl FeedbackLearner {
    pub fn new(config: RewardConfig) -> Self {
        let global = RewardModel::new(config.baseline_smoothing);
        Self {
            global: Mutex::new(global),
            per_user: RwLock::new(BoundedMap::new(config.max_user_models)),
            responses: Mutex::new(BoundedMap::new(RESPONSE_REGISTRY_CAPACITY)),
            config,
        }
    }

    /// Remember the features of a rendered response for later feedback
    pub fn register_response(&self, response_hash: impl Into<String>, features: FeatureVector) {
        lock(&self.responses).insert(response_hash.into(), features);
    }

    /// Features previously registered for a response
    pub fn response_features(&self, response_hash: &str) -> Option<FeatureVector> {
        lock(&self.responses).get(response_hash).cloned()
    }

    /// Learn from one feedback event
    ///
    /// Returns the reward applied, or `None` when the event was skipped
    /// (unknown type or no features to learn against).
    pub fn record(&self, event: &FeedbackEvent) -> Option<f32> {
        let Some(reward) = event.feedback_type.reward(event.value) else {
            warn!(
                "Ignoring unknown feedback type {} from user {}",
                event.feedback_type, event.user_id
            );
            return None;
        };

        let features = if event.context.features.is_empty() {
            event
                .response_hash
                .as_deref()
                .and_then(|hash| self.response_features(hash))
                .unwrap_or_default()
        } else {
            event.context.features.clone()
        };

        if features.is_empty() {
            debug!(
                "No features for {} feedback from {}, reward {:.2} not learned",
                event.feedback_type, event.user_id, reward
            );
            return None;
        }

        let learning_rate = self.config.learning_rate;
        lock(&self.global).update(&features, reward, learning_rate);

        let user_model = self.user_model_handle(&event.user_id);
        let outcome = lock(&user_model).update(&features, reward, learning_rate);

        debug!(
            "Learned {} feedback for {}: reward={:.2}, error={:.3}",
            event.feedback_type, event.user_id, reward, outcome.error
        );
        Some(reward)
    }

    /// Predicted quality for a user, falling back to the global model
    /// until the personal model has seen enough samples
    pub fn predict(&self, user_id: &str, features: &FeatureVector) -> f32 {
        let personal = read(&self.per_user).get(user_id).cloned();
        if let Some(model) = personal {
            let model = lock(&model);
            if model.training_samples() >= MIN_PERSONAL_SAMPLES {
                return model.predict(features);
            }
        }
        lock(&self.global).predict(features)
    }

    /// Snapshot of a user's model
    pub fn user_model(&self, user_id: &str) -> Option<RewardModel> {
        let handle = read(&self.per_user).get(user_id).cloned()?;
        let snapshot = lock(&handle).clone();
        Some(snapshot)
    }

    /// Snapshot of the global model
    pub fn global_model(&self) -> RewardModel {
        lock(&self.global).clone()
    }

    pub fn user_count(&self) -> usize {
        read(&self.per_user).len()
    }

    fn user_model_handle(&self, user_id: &str) -> Arc<Mutex<RewardModel>> {
        if let Some(model) = read(&self.per_user).get(user_id) {
            return Arc::clone(model);
        }
        let smoothing = self.config.baseline_smoothing;
        write(&self.per_user).get_or_insert_with(user_id.to_string(), || {
            Arc::new(Mutex::new(RewardModel::new(smoothing)))
        })
    }
}

impl Default for FeedbackLearner {
    fn default() -> Self {
        Self::new(RewardConfig::default())
    }
}
