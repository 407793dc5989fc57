//! Configuration for the Attune engine
//!
//! Every section is fully defaulted, so an empty TOML document (or no file
//! at all) yields the tuned production values. [`AttuneConfig::load`] layers
//! `ATTUNE__SECTION__FIELD` environment variables over an optional file.

use crate::error::{AttuneError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Environment prefix for layered configuration
const ENV_PREFIX: &str = "ATTUNE";

/// Top-level engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttuneConfig {
    pub fusion: FusionConfig,
    pub reward: RewardConfig,
    pub preferences: PreferenceConfig,
    pub cache: CacheConfig,
    pub prosody: ProsodyConfig,
    pub memory: MemoryConfig,
    pub dispatch: DispatchConfig,
}

/// Signal fusion thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Normalized pitch variance above which stress is boosted
    pub pitch_variance_threshold: f32,

    /// Tremor intensity above which a tremor signal is emitted
    pub tremor_threshold: f32,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            pitch_variance_threshold: 0.35,
            tremor_threshold: 0.3,
        }
    }
}

/// Online reward model settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    /// Gradient step size for feedback updates
    pub learning_rate: f32,

    /// EMA smoothing factor for per-feature baselines
    pub baseline_smoothing: f32,

    /// Personal models kept in memory; the least recently created is
    /// dropped and that user falls back to the global model
    pub max_user_models: usize,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            baseline_smoothing: 0.05,
            max_user_models: 10_000,
        }
    }
}

/// Preference learning settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreferenceConfig {
    /// Scale applied to every signal adjustment
    pub learning_rate: f32,

    /// Daily confidence decay factor
    pub decay_rate: f32,

    /// Confidence below which a preference does not influence output
    pub min_confidence: f32,
}

impl Default for PreferenceConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            decay_rate: 0.95,
            min_confidence: 0.3,
        }
    }
}

/// Priority cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Soft byte budget
    pub max_bytes: usize,

    /// Minimum prediction probability that triggers pre-generation
    pub prewarm_threshold: f32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_bytes: 16 * 1024 * 1024,
            prewarm_threshold: 0.5,
        }
    }
}

/// Sentence prosody settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProsodyConfig {
    /// Detection confidence required to mark a transition
    pub transition_threshold: f32,

    /// Share of the previous segment kept when blending a transition
    pub previous_weight: f32,
}

impl Default for ProsodyConfig {
    fn default() -> Self {
        Self {
            transition_threshold: 0.5,
            previous_weight: 0.4,
        }
    }
}

/// Cross-session memory settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Confidence added when an existing memory is rewritten
    pub confidence_increment: f32,

    /// Maximum memories retained per user
    pub max_per_user: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            confidence_increment: 0.1,
            max_per_user: 500,
        }
    }
}

/// Background dispatch settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Pending task capacity before the oldest task is dropped
    pub queue_capacity: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
        }
    }
}

impl AttuneConfig {
    /// Load configuration from TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AttuneConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Load an optional file with environment overrides layered on top
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            debug!("Loading configuration from {}", path.display());
            builder = builder.add_source(config::File::from(path));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: AttuneConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        check_unit("fusion.pitch_variance_threshold", self.fusion.pitch_variance_threshold)?;
        check_unit("fusion.tremor_threshold", self.fusion.tremor_threshold)?;
        check_unit("reward.learning_rate", self.reward.learning_rate)?;
        check_open_unit("reward.baseline_smoothing", self.reward.baseline_smoothing)?;
        check_unit("preferences.learning_rate", self.preferences.learning_rate)?;
        check_open_unit("preferences.decay_rate", self.preferences.decay_rate)?;
        check_unit("preferences.min_confidence", self.preferences.min_confidence)?;
        check_unit("cache.prewarm_threshold", self.cache.prewarm_threshold)?;
        check_unit("prosody.transition_threshold", self.prosody.transition_threshold)?;
        check_unit("prosody.previous_weight", self.prosody.previous_weight)?;
        check_unit("memory.confidence_increment", self.memory.confidence_increment)?;

        if self.cache.max_bytes == 0 {
            return Err(AttuneError::config_message("cache.max_bytes must be > 0"));
        }
        if self.reward.max_user_models == 0 {
            return Err(AttuneError::config_message("reward.max_user_models must be > 0"));
        }
        if self.memory.max_per_user == 0 {
            return Err(AttuneError::config_message("memory.max_per_user must be > 0"));
        }
        if self.dispatch.queue_capacity == 0 {
            return Err(AttuneError::config_message(
                "dispatch.queue_capacity must be > 0",
            ));
        }
        Ok(())
    }
}

fn check_unit(name: &str, value: f32) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(AttuneError::config_message(format!(
            "{} must be within [0, 1], got {}",
            name, value
        )))
    }
}

fn check_open_unit(name: &str, value: f32) -> Result<()> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(AttuneError::config_message(format!(
            "{} must be within (0, 1], got {}",
            name, value
        )))
    }
}
