//! Per-user preference learning with decaying confidence
//!
//! Records are created lazily on the first signal for a key. Confidence
//! grows with the signal count up to [`MAX_CONFIDENCE`] and decays by
//! `decay_rate^days` since the last update whenever it is read, so stale
//! preferences fall below the confidence floor without being deleted.

use super::keys::{key_spec, signal_intensity, signal_rule};
use crate::config::PreferenceConfig;
use crate::error::{AttuneError, Result};
use crate::evaluation::FeedbackType;
use crate::types::{days_between, UserId};
use crate::utils::sync::{lock, read, write};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, warn};

/// Confidence ceiling for learned and explicit preferences
pub const MAX_CONFIDENCE: f32 = 0.95;

/// Signal count at which learned confidence saturates
const SIGNALS_FOR_FULL_CONFIDENCE: f32 = 50.0;

/// A preference value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PreferenceValue {
    Number(f32),
    Flag(bool),
    Text(String),
}

impl PreferenceValue {
    pub fn as_number(&self) -> Option<f32> {
        match self {
            PreferenceValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            PreferenceValue::Number(n) => Value::from(f64::from(*n)),
            PreferenceValue::Flag(b) => Value::Bool(*b),
            PreferenceValue::Text(s) => Value::String(s.clone()),
        }
    }
}

impl From<f32> for PreferenceValue {
    fn from(value: f32) -> Self {
        PreferenceValue::Number(value)
    }
}

impl From<bool> for PreferenceValue {
    fn from(value: bool) -> Self {
        PreferenceValue::Flag(value)
    }
}

impl From<&str> for PreferenceValue {
    fn from(value: &str) -> Self {
        PreferenceValue::Text(value.to_string())
    }
}

/// One learned or explicitly set preference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreferenceRecord {
    pub user_id: UserId,
    pub key: String,
    pub value: PreferenceValue,
    /// Stored confidence before time decay
    pub confidence: f32,
    pub signal_count: u32,
    pub last_updated: DateTime<Utc>,
    pub decay_rate: f32,
    /// Set by the user directly; implicit signals never override it
    #[serde(default)]
    pub explicit: bool,
}

impl PreferenceRecord {
    /// Confidence after decay as of `now`; explicit preferences do not decay
    pub fn effective_confidence(&self, now: DateTime<Utc>) -> f32 {
        if self.explicit {
            return self.confidence;
        }
        let age_days = days_between(self.last_updated, now);
        self.confidence * self.decay_rate.powf(age_days as f32)
    }
}

type UserPreferences = BTreeMap<String, PreferenceRecord>;

/// Learned settings per user
pub struct PreferenceStore {
    config: PreferenceConfig,
    users: RwLock<HashMap<UserId, Arc<Mutex<UserPreferences>>>>,
}

impl PreferenceStore {
    pub fn new(config: PreferenceConfig) -> Self {
        Self {
            config,
            users: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &PreferenceConfig {
        &self.config
    }

    /// Apply one behavioural signal, returning the number of keys moved
    pub fn record_signal(
        &self,
        user_id: &str,
        signal: &FeedbackType,
        value: f32,
        context: Option<&str>,
    ) -> usize {
        self.record_signal_at(user_id, signal, value, context, Utc::now())
    }

    pub fn record_signal_at(
        &self,
        user_id: &str,
        signal: &FeedbackType,
        value: f32,
        context: Option<&str>,
        now: DateTime<Utc>,
    ) -> usize {
        if let FeedbackType::Unknown(label) = signal {
            warn!("Ignoring unknown preference signal {:?} for {}", label, user_id);
            return 0;
        }
        let rule = signal_rule(signal);
        if rule.adjustments.is_empty() {
            return 0;
        }

        let intensity = signal_intensity(signal, value);
        let handle = self.user_handle(user_id);
        let mut prefs = lock(&handle);
        let mut moved = 0;

        for (key, direction) in rule.adjustments {
            let Some(spec) = key_spec(key) else {
                continue;
            };
            let record = prefs.entry(key.to_string()).or_insert_with(|| PreferenceRecord {
                user_id: user_id.to_string(),
                key: key.to_string(),
                value: PreferenceValue::Number(spec.default),
                confidence: 0.0,
                signal_count: 0,
                last_updated: now,
                decay_rate: self.config.decay_rate,
                explicit: false,
            });
            if record.explicit {
                continue;
            }

            let current = record.value.as_number().unwrap_or(spec.default);
            let delta = direction * rule.weight * self.config.learning_rate * intensity;
            record.value = PreferenceValue::Number(spec.clamp(current + delta));
            record.signal_count = record.signal_count.saturating_add(1);
            record.confidence =
                (record.signal_count as f32 / SIGNALS_FOR_FULL_CONFIDENCE).min(MAX_CONFIDENCE);
            record.last_updated = now;
            moved += 1;
        }

        debug!(
            "Recorded {} signal for {} (context: {}): {} keys adjusted",
            signal,
            user_id,
            context.unwrap_or("none"),
            moved
        );
        moved
    }

    /// Set a preference the user chose directly
    ///
    /// Numeric values for declared keys are clamped to their range; a
    /// non-numeric value for a declared numeric key is rejected.
    pub fn set_explicit(&self, user_id: &str, key: &str, value: PreferenceValue) -> Result<()> {
        self.set_explicit_at(user_id, key, value, Utc::now())
    }

    pub fn set_explicit_at(
        &self,
        user_id: &str,
        key: &str,
        value: PreferenceValue,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if key.trim().is_empty() || key.split('.').any(str::is_empty) {
            return Err(AttuneError::InvalidInput(format!(
                "invalid preference key {:?}",
                key
            )));
        }
        let value = match (key_spec(key), value) {
            (Some(spec), PreferenceValue::Number(n)) => PreferenceValue::Number(spec.clamp(n)),
            (Some(_), other) => {
                return Err(AttuneError::InvalidInput(format!(
                    "preference {} is numeric, got {:?}",
                    key, other
                )))
            }
            (None, other) => other,
        };

        let handle = self.user_handle(user_id);
        let mut prefs = lock(&handle);
        let signal_count = prefs.get(key).map(|r| r.signal_count).unwrap_or(0);
        prefs.insert(
            key.to_string(),
            PreferenceRecord {
                user_id: user_id.to_string(),
                key: key.to_string(),
                value,
                confidence: MAX_CONFIDENCE,
                signal_count,
                last_updated: now,
                decay_rate: self.config.decay_rate,
                explicit: true,
            },
        );
        debug!("Explicit preference {} set for {}", key, user_id);
        Ok(())
    }

    /// Preferences whose decayed confidence meets `min_confidence`
    pub fn get_preferences(
        &self,
        user_id: &str,
        min_confidence: f32,
    ) -> BTreeMap<String, PreferenceValue> {
        self.get_preferences_at(user_id, min_confidence, Utc::now())
    }

    pub fn get_preferences_at(
        &self,
        user_id: &str,
        min_confidence: f32,
        now: DateTime<Utc>,
    ) -> BTreeMap<String, PreferenceValue> {
        let Some(handle) = read(&self.users).get(user_id).cloned() else {
            return BTreeMap::new();
        };
        let prefs = lock(&handle);
        prefs
            .values()
            .filter(|record| record.effective_confidence(now) >= min_confidence)
            .map(|record| (record.key.clone(), record.value.clone()))
            .collect()
    }

    /// Decayed confidence of one preference, if recorded
    pub fn confidence_at(&self, user_id: &str, key: &str, now: DateTime<Utc>) -> Option<f32> {
        let handle = read(&self.users).get(user_id).cloned()?;
        let prefs = lock(&handle);
        prefs.get(key).map(|record| record.effective_confidence(now))
    }

    /// Numeric preference if confident enough, otherwise the declared default
    pub fn numeric_or_default(&self, user_id: &str, key: &str) -> f32 {
        let default = key_spec(key).map(|spec| spec.default).unwrap_or(0.0);
        self.get_preferences(user_id, self.config.min_confidence)
            .get(key)
            .and_then(PreferenceValue::as_number)
            .unwrap_or(default)
    }

    /// Overlay confident preferences onto a base config as nested JSON
    ///
    /// `voice.speaking_rate` is written to `config["voice"]["speaking_rate"]`.
    pub fn apply_to_config(&self, user_id: &str, base: &Value, min_confidence: f32) -> Value {
        self.apply_to_config_at(user_id, base, min_confidence, Utc::now())
    }

    pub fn apply_to_config_at(
        &self,
        user_id: &str,
        base: &Value,
        min_confidence: f32,
        now: DateTime<Utc>,
    ) -> Value {
        let mut config = base.clone();
        for (key, value) in self.get_preferences_at(user_id, min_confidence, now) {
            set_dotted(&mut config, &key, value.to_json());
        }
        config
    }

    /// Drop everything learned for a user
    pub fn reset_user(&self, user_id: &str) -> bool {
        write(&self.users).remove(user_id).is_some()
    }

    /// Copy of a user's records for persistence
    pub fn snapshot_user(&self, user_id: &str) -> Vec<PreferenceRecord> {
        let Some(handle) = read(&self.users).get(user_id).cloned() else {
            return Vec::new();
        };
        let prefs = lock(&handle);
        prefs.values().cloned().collect()
    }

    /// Merge a persisted snapshot into the user's records
    ///
    /// A record already held in memory wins unless the snapshot's copy was
    /// updated more recently. Returns the number of records taken from the
    /// snapshot.
    pub fn restore_user(&self, user_id: &str, records: Vec<PreferenceRecord>) -> usize {
        let handle = self.user_handle(user_id);
        let mut prefs = lock(&handle);
        let mut restored = 0;
        for record in records.into_iter().filter(|r| r.user_id == user_id) {
            let newer = prefs
                .get(&record.key)
                .map_or(true, |current| record.last_updated > current.last_updated);
            if newer {
                prefs.insert(record.key.clone(), record);
                restored += 1;
            }
        }
        restored
    }

    pub fn user_count(&self) -> usize {
        read(&self.users).len()
    }

    fn user_handle(&self, user_id: &str) -> Arc<Mutex<UserPreferences>> {
        if let Some(handle) = read(&self.users).get(user_id) {
            return Arc::clone(handle);
        }
        Arc::clone(
            write(&self.users)
                .entry(user_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(BTreeMap::new()))),
        )
    }
}

impl Default for PreferenceStore {
    fn default() -> Self {
        Self::new(PreferenceConfig::default())
    }
}

/// Write `value` at a dotted path, creating intermediate objects
fn set_dotted(target: &mut Value, key: &str, value: Value) {
    let mut parts = key.split('.').peekable();
    let mut current = target;
    while let Some(part) = parts.next() {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let map = match current {
            Value::Object(map) => map,
            _ => return,
        };
        if parts.peek().is_none() {
            map.insert(part.to_string(), value);
            return;
        }
        current = map
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}
