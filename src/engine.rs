//! Personalization engine
//!
//! Owns every component and exposes the conversation-facing surface. None
//! of these calls fail: invalid input and storage problems are logged and
//! answered with neutral defaults so response generation is never blocked.
//!
//! Feedback is deferred through the [`BackgroundDispatcher`] and applied
//! either by a worker spawned with [`PersonalizationEngine::start_background`]
//! or inline by [`PersonalizationEngine::process_pending`]. Snapshots of
//! preferences and memories are persisted after locks are released.

use crate::cache::{CacheEntry, CacheFlags, ContextPredictor, ConversationContext, PriorityCache};
use crate::config::AttuneConfig;
use crate::dispatch::{BackgroundDispatcher, DispatchOutcome};
use crate::error::Result;
use crate::evaluation::{FeatureVector, FeedbackContext, FeedbackEvent, FeedbackLearner, FeedbackType};
use crate::experiments::ExperimentAssignmentEngine;
use crate::fusion::{AcousticFeatures, FusedEmotionResult, SignalFusionEngine};
use crate::memory::{Memory, MemoryStore, MemoryType, PriorityTier};
use crate::preferences::keys::{PITCH, SPEAKING_RATE, VOLUME};
use crate::preferences::{PreferenceRecord, PreferenceStore, PreferenceValue};
use crate::prosody::{ProsodySegment, SentenceProsodyAdapter, VoicePreferences};
use crate::storage::{memories_key, preferences_key, InMemoryStore, KeyValueStore};
use crate::types::{EmotionCategory, UserId};
use crate::utils::bounded::BoundedMap;
use crate::utils::sync::{read, write};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Users whose latest mood is remembered
pub const MOOD_CAPACITY: usize = 10_000;

/// Deferred work applied off the response path
#[derive(Debug, Clone, PartialEq)]
pub enum BackgroundTask {
    /// Learn from one feedback event
    Feedback(FeedbackEvent),
    /// Write a user's snapshots to the backing store
    Persist(UserId),
}

pub struct PersonalizationEngine {
    config: AttuneConfig,
    fusion: Arc<SignalFusionEngine>,
    learner: Arc<FeedbackLearner>,
    experiments: Arc<ExperimentAssignmentEngine>,
    preferences: Arc<PreferenceStore>,
    cache: Arc<PriorityCache>,
    predictor: ContextPredictor,
    prosody: SentenceProsodyAdapter,
    memory: Arc<MemoryStore>,
    store: Arc<dyn KeyValueStore>,
    dispatcher: Arc<BackgroundDispatcher<BackgroundTask>>,
    /// Latest fused emotion per recently active user, used for pre-warming
    moods: RwLock<BoundedMap<UserId, EmotionCategory>>,
}

impl PersonalizationEngine {
    /// Engine backed by a process-local store
    pub fn new(config: AttuneConfig) -> Self {
        Self::with_store(config, Arc::new(InMemoryStore::new()))
    }

    pub fn with_store(config: AttuneConfig, store: Arc<dyn KeyValueStore>) -> Self {
        let fusion = Arc::new(SignalFusionEngine::new(config.fusion.clone()));
        let prosody = SentenceProsodyAdapter::new(config.prosody.clone(), Arc::clone(&fusion));

        info!(
            "Personalization engine ready (cache budget {} bytes, queue capacity {})",
            config.cache.max_bytes, config.dispatch.queue_capacity
        );

        Self {
            learner: Arc::new(FeedbackLearner::new(config.reward.clone())),
            experiments: Arc::new(ExperimentAssignmentEngine::new()),
            preferences: Arc::new(PreferenceStore::new(config.preferences.clone())),
            cache: Arc::new(PriorityCache::new(config.cache.clone())),
            predictor: ContextPredictor::new(config.cache.prewarm_threshold),
            memory: Arc::new(MemoryStore::new(config.memory.clone())),
            dispatcher: Arc::new(BackgroundDispatcher::from_config(&config.dispatch)),
            moods: RwLock::new(BoundedMap::new(MOOD_CAPACITY)),
            fusion,
            prosody,
            store,
            config,
        }
    }

    /// Fused emotion for an utterance, remembered as the user's current mood
    pub fn fuse_emotion(
        &self,
        text: &str,
        acoustic: Option<&AcousticFeatures>,
        user_id: &str,
    ) -> FusedEmotionResult {
        let result = self.fusion.analyze(text, acoustic);
        debug!(
            "Fused emotion for {}: {} ({:.2}), stress {:.2}",
            user_id, result.primary, result.confidence, result.stress_level
        );
        write(&self.moods).insert(user_id.to_string(), result.primary);
        result
    }

    pub fn current_mood(&self, user_id: &str) -> Option<EmotionCategory> {
        read(&self.moods).get(user_id).copied()
    }

    pub fn get_experiment_config(
        &self,
        user_id: &str,
        experiment_type: &str,
        context: Option<&str>,
        language: Option<&str>,
    ) -> Option<Value> {
        self.experiments
            .get_experiment_config(user_id, experiment_type, context, language)
    }

    /// Remember a response's features so later feedback can be learned
    pub fn register_response(&self, response_hash: &str, features: FeatureVector) {
        self.learner.register_response(response_hash, features);
    }

    /// Queue feedback for learning; never blocks
    pub fn record_feedback(
        &self,
        user_id: &str,
        feedback_type: impl Into<FeedbackType>,
        value: f32,
        response_hash: Option<&str>,
        context: FeedbackContext,
    ) -> DispatchOutcome {
        let mut event = FeedbackEvent::new(user_id, feedback_type.into(), value).with_context(context);
        if let Some(hash) = response_hash {
            event = event.with_response(hash);
        }
        self.dispatcher.dispatch(BackgroundTask::Feedback(event))
    }

    /// Overlay the user's confident preferences onto a base config
    pub fn apply_preferences(&self, user_id: &str, base: &Value) -> Value {
        self.preferences
            .apply_to_config(user_id, base, self.config.preferences.min_confidence)
    }

    /// Set a preference the user chose directly
    pub fn set_preference(&self, user_id: &str, key: &str, value: PreferenceValue) -> bool {
        match self.preferences.set_explicit(user_id, key, value) {
            Ok(()) => {
                self.schedule_persist(user_id);
                true
            }
            Err(e) => {
                warn!("Rejected preference {} for {}: {}", key, user_id, e);
                false
            }
        }
    }

    pub fn cache_get(&self, key: &str) -> Option<CacheEntry> {
        self.cache.get(key)
    }

    pub fn cache_put(&self, key: &str, payload: Vec<u8>, flags: CacheFlags) {
        let evicted = self.cache.set(key, payload, flags);
        if evicted > 0 {
            debug!("Cache write {} evicted {} entries", key, evicted);
        }
    }

    /// Pre-generate content for the contexts likely to follow `current`
    ///
    /// Predictions use the user's latest fused mood when there is one.
    pub fn prewarm<F>(&self, user_id: &str, current: ConversationContext, generate: F) -> usize
    where
        F: FnMut(ConversationContext) -> Option<(String, Vec<u8>, CacheFlags)>,
    {
        let predictions = self
            .predictor
            .pregeneration_targets(current, self.current_mood(user_id));
        self.cache.prewarm(&predictions, generate)
    }

    /// Per-sentence prosody with the user's voice preferences applied
    pub fn adapt_prosody(&self, text: &str, user_id: &str) -> Vec<ProsodySegment> {
        let voice = VoicePreferences {
            speaking_rate: self.preferences.numeric_or_default(user_id, SPEAKING_RATE),
            pitch: self.preferences.numeric_or_default(user_id, PITCH),
            volume: self.preferences.numeric_or_default(user_id, VOLUME),
        };
        self.prosody.adapt(text, &voice)
    }

    pub fn recall_memories(&self, user_id: &str, topic: Option<&str>, limit: usize) -> Vec<Memory> {
        self.memory.get_relevant(user_id, topic, limit)
    }

    /// Store a memory and schedule the user's snapshot to be persisted
    pub fn remember(
        &self,
        user_id: &str,
        memory_type: MemoryType,
        tier: PriorityTier,
        key: &str,
        content: &str,
    ) -> Memory {
        let memory = self.memory.store(user_id, memory_type, tier, key, content);
        self.schedule_persist(user_id);
        memory
    }

    pub fn record_growth(&self, user_id: &str, dimension: &str, note: &str) -> Option<Memory> {
        let memory = self.memory.record_growth(user_id, dimension, note)?;
        self.schedule_persist(user_id);
        Some(memory)
    }

    /// Merge a user's persisted snapshots, returning whether any were found
    ///
    /// State already held in memory wins when it is newer than the snapshot.
    /// Unreadable snapshots are logged and leave the in-memory state as is.
    pub async fn hydrate_user(&self, user_id: &str) -> bool {
        let mut restored = false;

        if let Some(records) = self
            .load_snapshot::<Vec<PreferenceRecord>>(&preferences_key(user_id))
            .await
        {
            self.preferences.restore_user(user_id, records);
            restored = true;
        }
        if let Some(memories) = self.load_snapshot::<Vec<Memory>>(&memories_key(user_id)).await {
            self.memory.restore_user(user_id, memories);
            restored = true;
        }

        if restored {
            info!("Hydrated persisted state for {}", user_id);
        }
        restored
    }

    /// Apply every queued task inline, returning how many were applied
    pub async fn process_pending(&self) -> usize {
        let tasks = self.dispatcher.drain();
        let applied = tasks.len();

        let mut dirty: BTreeSet<UserId> = BTreeSet::new();
        for task in tasks {
            if let Some(user_id) = self.apply_task(task) {
                dirty.insert(user_id);
            }
        }
        for user_id in dirty {
            self.persist_user(&user_id).await;
        }
        applied
    }

    /// Spawn a worker that applies tasks until the dispatcher is closed
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_background(self: &Arc<Self>) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            info!("Background worker started");
            while let Some(task) = engine.dispatcher.recv().await {
                if let Some(user_id) = engine.apply_task(task) {
                    engine.persist_user(&user_id).await;
                }
            }
            info!("Background worker stopped");
        })
    }

    /// Stop accepting background work; the worker exits once drained
    pub fn shutdown(&self) {
        self.dispatcher.close();
    }

    /// Write a user's preference and memory snapshots
    ///
    /// Failures are logged; the in-memory state stays authoritative.
    pub async fn persist_user(&self, user_id: &str) {
        let preferences = self.preferences.snapshot_user(user_id);
        let memories = self.memory.memories(user_id);

        if let Err(e) = self.save_snapshot(&preferences_key(user_id), &preferences).await {
            warn!("Failed to persist preferences for {}: {}", user_id, e);
        }
        if let Err(e) = self.save_snapshot(&memories_key(user_id), &memories).await {
            warn!("Failed to persist memories for {}: {}", user_id, e);
        }
    }

    pub fn config(&self) -> &AttuneConfig {
        &self.config
    }

    pub fn fusion(&self) -> &SignalFusionEngine {
        &self.fusion
    }

    pub fn learner(&self) -> &FeedbackLearner {
        &self.learner
    }

    pub fn experiments(&self) -> &ExperimentAssignmentEngine {
        &self.experiments
    }

    pub fn preferences(&self) -> &PreferenceStore {
        &self.preferences
    }

    pub fn cache(&self) -> &PriorityCache {
        &self.cache
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    pub fn dispatcher(&self) -> &BackgroundDispatcher<BackgroundTask> {
        &self.dispatcher
    }

    fn schedule_persist(&self, user_id: &str) {
        self.dispatcher
            .dispatch(BackgroundTask::Persist(user_id.to_string()));
    }

    /// Apply one task, returning the user whose state should be persisted
    fn apply_task(&self, task: BackgroundTask) -> Option<UserId> {
        match task {
            BackgroundTask::Feedback(event) => {
                self.apply_feedback(&event);
                Some(event.user_id)
            }
            BackgroundTask::Persist(user_id) => Some(user_id),
        }
    }

    fn apply_feedback(&self, event: &FeedbackEvent) {
        if let FeedbackType::Unknown(label) = &event.feedback_type {
            warn!(
                "Ignoring feedback of unknown type {:?} from {}",
                label, event.user_id
            );
            return;
        }

        self.learner.record(event);
        self.preferences.record_signal(
            &event.user_id,
            &event.feedback_type,
            event.value,
            event.context.experiment_id.as_deref(),
        );

        let Some(experiment_id) = event.context.experiment_id.as_deref() else {
            return;
        };
        if event.feedback_type == FeedbackType::Rating {
            self.experiments
                .record_rating(&event.user_id, experiment_id, event.value);
        } else if event.feedback_type.is_conversion() {
            self.experiments
                .record_conversion(&event.user_id, experiment_id);
        }
    }

    async fn save_snapshot<T: serde::Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)?;
        self.store.put(key, json).await
    }

    async fn load_snapshot<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.store.get(key).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!("Failed to load {}: {}", key, e);
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Discarding unreadable snapshot {}: {}", key, e);
                None
            }
        }
    }
}

impl Default for PersonalizationEngine {
    fn default() -> Self {
        Self::new(AttuneConfig::default())
    }
}
