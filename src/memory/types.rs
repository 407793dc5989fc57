//! Memory model: types, retention tiers and growth dimensions

use crate::types::{clamp_unit, days_between, UserId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Confidence a new memory starts with
pub const INITIAL_CONFIDENCE: f32 = 0.5;

/// Bonus for a key matching the requested topic
const TOPIC_MATCH_BONUS: f64 = 8.0;

/// Recency bonus span in days
const RECENCY_WINDOW_DAYS: f64 = 5.0;

/// What a memory is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    Concern,
    Goal,
    Preference,
    LifeEvent,
    Relationship,
    Growth,
    General,
}

impl MemoryType {
    pub fn label(&self) -> &'static str {
        match self {
            MemoryType::Concern => "concern",
            MemoryType::Goal => "goal",
            MemoryType::Preference => "preference",
            MemoryType::LifeEvent => "life_event",
            MemoryType::Relationship => "relationship",
            MemoryType::Growth => "growth",
            MemoryType::General => "general",
        }
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Retention class of a memory
///
/// Ordered from most to least important.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityTier {
    Critical,
    High,
    Medium,
    Low,
}

impl PriorityTier {
    /// How long a memory survives after creation; `None` is permanent
    pub fn retention(&self) -> Option<Duration> {
        match self {
            PriorityTier::Critical => None,
            PriorityTier::High => Some(Duration::days(180)),
            PriorityTier::Medium => Some(Duration::days(60)),
            PriorityTier::Low => Some(Duration::days(7)),
        }
    }

    /// Confidence multiplier applied per day without access
    pub fn daily_decay(&self) -> f32 {
        match self {
            PriorityTier::Critical => 1.0,
            PriorityTier::High => 0.995,
            PriorityTier::Medium => 0.99,
            PriorityTier::Low => 0.97,
        }
    }

    pub fn ranking_bonus(&self) -> f64 {
        match self {
            PriorityTier::Critical => 10.0,
            PriorityTier::High => 5.0,
            PriorityTier::Medium => 2.0,
            PriorityTier::Low => 0.0,
        }
    }
}

impl std::fmt::Display for PriorityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PriorityTier::Critical => write!(f, "critical"),
            PriorityTier::High => write!(f, "high"),
            PriorityTier::Medium => write!(f, "medium"),
            PriorityTier::Low => write!(f, "low"),
        }
    }
}

/// Areas of personal growth tracked across sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthDimension {
    EmotionalAwareness,
    Resilience,
    Mindfulness,
    SelfCompassion,
    Connection,
}

impl GrowthDimension {
    pub const ALL: [GrowthDimension; 5] = [
        GrowthDimension::EmotionalAwareness,
        GrowthDimension::Resilience,
        GrowthDimension::Mindfulness,
        GrowthDimension::SelfCompassion,
        GrowthDimension::Connection,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            GrowthDimension::EmotionalAwareness => "emotional_awareness",
            GrowthDimension::Resilience => "resilience",
            GrowthDimension::Mindfulness => "mindfulness",
            GrowthDimension::SelfCompassion => "self_compassion",
            GrowthDimension::Connection => "connection",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let normalized = label.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        Self::ALL.into_iter().find(|d| d.label() == normalized)
    }
}

/// One remembered fact about a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    pub id: Uuid,
    pub user_id: UserId,
    pub memory_type: MemoryType,
    pub tier: PriorityTier,
    pub key: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub access_count: u32,
    pub confidence: f32,
}

impl Memory {
    pub fn new(
        user_id: impl Into<UserId>,
        memory_type: MemoryType,
        tier: PriorityTier,
        key: impl Into<String>,
        content: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            memory_type,
            tier,
            key: key.into(),
            content: content.into(),
            created_at: now,
            last_accessed: now,
            access_count: 0,
            confidence: INITIAL_CONFIDENCE,
        }
    }

    pub fn days_since_last_access(&self, now: DateTime<Utc>) -> f64 {
        days_between(self.last_accessed, now)
    }

    /// Past the tier's retention window, measured from creation
    ///
    /// Recall does not extend retention; access only feeds decay and recency.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.tier.retention() {
            Some(window) => now - self.created_at > window,
            None => false,
        }
    }

    pub fn decayed_confidence(&self, now: DateTime<Utc>) -> f32 {
        let days = self.days_since_last_access(now) as f32;
        clamp_unit(self.confidence * self.tier.daily_decay().powf(days))
    }

    /// Ranking score for recall
    ///
    /// `decayed×10 + max(0, 5 − days since access) + tier bonus + 8 on topic match`
    pub fn relevance_score(&self, topic: Option<&str>, now: DateTime<Utc>) -> f64 {
        let recency = (RECENCY_WINDOW_DAYS - self.days_since_last_access(now)).max(0.0);
        let topic_bonus = match topic {
            Some(topic) if self.key_matches(topic) => TOPIC_MATCH_BONUS,
            _ => 0.0,
        };
        f64::from(self.decayed_confidence(now)) * 10.0
            + recency
            + self.tier.ranking_bonus()
            + topic_bonus
    }

    /// Case-insensitive substring match of the topic in the key
    pub fn key_matches(&self, topic: &str) -> bool {
        let topic = topic.trim().to_lowercase();
        !topic.is_empty() && self.key.to_lowercase().contains(&topic)
    }

    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        self.last_accessed = now;
        self.access_count = self.access_count.saturating_add(1);
    }
}
