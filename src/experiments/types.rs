//! Experiment and variant model

use crate::error::{AttuneError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle state of an experiment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentStatus {
    #[default]
    Draft,
    Running,
    Paused,
    Completed,
    Cancelled,
}

impl ExperimentStatus {
    /// Whether `self → to` is an allowed lifecycle step
    pub fn can_transition_to(&self, to: ExperimentStatus) -> bool {
        use ExperimentStatus::*;
        matches!(
            (self, to),
            (Draft, Running)
                | (Running, Paused)
                | (Paused, Running)
                | (Running, Completed)
                | (Paused, Completed)
                | (Draft, Cancelled)
                | (Running, Cancelled)
                | (Paused, Cancelled)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExperimentStatus::Completed | ExperimentStatus::Cancelled)
    }
}

impl std::fmt::Display for ExperimentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExperimentStatus::Draft => write!(f, "draft"),
            ExperimentStatus::Running => write!(f, "running"),
            ExperimentStatus::Paused => write!(f, "paused"),
            ExperimentStatus::Completed => write!(f, "completed"),
            ExperimentStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// One configuration option under test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub id: String,
    pub name: String,
    /// Configuration served to users assigned to this variant
    #[serde(default)]
    pub config: Value,
    /// Share of traffic, in [0, 1]
    pub weight: f32,
    #[serde(default)]
    pub impressions: u64,
    #[serde(default)]
    pub conversions: u64,
    #[serde(default)]
    pub rating_sum: f64,
    #[serde(default)]
    pub rating_count: u64,
}

impl Variant {
    pub fn new(id: impl Into<String>, name: impl Into<String>, weight: f32, config: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            config,
            weight,
            impressions: 0,
            conversions: 0,
            rating_sum: 0.0,
            rating_count: 0,
        }
    }

    pub fn average_rating(&self) -> Option<f64> {
        (self.rating_count > 0).then(|| self.rating_sum / self.rating_count as f64)
    }

    pub fn conversion_rate(&self) -> f64 {
        if self.impressions == 0 {
            0.0
        } else {
            self.conversions as f64 / self.impressions as f64
        }
    }
}

/// Audience filters; empty lists match everyone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Targeting {
    /// Percentage of users (0-100) allocated to the experiment
    pub user_percentage: u8,
    pub languages: Vec<String>,
    pub contexts: Vec<String>,
}

impl Default for Targeting {
    fn default() -> Self {
        Self {
            user_percentage: 100,
            languages: Vec::new(),
            contexts: Vec::new(),
        }
    }
}

impl Targeting {
    /// Whether the request's language and context pass the filters
    pub fn matches(&self, context: Option<&str>, language: Option<&str>) -> bool {
        let allowed = |list: &[String], value: Option<&str>| {
            list.is_empty()
                || value.is_some_and(|v| list.iter().any(|item| item.eq_ignore_ascii_case(v)))
        };
        allowed(&self.languages, language) && allowed(&self.contexts, context)
    }
}

fn default_min_sample_size() -> u64 {
    100
}

/// An online experiment over a set of variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub id: String,
    pub name: String,
    /// Category of behaviour the experiment configures, e.g. "voice"
    pub experiment_type: String,
    #[serde(default)]
    pub status: ExperimentStatus,
    /// Declared order matters: the first variant is the control
    pub variants: Vec<Variant>,
    #[serde(default)]
    pub targeting: Targeting,
    /// Impressions each variant needs before significance is considered
    #[serde(default = "default_min_sample_size")]
    pub min_sample_size: u64,
    #[serde(default)]
    pub max_duration_days: Option<u32>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    /// Frozen when the experiment completes
    #[serde(default)]
    pub winner_id: Option<String>,
}

impl Experiment {
    /// Create a draft experiment with default targeting
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        experiment_type: impl Into<String>,
        variants: Vec<Variant>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            experiment_type: experiment_type.into(),
            status: ExperimentStatus::Draft,
            variants,
            targeting: Targeting::default(),
            min_sample_size: default_min_sample_size(),
            max_duration_days: None,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            winner_id: None,
        }
    }

    pub fn with_targeting(mut self, targeting: Targeting) -> Self {
        self.targeting = targeting;
        self
    }

    pub fn with_min_sample_size(mut self, min_sample_size: u64) -> Self {
        self.min_sample_size = min_sample_size;
        self
    }

    pub fn with_max_duration_days(mut self, days: u32) -> Self {
        self.max_duration_days = Some(days);
        self
    }

    /// Parse an experiment definition from TOML
    pub fn from_toml(content: &str) -> Result<Self> {
        let experiment: Experiment = toml::from_str(content)?;
        experiment.validate()?;
        Ok(experiment)
    }

    /// Structural checks applied before an experiment is registered
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(AttuneError::InvalidInput(
                "experiment id must not be empty".to_string(),
            ));
        }
        if self.variants.is_empty() {
            return Err(AttuneError::InvalidInput(format!(
                "experiment {} needs at least one variant",
                self.id
            )));
        }
        if self.targeting.user_percentage > 100 {
            return Err(AttuneError::InvalidInput(format!(
                "experiment {}: user_percentage {} exceeds 100",
                self.id, self.targeting.user_percentage
            )));
        }
        if let Some(variant) = self
            .variants
            .iter()
            .find(|v| !(0.0..=1.0).contains(&v.weight))
        {
            return Err(AttuneError::InvalidInput(format!(
                "experiment {}: variant {} weight {} outside [0, 1]",
                self.id, variant.id, variant.weight
            )));
        }
        for (index, variant) in self.variants.iter().enumerate() {
            if self.variants[..index].iter().any(|v| v.id == variant.id) {
                return Err(AttuneError::InvalidInput(format!(
                    "experiment {}: duplicate variant id {}",
                    self.id, variant.id
                )));
            }
        }
        Ok(())
    }

    /// Move to a new lifecycle state, stamping start/end times
    pub fn transition(&mut self, to: ExperimentStatus, now: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(to) {
            return Err(AttuneError::InvalidTransition {
                experiment: self.id.clone(),
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        if to == ExperimentStatus::Running && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if to.is_terminal() {
            self.ended_at = Some(now);
        }
        self.status = to;
        Ok(())
    }

    pub fn control(&self) -> Option<&Variant> {
        self.variants.first()
    }

    pub fn variant(&self, id: &str) -> Option<&Variant> {
        self.variants.iter().find(|v| v.id == id)
    }

    pub fn total_impressions(&self) -> u64 {
        self.variants.iter().map(|v| v.impressions).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Experiment {
        Experiment::new(
            "exp-voice",
            "Voice pacing",
            "voice",
            vec![
                Variant::new("control", "Control", 0.5, json!({"rate": 1.0})),
                Variant::new("slow", "Slower", 0.5, json!({"rate": 0.9})),
            ],
        )
    }

    #[test]
    fn test_lifecycle_transitions() {
        let mut experiment = sample();
        let now = Utc::now();

        experiment.transition(ExperimentStatus::Running, now).unwrap();
        assert_eq!(experiment.started_at, Some(now));
        experiment.transition(ExperimentStatus::Paused, now).unwrap();
        experiment.transition(ExperimentStatus::Running, now).unwrap();
        experiment.transition(ExperimentStatus::Completed, now).unwrap();
        assert_eq!(experiment.ended_at, Some(now));

        let err = experiment
            .transition(ExperimentStatus::Running, now)
            .unwrap_err();
        assert!(matches!(err, AttuneError::InvalidTransition { .. }));
    }

    #[test]
    fn test_draft_cannot_complete() {
        let mut experiment = sample();
        assert!(experiment
            .transition(ExperimentStatus::Completed, Utc::now())
            .is_err());
        assert!(experiment
            .transition(ExperimentStatus::Cancelled, Utc::now())
            .is_ok());
    }

    #[test]
    fn test_targeting_filters() {
        let targeting = Targeting {
            user_percentage: 100,
            languages: vec!["en".to_string(), "es".to_string()],
            contexts: vec![],
        };
        assert!(targeting.matches(None, Some("EN")));
        assert!(targeting.matches(Some("sleep"), Some("es")));
        assert!(!targeting.matches(None, Some("fr")));
        assert!(!targeting.matches(None, None));
        assert!(Targeting::default().matches(None, None));
    }

    #[test]
    fn test_validation() {
        assert!(sample().validate().is_ok());

        let mut empty = sample();
        empty.variants.clear();
        assert!(empty.validate().is_err());

        let mut heavy = sample();
        heavy.variants[1].weight = 1.5;
        assert!(heavy.validate().is_err());

        let mut duplicate = sample();
        duplicate.variants[1].id = "control".to_string();
        assert!(duplicate.validate().is_err());

        let mut over = sample();
        over.targeting.user_percentage = 101;
        assert!(over.validate().is_err());
    }

    #[test]
    fn test_from_toml() {
        let toml = r#"
            id = "exp-length"
            name = "Response length"
            experiment_type = "response"
            min_sample_size = 50

            [targeting]
            user_percentage = 40

            [[variants]]
            id = "control"
            name = "Control"
            weight = 0.5
            config = { length = "medium" }

            [[variants]]
            id = "short"
            name = "Short"
            weight = 0.5
            config = { length = "short" }
        "#;

        let experiment = Experiment::from_toml(toml).unwrap();
        assert_eq!(experiment.status, ExperimentStatus::Draft);
        assert_eq!(experiment.targeting.user_percentage, 40);
        assert_eq!(experiment.min_sample_size, 50);
        assert_eq!(experiment.variants[1].config["length"], "short");
        assert_eq!(experiment.control().unwrap().id, "control");
    }

    #[test]
    fn test_variant_metrics() {
        let mut variant = Variant::new("v", "V", 1.0, Value::Null);
        assert_eq!(variant.average_rating(), None);
        assert_eq!(variant.conversion_rate(), 0.0);

        variant.impressions = 10;
        variant.conversions = 4;
        variant.rating_sum = 9.0;
        variant.rating_count = 2;
        assert_eq!(variant.average_rating(), Some(4.5));
        assert!((variant.conversion_rate() - 0.4).abs() < 1e-9);
    }
}
