//! Winner detection for running and completed experiments
//!
//! Decision policy: a variant wins only when there is enough total data
//! (`min_sample_size × variants` impressions), the leader itself reached
//! `min_sample_size` impressions, and it beats the control by at least
//! [`MIN_RELATIVE_IMPROVEMENT`]. This is a fixed threshold rule rather than
//! a hypothesis test.
//!
//! Variants are compared on average rating only when every variant has at
//! least one rating; otherwise on conversion rate.
//!
//! TODO: offer a two-proportion z-test policy behind a config switch once
//! operators need confidence intervals on the dashboard.

use super::types::{Experiment, ExperimentStatus};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Required improvement of the leader over the control
pub const MIN_RELATIVE_IMPROVEMENT: f64 = 0.05;

/// Metric variants were compared on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMetric {
    AverageRating,
    ConversionRate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantSummary {
    pub variant_id: String,
    pub impressions: u64,
    pub conversions: u64,
    pub conversion_rate: f64,
    pub average_rating: Option<f64>,
    pub metric_value: f64,
}

/// Result of analyzing an experiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentAnalysis {
    pub experiment_id: String,
    pub status: ExperimentStatus,
    pub metric: AnalysisMetric,
    pub total_impressions: u64,
    pub required_impressions: u64,
    /// False means "insufficient data": no winner is reported
    pub sufficient_data: bool,
    pub variants: Vec<VariantSummary>,
    pub control_id: Option<String>,
    pub leader_id: Option<String>,
    /// `(leader − control) / control`; infinite when the control scored zero
    pub relative_improvement: Option<f64>,
    pub significant: bool,
    /// Significant leader, or the frozen winner of a completed experiment
    pub winner_id: Option<String>,
    pub duration_exceeded: bool,
}

/// Analyze an experiment as of `now`
///
/// Completed experiments report their frozen winner unchanged.
pub fn analyze(experiment: &Experiment, now: DateTime<Utc>) -> ExperimentAnalysis {
    // an unrated variant has no rating to compare, so fall back to conversions
    let all_rated =
        !experiment.variants.is_empty() && experiment.variants.iter().all(|v| v.rating_count > 0);
    let metric = if all_rated {
        AnalysisMetric::AverageRating
    } else {
        AnalysisMetric::ConversionRate
    };

    let variants: Vec<VariantSummary> = experiment
        .variants
        .iter()
        .map(|v| {
            let metric_value = match metric {
                AnalysisMetric::AverageRating => v.average_rating().unwrap_or_default(),
                AnalysisMetric::ConversionRate => v.conversion_rate(),
            };
            VariantSummary {
                variant_id: v.id.clone(),
                impressions: v.impressions,
                conversions: v.conversions,
                conversion_rate: v.conversion_rate(),
                average_rating: v.average_rating(),
                metric_value,
            }
        })
        .collect();

    let total_impressions = experiment.total_impressions();
    let required_impressions = experiment
        .min_sample_size
        .saturating_mul(experiment.variants.len() as u64);
    let sufficient_data = total_impressions >= required_impressions;

    let control = variants.first();
    // earliest variant wins ties, so the control leads unless beaten
    let leader = variants.iter().fold(None::<&VariantSummary>, |best, v| match best {
        Some(b) if b.metric_value >= v.metric_value => Some(b),
        _ => Some(v),
    });

    let relative_improvement = match (leader, control) {
        (Some(l), Some(c)) if c.metric_value > 0.0 => {
            Some((l.metric_value - c.metric_value) / c.metric_value)
        }
        (Some(l), Some(_)) if l.metric_value > 0.0 => Some(f64::INFINITY),
        (Some(_), Some(_)) => Some(0.0),
        _ => None,
    };

    let significant = sufficient_data
        && leader.is_some_and(|l| l.impressions >= experiment.min_sample_size)
        && relative_improvement.is_some_and(|r| r >= MIN_RELATIVE_IMPROVEMENT);

    let winner_id = if experiment.status == ExperimentStatus::Completed {
        experiment.winner_id.clone()
    } else if significant {
        leader.map(|l| l.variant_id.clone())
    } else {
        None
    };

    let duration_exceeded = match (experiment.max_duration_days, experiment.started_at) {
        (Some(days), Some(started)) => now - started >= Duration::days(i64::from(days)),
        _ => false,
    };

    ExperimentAnalysis {
        experiment_id: experiment.id.clone(),
        status: experiment.status,
        metric,
        total_impressions,
        required_impressions,
        sufficient_data,
        control_id: control.map(|c| c.variant_id.clone()),
        leader_id: leader.map(|l| l.variant_id.clone()),
        relative_improvement,
        significant,
        winner_id,
        duration_exceeded,
        variants,
    }
}

/// Winner to freeze when an experiment stops: the significant leader,
/// otherwise the control
pub fn winner_on_stop(experiment: &Experiment, now: DateTime<Utc>) -> Option<String> {
    let analysis = analyze(experiment, now);
    if analysis.significant {
        analysis.leader_id
    } else {
        analysis.control_id
    }
}
