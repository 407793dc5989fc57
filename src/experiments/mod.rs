//! Online experiments (A/B tests) over personalization settings.
//!
//! Assignment is deterministic: membership and variant choice come from
//! SHA-256 of the user and experiment ids, and every decision is cached per
//! (user, experiment) for the life of the experiment.

pub mod analysis;
pub mod assignment;
pub mod types;

pub use analysis::{AnalysisMetric, ExperimentAnalysis, VariantSummary, MIN_RELATIVE_IMPROVEMENT};
pub use assignment::{choose_variant, hash_bucket, in_allocation, ExperimentAssignmentEngine};
pub use types::{Experiment, ExperimentStatus, Targeting, Variant};
