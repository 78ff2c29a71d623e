//! # Module: experiment
//!
//! A/B experimentation engine for progressive rollouts: decides which
//! variant a user sees, collects outcome metrics per variant, and decides
//! whether a treatment statistically outperforms its control.
//!
//! ## Sub-modules
//! - [`model`]: experiment definitions, status and results
//! - [`assignment`]: deterministic user → variant traffic split
//! - [`aggregator`]: thread-safe raw metric accumulation
//! - [`stats`]: summaries, pooled z-test, normal distribution helpers
//! - [`analyzer`]: per-variant reduction and control/treatment tests
//! - [`conclusion`]: conclusion and rollout recommendation
//! - [`registry`]: lifecycle owner tying the above together

pub mod model;
pub mod assignment;
pub mod aggregator;
pub mod stats;
pub mod analyzer;
pub mod conclusion;
pub mod registry;

pub use model::{
    ConfidenceInterval, ConfigValue, Experiment, ExperimentConfig, ExperimentResults,
    ExperimentSpec, ExperimentStatus, MetricDefinition, MetricTarget, MetricType, StatResult,
    Variant, VariantResult,
};
pub use registry::ExperimentRegistry;
