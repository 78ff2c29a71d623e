//! # split-decision
//!
//! In-memory A/B experimentation engine for progressive rollouts.
//!
//! A caller creates an experiment (validated, stored as draft), starts it,
//! asks for a variant once per live request, reports outcome values per
//! assignment, and finally triggers analysis, which reduces the collected
//! observations, tests control against treatment and stores a
//! recommendation on the experiment.
//!
//! ```no_run
//! use std::time::Duration;
//! use split_decision::experiment::{
//!     ExperimentConfig, ExperimentRegistry, ExperimentSpec, MetricDefinition,
//!     MetricTarget, MetricType, Variant,
//! };
//!
//! let registry = ExperimentRegistry::new();
//! registry.create_experiment(ExperimentSpec {
//!     id: "exp1".into(),
//!     name: "checkout button".into(),
//!     description: String::new(),
//!     duration: Duration::from_secs(7 * 24 * 3_600),
//!     variants: vec![Variant::new("A", 50.0), Variant::new("B", 50.0)],
//!     metrics: vec![MetricDefinition::new(
//!         "conversion",
//!         MetricType::Rate,
//!         MetricTarget::HigherIsBetter,
//!     )],
//!     config: ExperimentConfig::default(),
//! })?;
//! registry.start_experiment("exp1")?;
//!
//! let variant = registry.get_variant_for_user("exp1", "user-42")?;
//! registry.record_metric("exp1", &variant.id, "conversion", 1.0)?;
//!
//! let results = registry.analyze_experiment("exp1")?;
//! println!("{}", results.recommendation);
//! # Ok::<(), split_decision::error::ExperimentError>(())
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod experiment;
pub mod report;
pub mod simulate;

pub use error::{ExperimentError, Result};
pub use experiment::ExperimentRegistry;
