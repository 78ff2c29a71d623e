//! # Synthetic traffic
//!
//! Drives a running experiment with `users` synthetic ids (`user-0`,
//! `user-1`, ...): each user is assigned through the registry exactly like
//! live traffic, then one outcome per declared metric is drawn from the
//! assigned variant's `simulate.<metric>` configuration entry:
//!
//! - `counter` / `rate`: Bernoulli draw with that probability (1.0 or 0.0)
//! - `gauge` / `histogram`: uniform draw on `[0.5·mean, 1.5·mean)`
//!
//! Metrics without a numeric `simulate.<metric>` entry produce no
//! observation. The generator is seeded, so a run is reproducible.

use std::collections::BTreeMap;

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Serialize;

use crate::error::Result;
use crate::experiment::{
    model::{MetricDefinition, MetricType, Variant},
    ExperimentRegistry,
};

/// Configuration key prefix read by the simulator.
pub const SIMULATE_PREFIX: &str = "simulate.";

#[derive(Debug, Clone, Copy)]
pub struct Simulation {
    pub users: usize,
    pub seed: u64,
}

impl Default for Simulation {
    fn default() -> Self {
        Self { users: 10_000, seed: 42 }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SimulationReport {
    pub experiment_id: String,
    /// Variant id → number of users assigned.
    pub assignments: BTreeMap<String, usize>,
    pub observations: usize,
}

/// Draw one outcome for `metric` in `variant`, if the variant models it.
pub fn draw_outcome(rng: &mut impl Rng, variant: &Variant, metric: &MetricDefinition) -> Option<f64> {
    let key = format!("{SIMULATE_PREFIX}{}", metric.name);
    let param = variant.configuration.get(&key)?.as_f64().filter(|p| p.is_finite())?;
    let value = match metric.metric_type {
        MetricType::Counter | MetricType::Rate => {
            if rng.gen_bool(param.clamp(0.0, 1.0)) { 1.0 } else { 0.0 }
        }
        MetricType::Gauge | MetricType::Histogram => param * (0.5 + rng.gen::<f64>()),
    };
    Some(value)
}

impl Simulation {
    /// Push synthetic traffic through a running experiment.
    pub fn run(&self, registry: &ExperimentRegistry, experiment_id: &str) -> Result<SimulationReport> {
        let metrics = registry.get_experiment(experiment_id)?.metrics;
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut report = SimulationReport {
            experiment_id: experiment_id.to_string(),
            ..Default::default()
        };

        for i in 0..self.users {
            let user = format!("user-{i}");
            let variant = registry.get_variant_for_user(experiment_id, &user)?;
            *report.assignments.entry(variant.id.clone()).or_default() += 1;

            for metric in &metrics {
                if let Some(value) = draw_outcome(&mut rng, &variant, metric) {
                    registry.record_metric(experiment_id, &variant.id, &metric.name, value)?;
                    report.observations += 1;
                }
            }
        }

        tracing::info!(
            target: "simulate",
            experiment = experiment_id,
            users = self.users,
            observations = report.observations,
            "simulation finished"
        );
        Ok(report)
    }
}
