//! # Stage: Experiment Registry
//!
//! ## Responsibility
//! Owns experiment definitions and their lifecycle, and orchestrates the
//! [`TrafficSplitter`], [`MetricsAggregator`] and [`StatisticalAnalyzer`]:
//! `create → start → (stop) → analyze`, plus delete and expiry sweeps.
//!
//! ## Guarantees
//! - Exclusive ownership: experiments live only in the registry's map; every
//!   other component works from copies taken at start or analysis time
//! - Independent locks: each component guards its own state. The splitter
//!   and aggregator locks are leaves, taken briefly under the registry guard
//!   where a status change and its table or series must move together.
//!   Analysis releases the registry lock while it reads the aggregator, and
//!   assignment never touches the registry lock on success
//! - Atomic validation: a rejected definition leaves the registry unchanged
//! - Instance-scoped: no global state, any number of registries may coexist
//!
//! ## NOT Responsible For
//! - Persistence or transport (callers serialize [`Experiment`] if needed)
//! - Background scheduling ([`ExperimentRegistry::expire_overdue`] is called
//!   by whoever owns the clock)

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::{SystemTime, UNIX_EPOCH},
};

use super::{
    aggregator::MetricsAggregator,
    analyzer::{control_treatment_pair, StatisticalAnalyzer},
    assignment::TrafficSplitter,
    conclusion,
    model::{Experiment, ExperimentResults, ExperimentSpec, ExperimentStatus, Variant},
};
use crate::error::{ExperimentError, Result};

/// Current wall-clock time in Unix milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn invalid_state(exp: &Experiment, operation: &'static str) -> ExperimentError {
    ExperimentError::InvalidState {
        id: exp.id.clone(),
        status: exp.status,
        operation,
    }
}

/// Manages a collection of experiments and their shared components.
pub struct ExperimentRegistry {
    experiments: RwLock<HashMap<String, Experiment>>,
    splitter: Arc<TrafficSplitter>,
    aggregator: Arc<MetricsAggregator>,
    analyzer: StatisticalAnalyzer,
}

impl Default for ExperimentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ExperimentRegistry {
    pub fn new() -> Self {
        let aggregator = Arc::new(MetricsAggregator::new());
        Self {
            experiments: RwLock::new(HashMap::new()),
            splitter: Arc::new(TrafficSplitter::new()),
            analyzer: StatisticalAnalyzer::new(Arc::clone(&aggregator)),
            aggregator,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Experiment>> {
        self.experiments.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Experiment>> {
        self.experiments.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn aggregator(&self) -> &Arc<MetricsAggregator> {
        &self.aggregator
    }

    pub fn splitter(&self) -> &Arc<TrafficSplitter> {
        &self.splitter
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Validate and store a new experiment in `draft`.
    pub fn create_experiment(&self, spec: ExperimentSpec) -> Result<Experiment> {
        if let Err(e) = spec.validate() {
            tracing::warn!(
                target: "experiment::registry",
                experiment = %spec.id,
                error = %e,
                "experiment rejected"
            );
            return Err(e);
        }

        let experiment = Experiment::from_spec(spec, now_ms());
        let mut map = self.write();
        if map.contains_key(&experiment.id) {
            return Err(ExperimentError::Validation(format!(
                "experiment '{}' already exists",
                experiment.id
            )));
        }
        map.insert(experiment.id.clone(), experiment.clone());
        drop(map);

        tracing::info!(
            target: "experiment::registry",
            experiment = %experiment.id,
            variants = experiment.variants.len(),
            metrics = experiment.metrics.len(),
            "experiment created"
        );
        Ok(experiment)
    }

    /// `draft → running`. The traffic split is installed from a snapshot of
    /// the variants under the same write guard that flips the status, so a
    /// variant is only ever handed out for a running experiment.
    pub fn start_experiment(&self, id: &str) -> Result<()> {
        let outcome = {
            let mut map = self.write();
            match map.get_mut(id) {
                None => Err(ExperimentError::NotFound(id.to_string())),
                Some(exp) if exp.status != ExperimentStatus::Draft => Err(invalid_state(exp, "start")),
                Some(exp) => {
                    // Splitter lock is a leaf: nothing takes the registry lock while holding it.
                    self.splitter.configure(id, &exp.variants);
                    let start = now_ms();
                    exp.status = ExperimentStatus::Running;
                    exp.start_time = Some(start);
                    exp.end_time = Some(start.saturating_add(exp.duration.as_millis() as u64));
                    Ok(())
                }
            }
        };

        match &outcome {
            Ok(()) => tracing::info!(target: "experiment::registry", experiment = id, "experiment started"),
            Err(e) => tracing::warn!(target: "experiment::registry", experiment = id, error = %e, "start rejected"),
        }
        outcome
    }

    /// `running → stopped`. Assignment stops; late outcomes are still recorded.
    pub fn stop_experiment(&self, id: &str) -> Result<()> {
        {
            let mut map = self.write();
            let exp = map.get_mut(id).ok_or_else(|| ExperimentError::NotFound(id.to_string()))?;
            if exp.status != ExperimentStatus::Running {
                let e = invalid_state(exp, "stop");
                tracing::warn!(target: "experiment::registry", experiment = id, error = %e, "stop rejected");
                return Err(e);
            }
            exp.status = ExperimentStatus::Stopped;
            exp.end_time = Some(now_ms());
            self.splitter.remove(id);
        }
        tracing::info!(target: "experiment::registry", experiment = id, "experiment stopped");
        Ok(())
    }

    /// Remove an experiment that is neither running nor being analyzed,
    /// together with its raw samples.
    pub fn delete_experiment(&self, id: &str) -> Result<Experiment> {
        let (removed, series) = {
            let mut map = self.write();
            let exp = map.get(id).ok_or_else(|| ExperimentError::NotFound(id.to_string()))?;
            if matches!(exp.status, ExperimentStatus::Running | ExperimentStatus::Analyzing) {
                return Err(invalid_state(exp, "delete"));
            }
            let removed = map.remove(id).ok_or_else(|| ExperimentError::NotFound(id.to_string()))?;
            self.splitter.remove(id);
            // Cleared under the write guard: a concurrent record_metric either
            // lands before this or sees NotFound.
            (removed, self.aggregator.clear_experiment(id))
        };
        tracing::info!(target: "experiment::registry", experiment = id, series, "experiment deleted");
        Ok(removed)
    }

    /// Stop every running experiment whose scheduled end is at or before
    /// `now` (Unix ms). Returns the ids stopped.
    pub fn expire_overdue(&self, now: u64) -> Vec<String> {
        let mut expired = Vec::new();
        {
            let mut map = self.write();
            for exp in map.values_mut() {
                let overdue = exp.end_time.is_some_and(|end| end <= now);
                if exp.status == ExperimentStatus::Running && overdue {
                    exp.status = ExperimentStatus::Stopped;
                    self.splitter.remove(&exp.id);
                    expired.push(exp.id.clone());
                }
            }
        }
        for id in &expired {
            tracing::info!(target: "experiment::registry", experiment = %id, "experiment expired");
        }
        expired.sort();
        expired
    }

    // -----------------------------------------------------------------------
    // Live traffic
    // -----------------------------------------------------------------------

    /// Variant a user sees in a running experiment.
    ///
    /// Only the split table is consulted on success; the registry is read
    /// only to classify a failure.
    pub fn get_variant_for_user(&self, experiment_id: &str, user_id: &str) -> Result<Variant> {
        if let Some(variant) = self.splitter.assign(experiment_id, user_id) {
            tracing::trace!(
                target: "experiment::registry",
                experiment = experiment_id,
                user = user_id,
                variant = %variant.id,
                "variant assigned"
            );
            return Ok(variant);
        }
        let map = self.read();
        let exp = map
            .get(experiment_id)
            .ok_or_else(|| ExperimentError::NotFound(experiment_id.to_string()))?;
        Err(invalid_state(exp, "assign a variant for"))
    }

    /// Append one outcome observation. Any status is accepted so delayed
    /// conversions still count.
    pub fn record_metric(
        &self,
        experiment_id: &str,
        variant_id: &str,
        metric: &str,
        value: f64,
    ) -> Result<()> {
        if !value.is_finite() {
            return Err(ExperimentError::Validation(format!(
                "metric '{metric}' value must be finite, got {value}"
            )));
        }
        // The read guard is held across the append so a concurrent delete
        // cannot clear the series in between.
        let map = self.read();
        if !map.contains_key(experiment_id) {
            return Err(ExperimentError::NotFound(experiment_id.to_string()));
        }
        self.aggregator.record(experiment_id, variant_id, metric, value);
        drop(map);
        tracing::trace!(
            target: "experiment::registry",
            experiment = experiment_id,
            variant = variant_id,
            metric,
            value,
            "metric recorded"
        );
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Analysis
    // -----------------------------------------------------------------------

    /// `running | stopped | completed → analyzing → completed`.
    ///
    /// Re-analysing a completed experiment overwrites its results. The
    /// registry lock is released while the analyzer reads the aggregator.
    pub fn analyze_experiment(&self, id: &str) -> Result<ExperimentResults> {
        let (snapshot, was_running) = {
            let mut map = self.write();
            let exp = map.get_mut(id).ok_or_else(|| ExperimentError::NotFound(id.to_string()))?;
            let was_running = match exp.status {
                ExperimentStatus::Running => true,
                ExperimentStatus::Stopped | ExperimentStatus::Completed => false,
                ExperimentStatus::Draft | ExperimentStatus::Analyzing => {
                    let e = invalid_state(exp, "analyze");
                    tracing::warn!(target: "experiment::registry", experiment = id, error = %e, "analysis rejected");
                    return Err(e);
                }
            };
            exp.status = ExperimentStatus::Analyzing;
            if was_running {
                self.splitter.remove(id);
            }
            (exp.clone(), was_running)
        };
        tracing::info!(target: "experiment::registry", experiment = id, "analysis started");

        let results = self.compute_results(&snapshot);

        let mut map = self.write();
        let exp = map.get_mut(id).ok_or_else(|| ExperimentError::NotFound(id.to_string()))?;
        exp.results = Some(results.clone());
        exp.status = ExperimentStatus::Completed;
        if was_running {
            exp.end_time = Some(results.analyzed_at);
        }
        drop(map);

        tracing::info!(
            target: "experiment::registry",
            experiment = id,
            total_samples = results.total_samples,
            significance = results.significance,
            recommendation = %results.recommendation,
            "analysis completed"
        );
        Ok(results)
    }

    fn compute_results(&self, exp: &Experiment) -> ExperimentResults {
        let level = exp.config.confidence_level;
        let variant_results: BTreeMap<_, _> = exp
            .variants
            .iter()
            .map(|v| {
                let r = self.analyzer.analyze_variant(&exp.id, &v.id, &exp.metrics, level);
                (v.id.clone(), r)
            })
            .collect();
        let total_samples = variant_results.values().map(|r| r.sample_size).sum();

        let (control, treatment) = control_treatment_pair(&exp.variants)
            .map(|(c, t)| (c.id.clone(), t.id.clone()))
            .unwrap_or_default();

        let statistical_tests =
            self.analyzer.perform_statistical_tests(&exp.id, &exp.variants, &exp.metrics);
        let summary = conclusion::generate(&exp.metrics, &statistical_tests, &treatment);

        let effect_size = exp
            .metrics
            .first()
            .and_then(|m| statistical_tests.get(&m.name))
            .map_or(0.0, |t| t.effect_size);

        ExperimentResults {
            total_samples,
            variant_results,
            statistical_tests,
            conclusion: summary.conclusion,
            recommendation: summary.recommendation,
            effect_size,
            significance: summary.significance,
            control_variant: control,
            treatment_variant: treatment,
            minimum_sample_size_reached: self.minimum_samples_reached(exp),
            breached_guardrails: summary.breached_guardrails,
            analyzed_at: now_ms(),
        }
    }

    fn minimum_samples_reached(&self, exp: &Experiment) -> bool {
        let min = exp.config.minimum_sample_size;
        exp.variants.iter().all(|v| {
            exp.metrics
                .iter()
                .all(|m| self.aggregator.sample_count(&exp.id, &v.id, &m.name) >= min)
        })
    }

    /// `true` when a running experiment allows early termination and every
    /// variant has reached `minimum_sample_size` on every metric.
    pub fn ready_for_early_stop(&self, id: &str) -> Result<bool> {
        let exp = self.get_experiment(id)?;
        if exp.status != ExperimentStatus::Running || !exp.config.early_termination {
            return Ok(false);
        }
        Ok(self.minimum_samples_reached(&exp))
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn get_experiment(&self, id: &str) -> Result<Experiment> {
        self.read()
            .get(id)
            .cloned()
            .ok_or_else(|| ExperimentError::NotFound(id.to_string()))
    }

    pub fn status(&self, id: &str) -> Option<ExperimentStatus> {
        self.read().get(id).map(|e| e.status)
    }

    /// All experiments ordered by id.
    pub fn list_experiments(&self) -> Vec<Experiment> {
        let mut all: Vec<Experiment> = self.read().values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
