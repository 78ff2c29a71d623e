//! # Stage: Metrics Aggregator
//!
//! ## Responsibility
//! Thread-safe accumulation of raw outcome observations keyed by
//! `(experiment, variant, metric)`. The full ordered history is retained so
//! that analysis is reproducible; a running [`SampleSummary`] is kept next to
//! it so reads do not rescan the history.
//!
//! ## Guarantees
//! - Append-only: no sampling, decay or eviction
//! - Thread-safe: one `Mutex` guards all series, held only for O(1) work
//!   on the record path
//!
//! ## NOT Responsible For
//! - Checking metric names against an experiment's declared metrics
//! - Experiment status (outcomes may arrive after an experiment stopped)

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use super::stats::SampleSummary;

/// Key of one raw sample series.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeriesKey {
    pub experiment_id: String,
    pub variant_id: String,
    pub metric: String,
}

impl SeriesKey {
    pub fn new(experiment_id: &str, variant_id: &str, metric: &str) -> Self {
        Self {
            experiment_id: experiment_id.to_string(),
            variant_id: variant_id.to_string(),
            metric: metric.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct SampleSeries {
    values: Vec<f64>,
    summary: SampleSummary,
}

impl SampleSeries {
    fn record(&mut self, value: f64) {
        self.values.push(value);
        self.summary.push(value);
    }
}

/// Accumulates raw metric samples for every running or finished experiment.
#[derive(Debug, Default)]
pub struct MetricsAggregator {
    series: Mutex<HashMap<SeriesKey, SampleSeries>>,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, HashMap<SeriesKey, SampleSeries>> {
        // Series are append-only; a panic mid-push leaves at worst one
        // value without its summary update, which is still readable.
        self.series.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append one observation.
    pub fn record(&self, experiment_id: &str, variant_id: &str, metric: &str, value: f64) {
        let key = SeriesKey::new(experiment_id, variant_id, metric);
        self.guard().entry(key).or_default().record(value);
    }

    /// Number of observations recorded for the series.
    pub fn sample_count(&self, experiment_id: &str, variant_id: &str, metric: &str) -> usize {
        let key = SeriesKey::new(experiment_id, variant_id, metric);
        self.guard().get(&key).map_or(0, |s| s.values.len())
    }

    /// Full ordered history of the series (empty if nothing was recorded).
    pub fn samples(&self, experiment_id: &str, variant_id: &str, metric: &str) -> Vec<f64> {
        let key = SeriesKey::new(experiment_id, variant_id, metric);
        self.guard().get(&key).map(|s| s.values.clone()).unwrap_or_default()
    }

    /// Count, sum, mean and variance of the series.
    pub fn summary(&self, experiment_id: &str, variant_id: &str, metric: &str) -> SampleSummary {
        let key = SeriesKey::new(experiment_id, variant_id, metric);
        self.guard().get(&key).map(|s| s.summary).unwrap_or_default()
    }

    /// Drop every series of an experiment. Returns the number of series removed.
    pub fn clear_experiment(&self, experiment_id: &str) -> usize {
        let mut map = self.guard();
        let before = map.len();
        map.retain(|k, _| k.experiment_id != experiment_id);
        before - map.len()
    }

    /// Number of distinct series held.
    pub fn series_count(&self) -> usize {
        self.guard().len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
