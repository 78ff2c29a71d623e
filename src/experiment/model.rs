//! # Experiment data model
//!
//! Definitions, lifecycle status and analysis results for A/B experiments.
//! Field names are stable serialized names (`traffic_percent`,
//! `minimum_sample_size`, `p_value`, ...) so existing tooling that reads
//! experiments as JSON or TOML keeps working.

use std::{collections::BTreeMap, collections::HashSet, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::{ExperimentError, Result};

/// Absolute tolerance used when checking that traffic shares sum to 100.
pub const TRAFFIC_SUM_TOLERANCE: f64 = 1e-6;

/// Significance threshold used when a metric does not carry a usable one.
pub const DEFAULT_ALPHA: f64 = 0.05;

// ---------------------------------------------------------------------------
// ExperimentStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of an experiment.
///
/// `draft → running → stopped`, `running | stopped → analyzing → completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperimentStatus {
    Draft,
    Running,
    Stopped,
    Analyzing,
    Completed,
}

impl std::fmt::Display for ExperimentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExperimentStatus::Draft     => "draft",
            ExperimentStatus::Running   => "running",
            ExperimentStatus::Stopped   => "stopped",
            ExperimentStatus::Analyzing => "analyzing",
            ExperimentStatus::Completed => "completed",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// ConfigValue: typed feature configuration
// ---------------------------------------------------------------------------

/// One value in a variant's feature configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl ConfigValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ConfigValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for ConfigValue {
    fn from(v: bool) -> Self { ConfigValue::Bool(v) }
}

impl From<f64> for ConfigValue {
    fn from(v: f64) -> Self { ConfigValue::Number(v) }
}

impl From<&str> for ConfigValue {
    fn from(v: &str) -> Self { ConfigValue::Text(v.to_string()) }
}

impl From<String> for ConfigValue {
    fn from(v: String) -> Self { ConfigValue::Text(v) }
}

/// Arbitrary feature-specific settings carried by a variant.
pub type ConfigMap = BTreeMap<String, ConfigValue>;

// ---------------------------------------------------------------------------
// Variant
// ---------------------------------------------------------------------------

/// One arm of an experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Share of traffic in percent, `0.0..=100.0`.
    pub traffic_percent: f64,
    #[serde(default)]
    pub configuration: ConfigMap,
    #[serde(default)]
    pub feature_flags: BTreeMap<String, bool>,
}

impl Variant {
    /// A variant with the given id (also used as its name) and share.
    pub fn new(id: impl Into<String>, traffic_percent: f64) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            description: String::new(),
            traffic_percent,
            configuration: ConfigMap::new(),
            feature_flags: BTreeMap::new(),
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        self.configuration.insert(key.into(), value.into());
        self
    }

    pub fn with_flag(mut self, key: impl Into<String>, enabled: bool) -> Self {
        self.feature_flags.insert(key.into(), enabled);
        self
    }
}

// ---------------------------------------------------------------------------
// MetricDefinition
// ---------------------------------------------------------------------------

/// How raw samples of a metric are reduced to one value per variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    /// Summed.
    Counter,
    Histogram,
    Gauge,
    Rate,
}

/// Which direction of change counts as an improvement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricTarget {
    HigherIsBetter,
    LowerIsBetter,
    /// Guardrail metric: any significant change is a regression.
    NoChange,
}

/// A metric evaluated by an experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub metric_type: MetricType,
    pub target: MetricTarget,
    /// Smallest relative effect that counts as an improvement.
    #[serde(default)]
    pub minimum_improvement: f64,
    /// Largest tolerated relative degradation before it is called out.
    #[serde(default)]
    pub maximum_degradation: f64,
    /// p-value threshold (alpha). Values outside (0, 1) fall back to 0.05.
    #[serde(default = "default_alpha")]
    pub statistical_significance: f64,
}

fn default_alpha() -> f64 { DEFAULT_ALPHA }

impl MetricDefinition {
    pub fn new(name: impl Into<String>, metric_type: MetricType, target: MetricTarget) -> Self {
        Self {
            name: name.into(),
            metric_type,
            target,
            minimum_improvement: 0.0,
            maximum_degradation: 0.0,
            statistical_significance: DEFAULT_ALPHA,
        }
    }

    /// The p-value threshold to test this metric against.
    pub fn alpha(&self) -> f64 {
        let a = self.statistical_significance;
        if a > 0.0 && a < 1.0 { a } else { DEFAULT_ALPHA }
    }
}

// ---------------------------------------------------------------------------
// ExperimentConfig
// ---------------------------------------------------------------------------

/// Statistical settings of one experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Observations per variant and metric before results are trusted.
    pub minimum_sample_size: usize,
    /// Confidence level for per-variant intervals, in (0, 1).
    pub confidence_level: f64,
    pub statistical_power: f64,
    /// Allow a scheduler to stop the experiment once every arm reached
    /// `minimum_sample_size`.
    pub early_termination: bool,
    #[serde(with = "duration_secs")]
    pub max_duration: Duration,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            minimum_sample_size: 100,
            confidence_level: 0.95,
            statistical_power: 0.8,
            early_termination: false,
            max_duration: Duration::from_secs(30 * 24 * 3_600),
        }
    }
}

// ---------------------------------------------------------------------------
// ExperimentSpec: creation input
// ---------------------------------------------------------------------------

/// Everything needed to create an experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentSpec {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(with = "duration_secs")]
    pub duration: Duration,
    pub variants: Vec<Variant>,
    pub metrics: Vec<MetricDefinition>,
    #[serde(default)]
    pub config: ExperimentConfig,
}

impl ExperimentSpec {
    /// Check every structural invariant of an experiment definition.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(invalid("experiment id must not be empty"));
        }
        if self.name.trim().is_empty() {
            return Err(invalid("experiment name must not be empty"));
        }
        if self.variants.len() < 2 {
            return Err(invalid(format!(
                "at least 2 variants required, got {}",
                self.variants.len()
            )));
        }

        let mut seen = HashSet::new();
        for v in &self.variants {
            if v.id.trim().is_empty() {
                return Err(invalid("variant id must not be empty"));
            }
            if !seen.insert(v.id.as_str()) {
                return Err(invalid(format!("duplicate variant id '{}'", v.id)));
            }
            if !(0.0..=100.0).contains(&v.traffic_percent) {
                return Err(invalid(format!(
                    "variant '{}' traffic_percent must be in [0, 100], got {}",
                    v.id, v.traffic_percent
                )));
            }
        }
        let total: f64 = self.variants.iter().map(|v| v.traffic_percent).sum();
        if (total - 100.0).abs() > TRAFFIC_SUM_TOLERANCE {
            return Err(invalid(format!("traffic shares must sum to 100, got {total}")));
        }

        if self.metrics.is_empty() {
            return Err(invalid("at least 1 metric required"));
        }
        let mut names = HashSet::new();
        for m in &self.metrics {
            if m.name.trim().is_empty() {
                return Err(invalid("metric name must not be empty"));
            }
            if !names.insert(m.name.as_str()) {
                return Err(invalid(format!("duplicate metric '{}'", m.name)));
            }
        }

        if self.duration.is_zero() {
            return Err(invalid("duration must be > 0"));
        }
        // Durations serialize as whole seconds.
        if self.duration.subsec_nanos() != 0 {
            return Err(invalid(format!(
                "duration must be a whole number of seconds, got {:?}",
                self.duration
            )));
        }
        let c = &self.config;
        if !(c.confidence_level > 0.0 && c.confidence_level < 1.0) {
            return Err(invalid(format!(
                "confidence_level must be in (0, 1), got {}",
                c.confidence_level
            )));
        }
        if !(c.statistical_power > 0.0 && c.statistical_power < 1.0) {
            return Err(invalid(format!(
                "statistical_power must be in (0, 1), got {}",
                c.statistical_power
            )));
        }
        if self.duration > c.max_duration {
            return Err(invalid(format!(
                "duration {}s exceeds max_duration {}s",
                self.duration.as_secs(),
                c.max_duration.as_secs()
            )));
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> ExperimentError {
    ExperimentError::Validation(msg.into())
}

// ---------------------------------------------------------------------------
// Experiment
// ---------------------------------------------------------------------------

/// A stored experiment. Owned exclusively by the registry; callers receive
/// clones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub id: String,
    pub name: String,
    pub description: String,
    pub status: ExperimentStatus,
    /// Unix milliseconds.
    pub start_time: Option<u64>,
    /// Unix milliseconds.
    pub end_time: Option<u64>,
    #[serde(with = "duration_secs")]
    pub duration: Duration,
    pub variants: Vec<Variant>,
    pub metrics: Vec<MetricDefinition>,
    pub config: ExperimentConfig,
    pub results: Option<ExperimentResults>,
    pub created_at: u64,
}

impl Experiment {
    /// A draft experiment from an already validated spec.
    pub fn from_spec(spec: ExperimentSpec, created_at: u64) -> Self {
        Self {
            id: spec.id,
            name: spec.name,
            description: spec.description,
            status: ExperimentStatus::Draft,
            start_time: None,
            end_time: None,
            duration: spec.duration,
            variants: spec.variants,
            metrics: spec.metrics,
            config: spec.config,
            results: None,
            created_at,
        }
    }

    pub fn variant(&self, id: &str) -> Option<&Variant> {
        self.variants.iter().find(|v| v.id == id)
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
    pub level: f64,
}

/// Reduced observations for one variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantResult {
    pub variant_id: String,
    /// Largest observation count across the declared metrics.
    pub sample_size: usize,
    /// Metric name → reduced value (sum for counters, mean otherwise).
    pub metrics: BTreeMap<String, f64>,
    /// Mean of the primary (first declared) metric.
    pub conversion_rate: f64,
    pub confidence_interval: ConfidenceInterval,
}

/// Outcome of one control-vs-treatment significance test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatResult {
    pub test_type: String,
    pub p_value: f64,
    pub z_score: f64,
    pub effect_size: f64,
    pub significant: bool,
    pub control_value: f64,
    pub treatment_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentResults {
    pub total_samples: usize,
    pub variant_results: BTreeMap<String, VariantResult>,
    /// Metric name → test result.
    pub statistical_tests: BTreeMap<String, StatResult>,
    pub conclusion: String,
    pub recommendation: String,
    /// Effect size of the primary metric.
    pub effect_size: f64,
    /// At least one metric improved significantly.
    pub significance: bool,
    pub control_variant: String,
    pub treatment_variant: String,
    pub minimum_sample_size_reached: bool,
    /// Metrics that regressed significantly beyond `maximum_degradation`.
    #[serde(default)]
    pub breached_guardrails: Vec<String>,
    /// Unix milliseconds.
    pub analyzed_at: u64,
}

// ---------------------------------------------------------------------------
// Serde helper: durations as whole seconds
// ---------------------------------------------------------------------------

pub(crate) mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
