//! # Stage: Statistical Analyzer
//!
//! ## Responsibility
//! Reduces raw observations from the [`MetricsAggregator`] to per-variant
//! summaries and runs the control-vs-treatment significance test per metric.
//!
//! ## Scope
//! Only one pair is compared: the first declared variant is the control and
//! the next distinct variant is the treatment. Further arms are summarised in
//! [`VariantResult`]s but not tested, and no multiple-comparison correction
//! is applied.
//!
//! ## NOT Responsible For
//! - Lifecycle transitions or storing results (the registry's concern)
//! - Turning test results into a recommendation (see [`super::conclusion`])

use std::{collections::BTreeMap, sync::Arc};

use super::{
    aggregator::MetricsAggregator,
    model::{ConfidenceInterval, MetricDefinition, MetricType, StatResult, Variant, VariantResult},
    stats::{self, SampleSummary},
};

/// Reduce a sample summary to the single value reported for a metric.
pub fn reduce(metric_type: MetricType, summary: &SampleSummary) -> f64 {
    match metric_type {
        MetricType::Counter => summary.sum(),
        MetricType::Histogram | MetricType::Gauge | MetricType::Rate => summary.mean(),
    }
}

/// Control and treatment for the significance test.
///
/// Returns `None` when there is no second distinct variant.
pub fn control_treatment_pair(variants: &[Variant]) -> Option<(&Variant, &Variant)> {
    let control = variants.first()?;
    let treatment = variants.iter().skip(1).find(|v| v.id != control.id)?;
    Some((control, treatment))
}

/// Reads the aggregator and produces analysis results.
#[derive(Debug, Clone)]
pub struct StatisticalAnalyzer {
    aggregator: Arc<MetricsAggregator>,
}

impl StatisticalAnalyzer {
    pub fn new(aggregator: Arc<MetricsAggregator>) -> Self {
        Self { aggregator }
    }

    /// Summarise one variant over the declared metrics.
    ///
    /// `sample_size` is the largest observation count across the metrics.
    /// `conversion_rate` and the confidence interval describe the mean of the
    /// first declared metric.
    pub fn analyze_variant(
        &self,
        experiment_id: &str,
        variant_id: &str,
        metrics: &[MetricDefinition],
        confidence_level: f64,
    ) -> VariantResult {
        let mut reduced = BTreeMap::new();
        let mut sample_size = 0;
        let mut primary: Option<SampleSummary> = None;

        for def in metrics {
            let summary = self.aggregator.summary(experiment_id, variant_id, &def.name);
            sample_size = sample_size.max(summary.count());
            reduced.insert(def.name.clone(), reduce(def.metric_type, &summary));
            if primary.is_none() {
                primary = Some(summary);
            }
        }

        let primary = primary.unwrap_or_default();
        let (lower, upper) = stats::mean_confidence_interval(&primary, confidence_level);

        VariantResult {
            variant_id: variant_id.to_string(),
            sample_size,
            metrics: reduced,
            conversion_rate: primary.mean(),
            confidence_interval: ConfidenceInterval { lower, upper, level: confidence_level },
        }
    }

    /// Compare `treatment` against `control` on one metric.
    pub fn test_metric(
        &self,
        experiment_id: &str,
        control: &str,
        treatment: &str,
        def: &MetricDefinition,
    ) -> StatResult {
        let c = self.aggregator.summary(experiment_id, control, &def.name);
        let t = self.aggregator.summary(experiment_id, treatment, &def.name);

        let control_value = reduce(def.metric_type, &c);
        let treatment_value = reduce(def.metric_type, &t);
        let z = stats::two_sample_z_test(&c, &t);

        StatResult {
            test_type: stats::Z_TEST.to_string(),
            p_value: z.p_value,
            z_score: z.z_score,
            effect_size: stats::relative_effect(control_value, treatment_value),
            significant: z.p_value < def.alpha(),
            control_value,
            treatment_value,
        }
    }

    /// Run the control-vs-treatment test for every declared metric.
    ///
    /// Empty when fewer than two distinct variants exist.
    pub fn perform_statistical_tests(
        &self,
        experiment_id: &str,
        variants: &[Variant],
        metrics: &[MetricDefinition],
    ) -> BTreeMap<String, StatResult> {
        let Some((control, treatment)) = control_treatment_pair(variants) else {
            return BTreeMap::new();
        };
        metrics
            .iter()
            .map(|def| {
                let result = self.test_metric(experiment_id, &control.id, &treatment.id, def);
                tracing::debug!(
                    target: "experiment::analyzer",
                    experiment = experiment_id,
                    metric = %def.name,
                    z = result.z_score,
                    p = result.p_value,
                    effect = result.effect_size,
                    significant = result.significant,
                    "metric tested"
                );
                (def.name.clone(), result)
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::model::MetricTarget;

    fn setup() -> (Arc<MetricsAggregator>, StatisticalAnalyzer) {
        let agg = Arc::new(MetricsAggregator::new());
        let analyzer = StatisticalAnalyzer::new(Arc::clone(&agg));
        (agg, analyzer)
    }

    fn counter(name: &str) -> MetricDefinition {
        MetricDefinition::new(name, MetricType::Counter, MetricTarget::HigherIsBetter)
    }

    fn gauge(name: &str) -> MetricDefinition {
        MetricDefinition::new(name, MetricType::Gauge, MetricTarget::LowerIsBetter)
    }

    #[test]
    fn test_reduce_counter_sums_others_average() {
        let s = SampleSummary::from_values(&[1.0, 2.0, 3.0]);
        assert_eq!(reduce(MetricType::Counter, &s), 6.0);
        assert_eq!(reduce(MetricType::Rate, &s), 2.0);
        assert_eq!(reduce(MetricType::Histogram, &s), 2.0);
        assert_eq!(reduce(MetricType::Gauge, &s), 2.0);
    }

    #[test]
    fn test_pair_is_first_two_variants() {
        let vs = vec![Variant::new("A", 40.0), Variant::new("B", 30.0), Variant::new("C", 30.0)];
        let (c, t) = control_treatment_pair(&vs).unwrap();
        assert_eq!((c.id.as_str(), t.id.as_str()), ("A", "B"));
    }

    #[test]
    fn test_pair_none_for_single_variant() {
        assert!(control_treatment_pair(&[Variant::new("A", 100.0)]).is_none());
    }

    #[test]
    fn test_analyze_variant_reduces_each_metric() {
        let (agg, analyzer) = setup();
        for _ in 0..4 { agg.record("e", "A", "clicks", 1.0); }
        for v in [100.0, 200.0] { agg.record("e", "A", "latency", v); }
        let r = analyzer.analyze_variant("e", "A", &[counter("clicks"), gauge("latency")], 0.95);
        assert_eq!(r.metrics["clicks"], 4.0);
        assert_eq!(r.metrics["latency"], 150.0);
        assert_eq!(r.sample_size, 4);
        assert_eq!(r.conversion_rate, 1.0);
        assert_eq!(r.confidence_interval.level, 0.95);
    }

    #[test]
    fn test_analyze_variant_ignores_undeclared_metrics() {
        let (agg, analyzer) = setup();
        agg.record("e", "A", "stray", 9.0);
        let r = analyzer.analyze_variant("e", "A", &[counter("clicks")], 0.95);
        assert_eq!(r.sample_size, 0);
        assert!(!r.metrics.contains_key("stray"));
        assert_eq!(r.metrics["clicks"], 0.0);
    }

    #[test]
    fn test_metric_effect_size_on_counter_sums() {
        let (agg, analyzer) = setup();
        for _ in 0..10 { agg.record("e", "A", "conversion", 1.0); }
        for _ in 0..15 { agg.record("e", "B", "conversion", 1.0); }
        let r = analyzer.test_metric("e", "A", "B", &counter("conversion"));
        assert!((r.effect_size - 0.5).abs() < 1e-12);
        assert_eq!(r.control_value, 10.0);
        assert_eq!(r.treatment_value, 15.0);
        // Per-observation means are identical, so the test cannot reject.
        assert_eq!(r.z_score, 0.0);
        assert!(!r.significant);
    }

    #[test]
    fn test_metric_significant_difference() {
        let (agg, analyzer) = setup();
        for i in 0..200 {
            agg.record("e", "A", "latency", 100.0 + (i % 7) as f64);
            agg.record("e", "B", "latency", 80.0 + (i % 7) as f64);
        }
        let r = analyzer.test_metric("e", "A", "B", &gauge("latency"));
        assert!(r.significant);
        assert!(r.z_score < 0.0);
        assert!(r.effect_size < 0.0);
        assert_eq!(r.test_type, "two_sample_z_test");
    }

    #[test]
    fn test_metric_custom_alpha_applies() {
        let (agg, analyzer) = setup();
        // Small shift: p is roughly 0.19
        for i in 0..30 {
            agg.record("e", "A", "m", (i % 10) as f64);
            agg.record("e", "B", "m", (i % 10) as f64 + 1.0);
        }
        let mut def = gauge("m");
        def.statistical_significance = 0.5;
        assert!(analyzer.test_metric("e", "A", "B", &def).significant);
        def.statistical_significance = 0.001;
        assert!(!analyzer.test_metric("e", "A", "B", &def).significant);
    }

    #[test]
    fn test_zero_control_effect_is_zero() {
        let (agg, analyzer) = setup();
        agg.record("e", "B", "conversion", 3.0);
        let r = analyzer.test_metric("e", "A", "B", &counter("conversion"));
        assert_eq!(r.effect_size, 0.0);
    }

    #[test]
    fn test_perform_tests_covers_every_metric() {
        let (agg, analyzer) = setup();
        agg.record("e", "A", "a", 1.0);
        let vs = vec![Variant::new("A", 50.0), Variant::new("B", 50.0)];
        let tests = analyzer.perform_statistical_tests("e", &vs, &[counter("a"), gauge("b")]);
        assert_eq!(tests.len(), 2);
        assert!(tests.contains_key("a") && tests.contains_key("b"));
    }
}
