//! Human-readable rendering of experiments and analysis results for the CLI.

use colored::*;

use crate::experiment::model::{Experiment, ExperimentResults, Variant};

fn pct(x: f64) -> String {
    format!("{:+.2}%", x * 100.0)
}

/// One line per variant: id, share and enabled feature flags.
pub fn render_experiment(exp: &Experiment) -> String {
    let mut out = format!(
        "{} {} [{}]\n",
        exp.id.bright_cyan().bold(),
        exp.name,
        exp.status.to_string().bright_yellow()
    );
    for v in &exp.variants {
        out.push_str(&format!("  {}\n", render_variant(v)));
    }
    for m in &exp.metrics {
        out.push_str(&format!(
            "  metric {} ({:?}, {:?}, alpha {})\n",
            m.name.bright_white(),
            m.metric_type,
            m.target,
            m.alpha()
        ));
    }
    out
}

pub fn render_variant(v: &Variant) -> String {
    let flags: Vec<&str> = v
        .feature_flags
        .iter()
        .filter(|(_, on)| **on)
        .map(|(k, _)| k.as_str())
        .collect();
    let mut line = format!("{:<12} {:>6.2}%  {}", v.id, v.traffic_percent, v.name);
    if !flags.is_empty() {
        line.push_str(&format!("  flags: {}", flags.join(", ")));
    }
    line
}

/// Summary of one analysis: per-variant sizes, per-metric tests, verdict.
pub fn render_results(experiment_id: &str, r: &ExperimentResults) -> String {
    let mut out = format!(
        "{} {} ({} samples)\n",
        "RESULTS".bright_cyan().bold(),
        experiment_id.bright_white(),
        r.total_samples
    );

    for (id, v) in &r.variant_results {
        out.push_str(&format!(
            "  {:<12} n={:<7} rate={:.4}  ci=[{:.4}, {:.4}] @{}\n",
            id,
            v.sample_size,
            v.conversion_rate,
            v.confidence_interval.lower,
            v.confidence_interval.upper,
            v.confidence_interval.level
        ));
    }

    out.push_str(&format!(
        "  {} {} vs {}\n",
        "test".bright_yellow(),
        r.treatment_variant,
        r.control_variant
    ));
    for (metric, t) in &r.statistical_tests {
        let verdict = if t.significant {
            "significant".bright_green()
        } else {
            "not significant".normal()
        };
        out.push_str(&format!(
            "    {:<16} effect={:<9} z={:<8.3} p={:<8.4} {}\n",
            metric,
            pct(t.effect_size),
            t.z_score,
            t.p_value,
            verdict
        ));
    }

    if !r.minimum_sample_size_reached {
        out.push_str(&format!("  {}\n", "minimum sample size not reached".bright_red()));
    }
    if !r.breached_guardrails.is_empty() {
        out.push_str(&format!(
            "  {} {}\n",
            "guardrails breached:".bright_red(),
            r.breached_guardrails.join(", ")
        ));
    }
    out.push_str(&format!("  {} {}\n", "conclusion:".bright_yellow(), r.conclusion));
    let rec = if r.significance {
        r.recommendation.bright_green().bold()
    } else {
        r.recommendation.normal()
    };
    out.push_str(&format!("  {} {}\n", "recommendation:".bright_yellow(), rec));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::model::{ConfidenceInterval, StatResult, VariantResult};
    use std::collections::BTreeMap;

    fn results() -> ExperimentResults {
        let mut variant_results = BTreeMap::new();
        variant_results.insert(
            "A".to_string(),
            VariantResult {
                variant_id: "A".into(),
                sample_size: 10,
                metrics: BTreeMap::new(),
                conversion_rate: 0.1,
                confidence_interval: ConfidenceInterval { lower: 0.05, upper: 0.15, level: 0.95 },
            },
        );
        let mut statistical_tests = BTreeMap::new();
        statistical_tests.insert(
            "conversion".to_string(),
            StatResult {
                test_type: "two_sample_z_test".into(),
                p_value: 0.01,
                z_score: 2.5,
                effect_size: 0.5,
                significant: true,
                control_value: 10.0,
                treatment_value: 15.0,
            },
        );
        ExperimentResults {
            total_samples: 10,
            variant_results,
            statistical_tests,
            conclusion: "found 1 significant improvement(s): conversion".into(),
            recommendation: "implement the treatment variant (B)".into(),
            effect_size: 0.5,
            significance: true,
            control_variant: "A".into(),
            treatment_variant: "B".into(),
            minimum_sample_size_reached: false,
            breached_guardrails: vec!["latency".into()],
            analyzed_at: 0,
        }
    }

    #[test]
    fn test_render_results_contains_verdict() {
        colored::control::set_override(false);
        let text = render_results("exp1", &results());
        assert!(text.contains("exp1"));
        assert!(text.contains("+50.00%"));
        assert!(text.contains("significant"));
        assert!(text.contains("minimum sample size not reached"));
        assert!(text.contains("guardrails breached: latency"));
        assert!(text.contains("implement the treatment variant (B)"));
    }

    #[test]
    fn test_render_variant_lists_enabled_flags() {
        colored::control::set_override(false);
        let v = Variant::new("green", 50.0)
            .with_flag("new_styles", true)
            .with_flag("legacy", false);
        let line = render_variant(&v);
        assert!(line.contains("50.00%"));
        assert!(line.contains("flags: new_styles"));
        assert!(!line.contains("legacy"));
    }
}
