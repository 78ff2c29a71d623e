//! Turns per-metric test results into a conclusion and a rollout
//! recommendation.

use std::collections::BTreeMap;

use super::model::{MetricDefinition, MetricTarget, StatResult};

pub const NO_DIFFERENCE: &str = "no statistically significant difference";
pub const CONTINUE_CURRENT: &str = "continue with current implementation or extend experiment duration";
pub const CONTINUE_CONTROL: &str = "continue with control variant";

/// How one significant metric moved relative to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Improvement,
    Regression,
    /// Moved the right way but by less than `minimum_improvement`.
    Marginal,
    /// The test statistic and the effect size disagree in sign. Happens for
    /// counters with unequal arm sizes: the per-observation means move one
    /// way while the sums move the other.
    Inconclusive,
}

/// Classify a significant result against the metric's target.
pub fn direction(def: &MetricDefinition, result: &StatResult) -> Direction {
    if def.target == MetricTarget::NoChange {
        return Direction::Regression;
    }
    let e = result.effect_size;
    let z = result.z_score;
    if e != 0.0 && z != 0.0 && e.signum() != z.signum() {
        return Direction::Inconclusive;
    }
    let oriented = if def.target == MetricTarget::LowerIsBetter { -e } else { e };
    if oriented <= 0.0 {
        Direction::Regression
    } else if oriented < def.minimum_improvement {
        Direction::Marginal
    } else {
        Direction::Improvement
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Conclusion {
    pub conclusion: String,
    pub recommendation: String,
    pub significance: bool,
    /// Significant regressions larger than the metric's `maximum_degradation`.
    pub breached_guardrails: Vec<String>,
}

/// Summarise the test results of one analysis.
///
/// Metrics without a test result (or tests for undeclared metrics) are
/// ignored.
pub fn generate(
    metrics: &[MetricDefinition],
    tests: &BTreeMap<String, StatResult>,
    treatment_id: &str,
) -> Conclusion {
    let mut improvements = Vec::new();
    let mut regressions = Vec::new();
    let mut marginal = Vec::new();
    let mut inconclusive = Vec::new();
    let mut breached = Vec::new();

    for def in metrics {
        let Some(result) = tests.get(&def.name).filter(|r| r.significant) else {
            continue;
        };
        match direction(def, result) {
            Direction::Improvement => improvements.push(def.name.as_str()),
            Direction::Marginal => marginal.push(def.name.as_str()),
            Direction::Inconclusive => inconclusive.push(def.name.as_str()),
            Direction::Regression => {
                regressions.push(def.name.as_str());
                if result.effect_size.abs() > def.maximum_degradation {
                    breached.push(def.name.clone());
                }
            }
        }
    }

    if improvements.is_empty() && regressions.is_empty() && marginal.is_empty() {
        if !inconclusive.is_empty() {
            return Conclusion {
                conclusion: format!(
                    "significant change with conflicting direction: {}",
                    inconclusive.join(", ")
                ),
                recommendation: CONTINUE_CURRENT.to_string(),
                significance: false,
                breached_guardrails: breached,
            };
        }
        return Conclusion {
            conclusion: NO_DIFFERENCE.to_string(),
            recommendation: CONTINUE_CURRENT.to_string(),
            significance: false,
            breached_guardrails: breached,
        };
    }

    if improvements.is_empty() {
        let moved: Vec<&str> = regressions.iter().chain(&marginal).copied().collect();
        return Conclusion {
            conclusion: format!(
                "found {} significant result(s), none improving: {}",
                moved.len(),
                moved.join(", ")
            ),
            recommendation: CONTINUE_CONTROL.to_string(),
            significance: false,
            breached_guardrails: breached,
        };
    }

    let mut conclusion = format!(
        "found {} significant improvement(s): {}",
        improvements.len(),
        improvements.join(", ")
    );
    if !regressions.is_empty() {
        conclusion.push_str(&format!(
            "; {} significant regression(s): {}",
            regressions.len(),
            regressions.join(", ")
        ));
    }
    Conclusion {
        conclusion,
        recommendation: format!("implement the treatment variant ({treatment_id})"),
        significance: true,
        breached_guardrails: breached,
    }
}
