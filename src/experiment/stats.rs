//! # Stage: Statistics Core
//!
//! ## Responsibility
//! Numeric building blocks for experiment analysis: running sample summaries,
//! the pooled two-sample z-test, the standard normal CDF and quantile, and
//! confidence intervals for a mean.
//!
//! ## Guarantees
//! - Non-panicking: empty and degenerate samples produce defined values
//! - Numerically stable: variance uses Welford's update, not sum of squares

/// Name recorded in [`StatResult::test_type`](super::model::StatResult).
pub const Z_TEST: &str = "two_sample_z_test";

// ---------------------------------------------------------------------------
// SampleSummary
// ---------------------------------------------------------------------------

/// Count, sum, mean and sample variance of a stream of observations.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SampleSummary {
    count: usize,
    sum: f64,
    mean: f64,
    /// Sum of squared deviations from the running mean.
    m2: f64,
}

impl SampleSummary {
    pub fn from_values(values: &[f64]) -> Self {
        let mut s = Self::default();
        for &v in values {
            s.push(v);
        }
        s
    }

    pub fn push(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    pub fn count(&self) -> usize { self.count }

    pub fn sum(&self) -> f64 { self.sum }

    pub fn mean(&self) -> f64 {
        if self.count == 0 { 0.0 } else { self.mean }
    }

    /// Sample variance (Bessel's correction); 0 with fewer than 2 samples.
    pub fn variance(&self) -> f64 {
        if self.count < 2 { return 0.0; }
        (self.m2 / (self.count - 1) as f64).max(0.0)
    }

    pub fn std_dev(&self) -> f64 { self.variance().sqrt() }
}

// ---------------------------------------------------------------------------
// Two-sample z-test
// ---------------------------------------------------------------------------

/// z statistic and two-tailed p-value of a control/treatment comparison.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZTest {
    pub z_score: f64,
    pub p_value: f64,
}

impl ZTest {
    fn null() -> Self {
        Self { z_score: 0.0, p_value: 1.0 }
    }
}

/// Pooled standard error of the difference in means.
///
/// Returns `None` when either arm has fewer than 2 observations.
pub fn pooled_standard_error(control: &SampleSummary, treatment: &SampleSummary) -> Option<f64> {
    let n1 = control.count();
    let n2 = treatment.count();
    if n1 < 2 || n2 < 2 { return None; }
    let (n1, n2) = (n1 as f64, n2 as f64);
    let pooled_var = ((n1 - 1.0) * control.variance() + (n2 - 1.0) * treatment.variance())
        / (n1 + n2 - 2.0);
    Some((pooled_var * (1.0 / n1 + 1.0 / n2)).sqrt())
}

/// Compare treatment against control on per-observation means.
///
/// `z = (mean_t - mean_c) / SE` with SE from [`pooled_standard_error`].
/// Zero variance in both arms is decided exactly: equal means give
/// `z = 0, p = 1`, different means give `z = ±inf, p = 0`.
pub fn two_sample_z_test(control: &SampleSummary, treatment: &SampleSummary) -> ZTest {
    let Some(se) = pooled_standard_error(control, treatment) else {
        return ZTest::null();
    };
    let diff = treatment.mean() - control.mean();

    if se <= 0.0 || !se.is_finite() {
        if diff.abs() < 1e-12 {
            return ZTest::null();
        }
        return ZTest { z_score: diff.signum() * f64::INFINITY, p_value: 0.0 };
    }

    let z_score = diff / se;
    ZTest { z_score, p_value: two_tailed_p(z_score) }
}

/// Two-tailed p-value of a standard normal statistic.
pub fn two_tailed_p(z: f64) -> f64 {
    if z.is_nan() { return 1.0; }
    (2.0 * standard_normal_upper_tail(z.abs())).clamp(0.0, 1.0)
}

/// Relative change of `treatment` over `control`; 0 when control is 0.
pub fn relative_effect(control: f64, treatment: f64) -> f64 {
    if control == 0.0 { return 0.0; }
    (treatment - control) / control
}

// ---------------------------------------------------------------------------
// Standard normal distribution
// ---------------------------------------------------------------------------

/// P(Z <= x) for the standard normal distribution.
pub fn standard_normal_cdf(x: f64) -> f64 {
    1.0 - standard_normal_upper_tail(x)
}

/// Upper tail probability of the standard normal distribution (Z > x).
/// Abramowitz & Stegun 26.2.17: absolute error below 7.5e-8.
fn standard_normal_upper_tail(x: f64) -> f64 {
    if x < 0.0 { return 1.0 - standard_normal_upper_tail(-x); }
    if x > 37.0 { return 0.0; }
    let t = 1.0 / (1.0 + 0.2316419 * x);
    let poly = t * (0.319381530
        + t * (-0.356563782
        + t * (1.781477937
        + t * (-1.821255978
        + t * 1.330274429))));
    let pdf = (-0.5 * x * x).exp() / (2.0 * std::f64::consts::PI).sqrt();
    pdf * poly
}

/// Inverse of [`standard_normal_cdf`] for `p` in (0, 1).
///
/// Acklam's rational approximation, relative error below 1.2e-9.
/// Returns `±inf` at the boundaries and NaN outside [0, 1].
pub fn standard_normal_quantile(p: f64) -> f64 {
    if !(0.0..=1.0).contains(&p) { return f64::NAN; }
    if p == 0.0 { return f64::NEG_INFINITY; }
    if p == 1.0 { return f64::INFINITY; }

    const A: [f64; 6] = [
        -3.969683028665376e+01, 2.209460984245205e+02, -2.759285104469687e+02,
        1.383577518672690e+02, -3.066479806614716e+01, 2.506628277459239e+00,
    ];
    const B: [f64; 5] = [
        -5.447609879822406e+01, 1.615858368580409e+02, -1.556989798598866e+02,
        6.680131188771972e+01, -1.328068155288572e+01,
    ];
    const C: [f64; 6] = [
        -7.784894002430293e-03, -3.223964580411365e-01, -2.400758277161838e+00,
        -2.549732539343734e+00, 4.374664141464968e+00, 2.938163982698783e+00,
    ];
    const D: [f64; 4] = [
        7.784695709041462e-03, 3.224671290700398e-01, 2.445134137142996e+00,
        3.754408661907416e+00,
    ];
    const P_LOW: f64 = 0.02425;

    if p < P_LOW {
        let q = (-2.0 * p.ln()).sqrt();
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        -standard_normal_quantile(1.0 - p)
    }
}

/// Normal-approximation interval for the mean at confidence `level`.
///
/// Collapses to `(mean, mean)` with fewer than 2 samples.
pub fn mean_confidence_interval(summary: &SampleSummary, level: f64) -> (f64, f64) {
    let mean = summary.mean();
    let n = summary.count();
    if n < 2 || !(level > 0.0 && level < 1.0) {
        return (mean, mean);
    }
    let z = standard_normal_quantile((1.0 + level) / 2.0);
    let half = z * summary.std_dev() / (n as f64).sqrt();
    (mean - half, mean + half)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
