// src/sim_eval/stats.rs
//
// Descriptive statistics and two-sample hypothesis testing.
//
// - Welch's unequal-variance t-test with Welch-Satterthwaite degrees of
//   freedom; two-sided p-value from the Student-t survival function
// - Cohen's d with pooled standard deviation
//
// Degenerate inputs (too few samples, zero variance) give a p-value of 1.0
// or 0.0 and leave the statistic / effect size unset rather than emitting
// non-finite numbers.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};

/// Sample summary (sample standard deviation, n - 1 denominator).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub n: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

impl Summary {
    pub fn of(samples: &[f64]) -> Self {
        let n = samples.len();
        if n == 0 {
            return Self {
                n: 0,
                mean: 0.0,
                std: 0.0,
                min: 0.0,
                max: 0.0,
            };
        }
        let mean = samples.iter().sum::<f64>() / n as f64;
        let var = sample_variance(samples, mean);
        Self {
            n,
            mean,
            std: var.sqrt(),
            min: samples.iter().cloned().fold(f64::INFINITY, f64::min),
            max: samples.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

fn sample_variance(samples: &[f64], mean: f64) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }
    samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (samples.len() - 1) as f64
}

/// Outcome of a two-sample comparison of `a` against `b`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TTestResult {
    /// t statistic (a - b); None when undefined.
    pub statistic: Option<f64>,
    pub degrees_of_freedom: Option<f64>,
    /// Two-sided p-value, always in [0, 1].
    pub p_value: f64,
    /// Cohen's d (a - b); None when undefined.
    pub effect_size: Option<f64>,
    pub mean_difference: f64,
}

impl TTestResult {
    pub fn is_significant(&self, alpha: f64) -> bool {
        self.p_value < alpha
    }

    /// Conventional label for |d|.
    pub fn effect_label(&self) -> &'static str {
        match self.effect_size.map(f64::abs) {
            None => "undefined",
            Some(d) if d < 0.2 => "negligible",
            Some(d) if d < 0.5 => "small",
            Some(d) if d < 0.8 => "medium",
            Some(_) => "large",
        }
    }
}

/// Welch's t-test plus Cohen's d.
pub fn welch_t_test(a: &[f64], b: &[f64]) -> TTestResult {
    let sa = Summary::of(a);
    let sb = Summary::of(b);
    let mean_difference = sa.mean - sb.mean;
    let effect_size = cohens_d(a, b);

    if sa.n < 2 || sb.n < 2 {
        return TTestResult {
            statistic: None,
            degrees_of_freedom: None,
            p_value: 1.0,
            effect_size,
            mean_difference,
        };
    }

    let va = sa.std * sa.std / sa.n as f64;
    let vb = sb.std * sb.std / sb.n as f64;
    let se2 = va + vb;

    if se2 <= 0.0 {
        let p_value = if mean_difference == 0.0 { 1.0 } else { 0.0 };
        return TTestResult {
            statistic: if mean_difference == 0.0 { Some(0.0) } else { None },
            degrees_of_freedom: None,
            p_value,
            effect_size,
            mean_difference,
        };
    }

    let t = mean_difference / se2.sqrt();
    let df = se2 * se2 / (va * va / (sa.n - 1) as f64 + vb * vb / (sb.n - 1) as f64);

    TTestResult {
        statistic: Some(t),
        degrees_of_freedom: Some(df),
        p_value: student_t_two_sided_p(t, df),
        effect_size,
        mean_difference,
    }
}

/// Standardised mean difference with pooled standard deviation.
pub fn cohens_d(a: &[f64], b: &[f64]) -> Option<f64> {
    let sa = Summary::of(a);
    let sb = Summary::of(b);
    if sa.n == 0 || sb.n == 0 || sa.n + sb.n < 3 {
        return None;
    }
    let pooled_var = ((sa.n.saturating_sub(1)) as f64 * sa.std * sa.std
        + (sb.n.saturating_sub(1)) as f64 * sb.std * sb.std)
        / (sa.n + sb.n - 2) as f64;
    let diff = sa.mean - sb.mean;
    if pooled_var <= 0.0 {
        return if diff == 0.0 { Some(0.0) } else { None };
    }
    Some(diff / pooled_var.sqrt())
}

/// P(|T| >= |t|) for Student's t with real-valued `df`.
pub fn student_t_two_sided_p(t: f64, df: f64) -> f64 {
    if t.is_nan() || !(df > 0.0) {
        return 1.0;
    }
    if t.is_infinite() {
        return 0.0;
    }
    match StudentsT::new(0.0, 1.0, df) {
        Ok(dist) => (2.0 * dist.sf(t.abs())).clamp(0.0, 1.0),
        Err(_) => 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary() {
        let s = Summary::of(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(s.n, 5);
        assert!((s.mean - 3.0).abs() < 1e-12);
        assert!((s.std - 2.5f64.sqrt()).abs() < 1e-12);
        assert_eq!((s.min, s.max), (1.0, 5.0));
        assert_eq!(Summary::of(&[]).n, 0);
    }

    #[test]
    fn test_t_table_critical_values() {
        assert!((student_t_two_sided_p(2.228, 10.0) - 0.05).abs() < 1e-3);
        assert!((student_t_two_sided_p(2.571, 5.0) - 0.05).abs() < 1e-3);
        assert!((student_t_two_sided_p(1.0, 1.0) - 0.5).abs() < 1e-6);
        assert!((student_t_two_sided_p(0.0, 4.0) - 1.0).abs() < 1e-12);
        // Large df approaches the normal: 1.96 -> 0.05
        assert!((student_t_two_sided_p(1.96, 1e6) - 0.05).abs() < 1e-3);
    }

    #[test]
    fn test_two_sided_p_edge_cases() {
        assert_eq!(student_t_two_sided_p(f64::NAN, 5.0), 1.0);
        assert_eq!(student_t_two_sided_p(2.0, 0.0), 1.0);
        assert_eq!(student_t_two_sided_p(f64::INFINITY, 5.0), 0.0);
        assert_eq!(student_t_two_sided_p(-2.5, 7.0), student_t_two_sided_p(2.5, 7.0));
    }

    #[test]
    fn test_welch_reference_example() {
        let r = welch_t_test(&[1.0, 2.0, 3.0, 4.0, 5.0], &[2.0, 4.0, 6.0, 8.0, 10.0]);
        assert!((r.statistic.unwrap() + 1.897_366_596).abs() < 1e-6);
        assert!((r.degrees_of_freedom.unwrap() - 5.882_352_941).abs() < 1e-6);
        assert!((r.p_value - 0.1075).abs() < 1e-3);
        assert!(!r.is_significant(0.05));
        assert_eq!(r.mean_difference, -3.0);
    }

    #[test]
    fn test_clear_difference_is_significant() {
        let a: Vec<f64> = (0..20).map(|i| 20.0 + (i % 3) as f64 * 0.1).collect();
        let b: Vec<f64> = (0..20).map(|i| 30.0 + (i % 4) as f64 * 0.1).collect();
        let r = welch_t_test(&a, &b);
        assert!(r.p_value < 1e-6);
        assert!(r.effect_size.unwrap() < -5.0);
        assert_eq!(r.effect_label(), "large");
    }

    #[test]
    fn test_degenerate_inputs_keep_p_in_range() {
        let same = welch_t_test(&[3.0, 3.0, 3.0], &[3.0, 3.0]);
        assert_eq!(same.p_value, 1.0);
        assert_eq!(same.effect_size, Some(0.0));

        let apart = welch_t_test(&[1.0, 1.0], &[2.0, 2.0]);
        assert_eq!(apart.p_value, 0.0);
        assert!(apart.statistic.is_none());
        assert!(apart.effect_size.is_none());

        let tiny = welch_t_test(&[1.0], &[2.0, 3.0]);
        assert_eq!(tiny.p_value, 1.0);
        assert!(tiny.statistic.is_none());
    }

    #[test]
    fn test_cohens_d_pooled() {
        // Equal variances 2.5, means 3 and 5 -> d = -2 / sqrt(2.5)
        let d = cohens_d(&[1.0, 2.0, 3.0, 4.0, 5.0], &[3.0, 4.0, 5.0, 6.0, 7.0]).unwrap();
        assert!((d + 2.0 / 2.5f64.sqrt()).abs() < 1e-12);
    }
}
