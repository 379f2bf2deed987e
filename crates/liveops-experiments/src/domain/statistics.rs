//! Two-proportion significance testing.
//!
//! The test statistic is the pooled two-proportion z-score
//!
//! ```text
//! p  = (c1 + c2) / (n1 + n2)
//! se = sqrt(p * (1 - p) * (1/n1 + 1/n2))
//! z  = (c1/n1 - c2/n2) / se
//! ```
//!
//! with a two-sided p-value `2 * (1 - Φ(|z|))`. A difference is significant
//! at confidence `c` when the p-value is below `1 - c`.

use serde::{Deserialize, Serialize};

/// Conversions observed out of samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Proportion {
    /// Converted samples.
    pub conversions: u64,
    /// Total samples.
    pub samples: u64,
}

impl Proportion {
    /// Conversion rate, or `None` without samples.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn rate(&self) -> Option<f64> {
        (self.samples > 0).then(|| self.conversions as f64 / self.samples as f64)
    }
}

/// Outcome of a z-test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZTest {
    /// The z-score; positive when the first proportion is higher.
    pub z: f64,
    /// Two-sided p-value.
    pub p_value: f64,
}

impl ZTest {
    /// Whether the difference clears `confidence` (e.g. `0.95`).
    #[must_use]
    pub fn is_significant(&self, confidence: f64) -> bool {
        self.p_value < 1.0 - confidence
    }
}

/// Runs the pooled two-proportion z-test.
///
/// Returns `None` when either side has no samples. When the pooled standard
/// error is zero (every sample converted, or none did) the proportions are
/// identical and the result is `z = 0`, `p = 1`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn two_proportion_z_test(a: Proportion, b: Proportion) -> Option<ZTest> {
    let rate_a = a.rate()?;
    let rate_b = b.rate()?;
    let n_a = a.samples as f64;
    let n_b = b.samples as f64;
    let pooled = (a.conversions + b.conversions) as f64 / (n_a + n_b);
    let se = (pooled * (1.0 - pooled) * (1.0 / n_a + 1.0 / n_b)).sqrt();
    if se <= 0.0 || !se.is_finite() {
        return Some(ZTest {
            z: 0.0,
            p_value: 1.0,
        });
    }
    let z = (rate_a - rate_b) / se;
    let p_value = (2.0 * (1.0 - normal_cdf(z.abs()))).clamp(0.0, 1.0);
    Some(ZTest { z, p_value })
}

/// Standard normal cumulative distribution function.
#[must_use]
pub fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

/// Error function, Abramowitz and Stegun 7.1.26 (absolute error < 1.5e-7).
#[must_use]
pub fn erf(x: f64) -> f64 {
    const P: f64 = 0.327_591_1;
    const A1: f64 = 0.254_829_592;
    const A2: f64 = -0.284_496_736;
    const A3: f64 = 1.421_413_741;
    const A4: f64 = -1.453_152_027;
    const A5: f64 = 1.061_405_429;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + P * x);
    let poly = ((((A5 * t + A4) * t + A3) * t + A2) * t + A1) * t;
    sign * (1.0 - poly * (-x * x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prop(conversions: u64, samples: u64) -> Proportion {
        Proportion {
            conversions,
            samples,
        }
    }

    #[test]
    fn test_normal_cdf_known_values() {
        assert!((normal_cdf(0.0) - 0.5).abs() < 1e-7);
        assert!((normal_cdf(1.959_964) - 0.975).abs() < 1e-6);
        assert!((normal_cdf(-1.0) - 0.158_655_25).abs() < 1e-6);
    }

    #[test]
    fn test_z_test_matches_hand_computation() {
        // 40/60 vs 10/60: pooled 50/120, se = sqrt(5/12 * 7/12 * 2/60)
        let result = two_proportion_z_test(prop(40, 60), prop(10, 60)).unwrap();

        let se = (5.0_f64 / 12.0 * 7.0 / 12.0 * (2.0 / 60.0)).sqrt();
        assert!((result.z - 0.5 / se).abs() < 1e-9);
        assert!(result.p_value < 1e-6);
        assert!(result.is_significant(0.99));
    }

    #[test]
    fn test_small_difference_is_not_significant() {
        let result = two_proportion_z_test(prop(11, 100), prop(10, 100)).unwrap();

        assert!(result.z > 0.0);
        assert!(result.p_value > 0.5);
        assert!(!result.is_significant(0.95));
    }

    #[test]
    fn test_z_is_antisymmetric() {
        let ab = two_proportion_z_test(prop(30, 90), prop(20, 110)).unwrap();
        let ba = two_proportion_z_test(prop(20, 110), prop(30, 90)).unwrap();

        assert!((ab.z + ba.z).abs() < 1e-12);
        assert!((ab.p_value - ba.p_value).abs() < 1e-12);
    }

    #[test]
    fn test_zero_sample_side_yields_no_test() {
        assert!(two_proportion_z_test(prop(0, 0), prop(5, 10)).is_none());
        assert!(two_proportion_z_test(prop(5, 10), prop(0, 0)).is_none());
    }

    #[test]
    fn test_zero_variance_is_never_significant() {
        let all = two_proportion_z_test(prop(50, 50), prop(70, 70)).unwrap();
        let none = two_proportion_z_test(prop(0, 50), prop(0, 70)).unwrap();

        assert!((all.p_value - 1.0).abs() < f64::EPSILON);
        assert!(!none.is_significant(0.5));
    }
}
