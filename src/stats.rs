//! Small statistics helpers for risk-exposure sampling and multi-run
//! summaries.

use serde::Serialize;

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64).sqrt()
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ConfidenceInterval {
    pub mean: f64,
    pub lower: f64,
    pub upper: f64,
}

/// 95% normal confidence interval for the mean of `values`.
pub fn confidence(values: &[f64]) -> ConfidenceInterval {
    let m = mean(values);
    let half = 1.96 * std_dev(values) / (values.len() as f64).sqrt();
    ConfidenceInterval {
        mean: m,
        lower: m - half,
        upper: m + half,
    }
}

/// 95% normal confidence interval for `mean(a) - mean(b)` with independent
/// samples.
pub fn difference_with_confidence(a: &[f64], b: &[f64]) -> ConfidenceInterval {
    let diff = mean(a) - mean(b);
    let var_a = std_dev(a).powi(2);
    let var_b = std_dev(b).powi(2);
    let half = 1.96 * (var_a / a.len() as f64 + var_b / b.len() as f64).sqrt();
    ConfidenceInterval {
        mean: diff,
        lower: diff - half,
        upper: diff + half,
    }
}

/// Quantile function of the standard normal distribution (Acklam's rational
/// approximation, |relative error| < 1.15e-9). `p` must lie in (0, 1).
pub fn normal_quantile(p: f64) -> f64 {
    debug_assert!(p > 0.0 && p < 1.0, "quantile requires p in (0, 1), got {p}");

    const A: [f64; 6] = [
        -3.969683028665376e+01,
        2.209460984245205e+02,
        -2.759285104469687e+02,
        1.383577518672690e+02,
        -3.066479806614716e+01,
        2.506628277459239e+00,
    ];
    const B: [f64; 5] = [
        -5.447609879822406e+01,
        1.615858368580409e+02,
        -1.556989798598866e+02,
        6.680131188771972e+01,
        -1.328068155288572e+01,
    ];
    const C: [f64; 6] = [
        -7.784894002430293e-03,
        -3.223964580411365e-01,
        -2.400758277161838e+00,
        -2.549732539343734e+00,
        4.374664141464968e+00,
        2.938163982698783e+00,
    ];
    const D: [f64; 4] = [
        7.784695709041462e-03,
        3.224671290700398e-01,
        2.445134137142996e+00,
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
        let q = (-2.0 * (1.0 - p).ln()).sqrt();
        -(((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_mean_and_std() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_relative_eq!(mean(&values), 5.0, max_relative = 1e-12);
        assert_relative_eq!(std_dev(&values), 2.0, max_relative = 1e-12);
    }

    #[test]
    fn test_confidence_brackets_mean() {
        let values = [10.0, 12.0, 9.0, 11.0, 10.5];
        let ci = confidence(&values);
        assert!(ci.lower < ci.mean && ci.mean < ci.upper);
    }

    #[test]
    fn test_normal_quantile_known_values() {
        assert_relative_eq!(normal_quantile(0.5), 0.0, epsilon = 1e-9);
        assert_relative_eq!(normal_quantile(0.975), 1.959964, epsilon = 1e-5);
        assert_relative_eq!(normal_quantile(0.025), -1.959964, epsilon = 1e-5);
        assert_relative_eq!(normal_quantile(0.99), 2.326348, epsilon = 1e-5);
        // Tail branch
        assert_relative_eq!(normal_quantile(0.001), -3.090232, epsilon = 1e-5);
    }

    #[test]
    fn test_normal_quantile_symmetry() {
        for &p in &[0.01, 0.1, 0.3, 0.45] {
            assert_relative_eq!(
                normal_quantile(p),
                -normal_quantile(1.0 - p),
                epsilon = 1e-9
            );
        }
    }
}
