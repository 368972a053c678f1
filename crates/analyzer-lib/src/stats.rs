//! Numeric helpers shared by the pipeline stages

use std::cmp::Ordering;

/// Scale factor making MAD a consistent estimator of the standard deviation
pub const MAD_SCALE: f64 = 1.4826;

/// Guard for divisions by near-zero baselines
pub const EPSILON: f64 = 1e-9;

/// Percentile with linear interpolation between closest ranks
///
/// `p` is in percent (0-100). Returns `None` for empty input.
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    Some(percentile_sorted(&sorted, p))
}

/// Same as [`percentile`] for input that is already sorted ascending
pub fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = (p / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

pub fn median(values: &[f64]) -> Option<f64> {
    percentile(values, 50.0)
}

/// Unscaled median absolute deviation around `center`
pub fn mad(values: &[f64], center: f64) -> Option<f64> {
    let deviations: Vec<f64> = values.iter().map(|v| (v - center).abs()).collect();
    median(&deviations)
}

/// Relative change from `baseline` to `value`, in percent
///
/// A near-zero baseline yields 0 rather than an unbounded ratio.
pub fn pct_change(value: f64, baseline: f64) -> f64 {
    if baseline.abs() < EPSILON {
        return 0.0;
    }
    (value - baseline) / baseline * 100.0
}

/// Least-squares slope of `values` against their index
pub fn linear_regression_slope(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let sum_x: f64 = (0..values.len()).map(|i| i as f64).sum();
    let sum_y: f64 = values.iter().sum();
    let sum_xy: f64 = values.iter().enumerate().map(|(i, y)| i as f64 * y).sum();
    let sum_x2: f64 = (0..values.len()).map(|i| (i as f64).powi(2)).sum();
    let denom = n * sum_x2 - sum_x.powi(2);
    if denom.abs() < f64::EPSILON {
        return 0.0;
    }
    (n * sum_xy - sum_x * sum_y) / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_linear_interpolation() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0];
        // rank = 0.9 * 9 = 8.1 -> 9 + 0.1 * (10 - 9)
        assert!((percentile(&values, 90.0).unwrap() - 9.1).abs() < 1e-9);
        assert!((percentile(&values, 50.0).unwrap() - 5.5).abs() < 1e-9);
        assert_eq!(percentile(&values, 0.0), Some(1.0));
        assert_eq!(percentile(&values, 100.0), Some(10.0));
    }

    #[test]
    fn test_percentile_unsorted_and_single() {
        assert_eq!(percentile(&[42.0], 95.0), Some(42.0));
        let values = vec![30.0, 10.0, 20.0];
        assert_eq!(percentile(&values, 50.0), Some(20.0));
        assert_eq!(percentile(&[], 50.0), None);
    }

    #[test]
    fn test_median_and_mad() {
        let values = vec![400.0, 430.0, 405.0];
        let m = median(&values).unwrap();
        assert_eq!(m, 405.0);
        // deviations 5, 25, 0 -> median 5
        assert_eq!(mad(&values, m), Some(5.0));
    }

    #[test]
    fn test_pct_change() {
        assert!((pct_change(900.0, 400.0) - 125.0).abs() < 1e-9);
        assert!((pct_change(0.18, 0.096) - 87.5).abs() < 1e-9);
        assert_eq!(pct_change(10.0, 0.0), 0.0);
    }

    #[test]
    fn test_linear_regression_slope() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert!((linear_regression_slope(&values) - 1.0).abs() < 0.01);
        assert_eq!(linear_regression_slope(&[]), 0.0);
    }

    #[test]
    fn test_mean() {
        assert_eq!(mean(&[2.0, 4.0]), Some(3.0));
        assert_eq!(mean(&[]), None);
    }
}
