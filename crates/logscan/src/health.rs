//! Binary health gate over scan results.

use crate::types::ScanResult;

/// Score of a workload with nothing to report.
pub const HEALTHY: f64 = 1.0;

/// `0.0` if any issue is Critical or High, otherwise `1.0`.
#[must_use]
pub fn score(result: &ScanResult) -> f64 {
    if result
        .issues
        .iter()
        .any(|issue| issue.severity.is_critical_or_high())
    {
        0.0
    } else {
        HEALTHY
    }
}

/// Mean of `scores`, rounded to two decimals and clamped to `[0, 1]`.
///
/// No scores means nothing was found, which counts as healthy.
#[must_use]
pub fn aggregate(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        return HEALTHY;
    }
    let mean = scores.iter().sum::<f64>() / scores.len() as f64;
    ((mean * 100.0).round() / 100.0).clamp(0.0, 1.0)
}

/// Aggregate health over every task result of one run.
#[must_use]
pub fn score_all(results: &[ScanResult]) -> f64 {
    let scores: Vec<f64> = results.iter().map(score).collect();
    aggregate(&scores)
}
