//! Threshold evaluation.
//!
//! Pure comparison of a measured metric against a configured threshold.
//! A missing or non-finite metric is a failure with a distinct reason —
//! never a silent pass.

use crate::result::{CheckStatus, FailReason};

/// Direction of a threshold comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// Metric must be `>=` the threshold (bandwidth floors).
    AtLeast,
    /// Metric must be `<=` the threshold (latency ceilings).
    AtMost,
}

/// Evaluate a measured metric against a threshold.
pub fn evaluate(metric: Option<f64>, threshold: f64, cmp: Comparison) -> CheckStatus {
    let Some(value) = metric.filter(|v| v.is_finite()) else {
        return CheckStatus::Fail(FailReason::Unmeasurable);
    };

    let met = match cmp {
        Comparison::AtLeast => value >= threshold,
        Comparison::AtMost => value <= threshold,
    };

    if met {
        CheckStatus::Pass
    } else {
        CheckStatus::Fail(FailReason::ThresholdNotMet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bandwidth_at_threshold_passes() {
        assert_eq!(
            evaluate(Some(480.0), 480.0, Comparison::AtLeast),
            CheckStatus::Pass
        );
        assert_eq!(
            evaluate(Some(512.3), 480.0, Comparison::AtLeast),
            CheckStatus::Pass
        );
    }

    #[test]
    fn bandwidth_below_threshold_fails() {
        assert_eq!(
            evaluate(Some(300.0), 480.0, Comparison::AtLeast),
            CheckStatus::Fail(FailReason::ThresholdNotMet)
        );
    }

    #[test]
    fn missing_metric_is_unmeasurable_never_pass() {
        assert_eq!(
            evaluate(None, 480.0, Comparison::AtLeast),
            CheckStatus::Fail(FailReason::Unmeasurable)
        );
    }

    #[test]
    fn non_finite_metric_is_unmeasurable() {
        assert_eq!(
            evaluate(Some(f64::NAN), 480.0, Comparison::AtLeast),
            CheckStatus::Fail(FailReason::Unmeasurable)
        );
        assert_eq!(
            evaluate(Some(f64::INFINITY), 480.0, Comparison::AtLeast),
            CheckStatus::Fail(FailReason::Unmeasurable)
        );
    }

    #[test]
    fn at_most_direction() {
        assert_eq!(
            evaluate(Some(5.0), 10.0, Comparison::AtMost),
            CheckStatus::Pass
        );
        assert_eq!(
            evaluate(Some(15.0), 10.0, Comparison::AtMost),
            CheckStatus::Fail(FailReason::ThresholdNotMet)
        );
    }
}
