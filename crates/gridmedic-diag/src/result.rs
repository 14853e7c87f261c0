//! Diagnostic result types.
//!
//! One [`DiagnosticResult`] per node per run, immutable once produced.

use serde::{Deserialize, Serialize};

/// Which diagnostic produced a [`CheckResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    /// NHC hardware/software health check.
    Hardware,
    /// Single-node NCCL all-reduce bandwidth.
    NcclSingle,
    /// Multi-node NCCL all-reduce bandwidth.
    NcclMulti,
    /// Synthetic entry for a node whose diagnosis missed the run deadline.
    RunDeadline,
}

impl CheckKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckKind::Hardware => "hardware_health",
            CheckKind::NcclSingle => "nccl_bandwidth",
            CheckKind::NcclMulti => "nccl_multi_bandwidth",
            CheckKind::RunDeadline => "run_deadline",
        }
    }
}

/// Why a check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailReason {
    /// Measured metric did not meet the configured threshold.
    ThresholdNotMet,
    /// The diagnostic tool ran and reported the node unhealthy.
    Unhealthy,
    /// No comparable metric could be produced.
    Unmeasurable,
    /// The node could not be reached.
    Unreachable,
    /// Credentials were rejected.
    Unauthorized,
    /// The remote invocation itself exited non-zero.
    RemoteFailure,
    /// The run deadline elapsed before diagnosis completed.
    Timeout,
}

/// Outcome of a single check.
///
/// `Unmeasurable` (as opposed to `Fail(Unmeasurable)`) is the multi-node
/// bandwidth test whose peer coordination failed: reported distinctly but
/// failing for recovery purposes. `Skipped` is structural (too few GPUs
/// or nodes) and excluded from the overall verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "reason")]
pub enum CheckStatus {
    Pass,
    Fail(FailReason),
    Unmeasurable,
    Skipped,
}

impl CheckStatus {
    /// Whether this status counts as a failure for recovery (fail-closed).
    pub fn is_failing(&self) -> bool {
        matches!(self, CheckStatus::Fail(_) | CheckStatus::Unmeasurable)
    }
}

/// Result of one check on one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub kind: CheckKind,
    pub status: CheckStatus,
    /// Measured bandwidth in MB/s, when the check produced one.
    pub metric: Option<f64>,
    /// Error detail when the check itself failed to execute, or a short
    /// note for skips.
    pub detail: String,
    /// Diagnostic error codes (`NHC****`, `NCCL****`, `NCCL_MULTI****`).
    pub error_codes: Vec<String>,
}

impl CheckResult {
    pub fn pass(kind: CheckKind, metric: Option<f64>) -> Self {
        Self {
            kind,
            status: CheckStatus::Pass,
            metric,
            detail: String::new(),
            error_codes: Vec::new(),
        }
    }

    pub fn fail(kind: CheckKind, reason: FailReason, detail: impl Into<String>) -> Self {
        Self {
            kind,
            status: CheckStatus::Fail(reason),
            metric: None,
            detail: detail.into(),
            error_codes: Vec::new(),
        }
    }

    pub fn skipped(kind: CheckKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            status: CheckStatus::Skipped,
            metric: None,
            detail: detail.into(),
            error_codes: Vec::new(),
        }
    }

    pub fn unmeasurable(kind: CheckKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            status: CheckStatus::Unmeasurable,
            metric: None,
            detail: detail.into(),
            error_codes: Vec::new(),
        }
    }

    pub fn with_codes(mut self, codes: Vec<String>) -> Self {
        self.error_codes = codes;
        self
    }

    pub fn with_metric(mut self, metric: f64) -> Self {
        self.metric = Some(metric);
        self
    }
}

/// Complete diagnostic picture for one node in one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticResult {
    pub node: String,
    /// Check results in pipeline order.
    pub checks: Vec<CheckResult>,
    /// Physical host name extracted from the NHC log, if any.
    pub physical_host: String,
    /// VM name extracted from the NHC log, if any.
    pub vm_name: String,
    /// Unix timestamps (seconds) bracketing the node's pipeline.
    pub started_at: u64,
    pub completed_at: u64,
}

impl DiagnosticResult {
    /// Synthetic result for a node whose pipeline missed the run deadline.
    pub fn timed_out(node: &str, started_at: u64, now: u64) -> Self {
        Self {
            node: node.to_string(),
            checks: vec![CheckResult::fail(
                CheckKind::RunDeadline,
                FailReason::Timeout,
                "diagnosis did not complete before the run deadline",
            )],
            physical_host: String::new(),
            vm_name: String::new(),
            started_at,
            completed_at: now,
        }
    }

    /// `true` only if every non-skipped check passed.
    pub fn is_passing(&self) -> bool {
        !self.checks.iter().any(|c| c.status.is_failing())
    }

    /// All error codes across checks, in pipeline order.
    pub fn error_codes(&self) -> Vec<String> {
        self.checks
            .iter()
            .flat_map(|c| c.error_codes.iter().cloned())
            .collect()
    }

    /// Whether any check failed because the node was unreachable.
    pub fn is_unreachable(&self) -> bool {
        self.checks.iter().any(|c| {
            matches!(
                c.status,
                CheckStatus::Fail(FailReason::Unreachable | FailReason::Timeout)
            )
        })
    }
}
