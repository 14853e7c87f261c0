//! The per-node diagnostic pipeline.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, info};

use gridmedic_remote::RemoteExecutor;

use crate::checks::{hardware_health, nccl_multi, nccl_single};
use crate::result::DiagnosticResult;

/// Settings the diagnostic pipeline needs. Built by the orchestrator
/// from the run configuration — checks never read ambient state.
#[derive(Debug, Clone)]
pub struct DiagConfig {
    /// Path of the health check script on each node.
    pub health_check_script: String,
    /// Single-node NCCL bandwidth floor in MB/s.
    pub nccl_bw_threshold: f64,
    /// Multi-node NCCL bandwidth floor in MB/s.
    pub nccl_multi_bw_threshold: f64,
    /// Timeout per remote check invocation.
    pub check_timeout: Duration,
    /// The run's full target node set; the multi-node bandwidth test
    /// spans it.
    pub peers: Vec<String>,
}

/// Run the full check pipeline for one node.
///
/// Checks run in order — hardware health, single-node bandwidth,
/// multi-node bandwidth — and a failure never skips later checks, so
/// recovery and reports always see complete coverage.
pub async fn diagnose(
    node: &str,
    cfg: &DiagConfig,
    exec: &dyn RemoteExecutor,
) -> DiagnosticResult {
    let started_at = epoch_secs();
    debug!(%node, "diagnosis starting");

    let (hardware, physical_host, vm_name) = hardware_health(node, cfg, exec).await;
    let single = nccl_single(node, cfg, exec).await;
    let multi = nccl_multi(node, cfg, exec).await;

    let result = DiagnosticResult {
        node: node.to_string(),
        checks: vec![hardware, single, multi],
        physical_host,
        vm_name,
        started_at,
        completed_at: epoch_secs(),
    };

    info!(
        %node,
        passing = result.is_passing(),
        error_codes = result.error_codes().len(),
        "diagnosis finished"
    );
    result
}

/// Current Unix epoch in seconds.
fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
