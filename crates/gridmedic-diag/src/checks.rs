//! The individual diagnostic checks.
//!
//! Command strings and log-parsing rules follow the cluster tooling: the
//! NHC wrapper script prints `FAIL`/`Error` markers and `NHC****` codes,
//! and nccl-tests prints a bandwidth table whose `4G` row carries the
//! busbw figure in the seventh column.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, info, warn};

use gridmedic_remote::{ExecError, RemoteExecutor};

use crate::result::{CheckKind, CheckResult, CheckStatus, FailReason};
use crate::runner::DiagConfig;
use crate::threshold::{Comparison, evaluate};

static NHC_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(NHC\d{4})\b").expect("static regex"));

/// GPUs a node must expose for the NCCL tests to be meaningful.
const REQUIRED_GPUS: u32 = 8;

/// Timeout for the cheap per-node GPU census probe.
const CENSUS_TIMEOUT: Duration = Duration::from_secs(10);

/// Hardware health check via the NHC wrapper script.
///
/// Returns the check result plus the physical host / VM names scraped
/// from the log (the report surfaces them).
pub(crate) async fn hardware_health(
    node: &str,
    cfg: &DiagConfig,
    exec: &dyn RemoteExecutor,
) -> (CheckResult, String, String) {
    let command = format!("sudo {} -a 2>&1", cfg.health_check_script);

    let output = match exec.execute(node, &command, cfg.check_timeout).await {
        Ok(output) => output,
        Err(e) => {
            warn!(%node, error = %e, "hardware health check did not execute");
            return (exec_error_result(CheckKind::Hardware, &e), String::new(), String::new());
        }
    };

    let log = output.stdout;
    let codes: Vec<String> = NHC_CODE
        .captures_iter(&log)
        .map(|c| c[1].to_string())
        .collect();

    let mut physical = String::new();
    let mut vm_name = String::new();
    for line in log.lines() {
        if let Some(rest) = line.strip_prefix("PHYSICAL HOST NAME:") {
            physical = rest.trim().to_string();
        } else if let Some(rest) = line.strip_prefix("VM NAME:") {
            vm_name = rest.trim().to_string();
        }
    }

    let healthy = !log.contains("FAIL") && !log.contains("Error");
    info!(
        %node,
        healthy,
        codes = codes.len(),
        "hardware health check finished"
    );

    let result = if healthy {
        CheckResult::pass(CheckKind::Hardware, None)
    } else {
        CheckResult::fail(
            CheckKind::Hardware,
            FailReason::Unhealthy,
            "health check log reported FAIL",
        )
    }
    .with_codes(codes);

    (result, physical, vm_name)
}

/// Single-node NCCL all-reduce bandwidth against `nccl_bw_threshold`.
pub(crate) async fn nccl_single(
    node: &str,
    cfg: &DiagConfig,
    exec: &dyn RemoteExecutor,
) -> CheckResult {
    let gpu_count = match gpu_census(node, exec).await {
        Ok(count) => count,
        Err(e) if is_reachability_error(&e) => {
            return exec_error_result(CheckKind::NcclSingle, &e);
        }
        Err(e) => {
            // nvidia-smi absent or unusable: not a GPU node.
            debug!(%node, error = %e, "gpu census failed, skipping nccl test");
            return CheckResult::skipped(CheckKind::NcclSingle, "gpu census failed");
        }
    };

    if gpu_count == 0 {
        return CheckResult::skipped(CheckKind::NcclSingle, "no GPUs present")
            .with_codes(vec!["NCCL1001".to_string()]);
    }
    if gpu_count < REQUIRED_GPUS {
        return CheckResult::skipped(
            CheckKind::NcclSingle,
            format!("{gpu_count} GPUs, {REQUIRED_GPUS} required"),
        )
        .with_codes(vec!["NCCL1002".to_string()]);
    }

    let command = "source /etc/profile.d/modules.sh && module load mpi/openmpi && \
                   all_reduce_perf -b 8 -e 4G -f 2 -g 1 2>&1";
    let output = match exec.execute(node, command, cfg.check_timeout).await {
        Ok(output) => output,
        Err(e) if is_reachability_error(&e) => {
            return exec_error_result(CheckKind::NcclSingle, &e);
        }
        Err(e) => {
            warn!(%node, error = %e, "nccl test execution failed");
            return CheckResult::fail(CheckKind::NcclSingle, FailReason::RemoteFailure, e.to_string())
                .with_codes(vec!["NCCL1003".to_string()]);
        }
    };

    let Some(busbw) = parse_busbw(&output.stdout) else {
        return CheckResult::fail(
            CheckKind::NcclSingle,
            FailReason::Unmeasurable,
            "no busbw figure in nccl output",
        )
        .with_codes(vec!["NCCL1005".to_string()]);
    };

    let status = evaluate(Some(busbw), cfg.nccl_bw_threshold, Comparison::AtLeast);
    info!(%node, busbw, threshold = cfg.nccl_bw_threshold, ?status, "nccl test finished");

    match status {
        CheckStatus::Pass => CheckResult::pass(CheckKind::NcclSingle, Some(busbw)),
        _ => CheckResult::fail(
            CheckKind::NcclSingle,
            FailReason::ThresholdNotMet,
            format!("{busbw:.2} MB/s < {:.2} MB/s", cfg.nccl_bw_threshold),
        )
        .with_metric(busbw)
        .with_codes(vec!["NCCL1006".to_string()]),
    }
}

/// Multi-node NCCL all-reduce bandwidth across the run's node set.
///
/// Needs at least two nodes and a full GPU complement on every peer.
/// A peer that cannot be probed makes the check `Unmeasurable` — the
/// measurement could not be coordinated, which is not the same as this
/// node failing it.
pub(crate) async fn nccl_multi(
    node: &str,
    cfg: &DiagConfig,
    exec: &dyn RemoteExecutor,
) -> CheckResult {
    if cfg.peers.len() < 2 {
        return CheckResult::skipped(CheckKind::NcclMulti, "fewer than 2 nodes in target set")
            .with_codes(vec!["NCCL_MULTI1001".to_string()]);
    }

    for peer in &cfg.peers {
        match gpu_census(peer, exec).await {
            Ok(count) if count < REQUIRED_GPUS => {
                return CheckResult::skipped(
                    CheckKind::NcclMulti,
                    format!("{peer} has {count} GPUs, {REQUIRED_GPUS} required"),
                )
                .with_codes(vec!["NCCL_MULTI1002".to_string()]);
            }
            Ok(_) => {}
            Err(e) if peer == node && is_reachability_error(&e) => {
                return exec_error_result(CheckKind::NcclMulti, &e);
            }
            Err(e) if is_reachability_error(&e) => {
                warn!(%node, %peer, error = %e, "peer census failed");
                return CheckResult::unmeasurable(
                    CheckKind::NcclMulti,
                    format!("peer {peer} could not be probed: {e}"),
                )
                .with_codes(vec!["NCCL_MULTI1003".to_string()]);
            }
            Err(e) => {
                // Peer has no usable GPU tooling; the test cannot span
                // this set.
                return CheckResult::skipped(
                    CheckKind::NcclMulti,
                    format!("census failed on {peer}: {e}"),
                )
                .with_codes(vec!["NCCL_MULTI1003".to_string()]);
            }
        }
    }

    let command = format!(
        "source /etc/profile.d/modules.sh && module load mpi/openmpi && \
         mpirun -np {} -host {} /opt/nccl-tests/build/all_reduce_perf -b 8 -e 4G -f 2 -g 1 2>&1",
        cfg.peers.len(),
        cfg.peers.join(","),
    );

    let output = match exec.execute(node, &command, cfg.check_timeout).await {
        Ok(output) => output,
        Err(e) if is_reachability_error(&e) => {
            return exec_error_result(CheckKind::NcclMulti, &e);
        }
        Err(e) => {
            // mpirun could not launch across the peer set.
            warn!(%node, error = %e, "multi-node nccl launch failed");
            return CheckResult::unmeasurable(CheckKind::NcclMulti, e.to_string())
                .with_codes(vec!["NCCL_MULTI1004".to_string()]);
        }
    };

    let Some(busbw) = parse_busbw(&output.stdout) else {
        return CheckResult::fail(
            CheckKind::NcclMulti,
            FailReason::Unmeasurable,
            "no busbw figure in nccl output",
        )
        .with_codes(vec!["NCCL_MULTI1006".to_string()]);
    };

    let status = evaluate(Some(busbw), cfg.nccl_multi_bw_threshold, Comparison::AtLeast);
    info!(%node, busbw, threshold = cfg.nccl_multi_bw_threshold, ?status, "multi-node nccl finished");

    match status {
        CheckStatus::Pass => CheckResult::pass(CheckKind::NcclMulti, Some(busbw)),
        _ => CheckResult::fail(
            CheckKind::NcclMulti,
            FailReason::ThresholdNotMet,
            format!("{busbw:.2} MB/s < {:.2} MB/s", cfg.nccl_multi_bw_threshold),
        )
        .with_metric(busbw)
        .with_codes(vec!["NCCL_MULTI1007".to_string()]),
    }
}

/// Count GPUs on a node via `nvidia-smi -L`.
async fn gpu_census(node: &str, exec: &dyn RemoteExecutor) -> Result<u32, ExecError> {
    let output = exec
        .execute(node, "nvidia-smi -L", CENSUS_TIMEOUT)
        .await?;
    Ok(output.stdout.lines().filter(|l| !l.trim().is_empty()).count() as u32)
}

/// Parse the busbw column from nccl-tests output: the `4G` row, seventh
/// whitespace-separated field.
pub(crate) fn parse_busbw(log: &str) -> Option<f64> {
    for line in log.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("4G") {
            return trimmed
                .split_whitespace()
                .nth(6)
                .and_then(|field| field.parse().ok());
        }
    }
    None
}

fn is_reachability_error(e: &ExecError) -> bool {
    matches!(e, ExecError::Transport { .. } | ExecError::Auth { .. })
}

/// A transport error classifies the check `Unreachable`, an auth error
/// `Unauthorized` — never healthy-by-default.
fn exec_error_result(kind: CheckKind, e: &ExecError) -> CheckResult {
    let reason = match e {
        ExecError::Transport { .. } => FailReason::Unreachable,
        ExecError::Auth { .. } => FailReason::Unauthorized,
        _ => FailReason::RemoteFailure,
    };
    CheckResult::fail(kind, reason, e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_NCCL_LOG: &str = "\
# nThread 1 nGpus 1 minBytes 8 maxBytes 4294967296
#       size         count      type   redop    root     time   algbw   busbw  #wrong
         8             2     float     sum      -1    55.21    0.00    0.00      0
  4294967296    1073741824     float     sum      -1   8122.3  528.79  512.43      0
";

    // nccl-tests prints sizes in raw bytes in some builds and with the
    // human suffix in others; the tooling we parse uses the suffix form.
    const SUFFIX_NCCL_LOG: &str = "\
#       size    count    type   redop    root     time   busbw  #wrong
        4G   1073741824  float    sum      -1   8122.3  512.43      0
";

    #[test]
    fn busbw_parsed_from_4g_row() {
        assert_eq!(parse_busbw(SUFFIX_NCCL_LOG), Some(512.43));
    }

    #[test]
    fn busbw_absent_when_no_4g_row() {
        assert_eq!(parse_busbw(SAMPLE_NCCL_LOG), None);
        assert_eq!(parse_busbw(""), None);
        assert_eq!(parse_busbw("garbage\nmore garbage"), None);
    }

    #[test]
    fn busbw_unparseable_field_is_none() {
        let log = "4G 1 float sum -1 8122.3 not-a-number 0";
        assert_eq!(parse_busbw(log), None);
    }

    #[test]
    fn nhc_codes_extracted() {
        let log = "check failed NHC2009 and NHC2016\nok NHC999 too-short";
        let codes: Vec<String> = NHC_CODE
            .captures_iter(log)
            .map(|c| c[1].to_string())
            .collect();
        assert_eq!(codes, vec!["NHC2009", "NHC2016"]);
    }

    #[test]
    fn transport_maps_to_unreachable() {
        let e = ExecError::Transport {
            node: "gpu-1".into(),
            detail: "refused".into(),
        };
        let result = exec_error_result(CheckKind::Hardware, &e);
        assert_eq!(result.status, CheckStatus::Fail(FailReason::Unreachable));
    }

    #[test]
    fn auth_maps_to_unauthorized() {
        let e = ExecError::Auth {
            node: "gpu-1".into(),
            detail: "denied".into(),
        };
        let result = exec_error_result(CheckKind::NcclSingle, &e);
        assert_eq!(result.status, CheckStatus::Fail(FailReason::Unauthorized));
    }
}
