//! The submission controller — gating, trimming, bounded retries.

use tracing::{info, warn};

use gridmedic_config::GhrConfig;
use gridmedic_orchestrator::ClusterVerdict;

use crate::GhrResult;
use crate::client::GhrClient;
use crate::log::SubmissionLog;
use crate::payload::{build_payload, failed_entries, new_request_id};

/// What the controller decided for one verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GhrOutcome {
    /// GHR is disabled by configuration.
    Disabled,
    /// A successful submission is already recorded within the window.
    RecentSuccess,
    /// The verdict had no nodes worth reporting.
    NoFailedNodes,
    /// Submitted on the given attempt.
    Submitted { attempts: u32 },
    /// All attempts failed.
    Failed { attempts: u32 },
}

/// Submit the verdict's failed nodes to GHR, if the gates allow it.
///
/// Batches at most once per `skip_hours`, caps the node list at
/// `max_nodes`, retries up to `max_retries` with the configured interval,
/// and records every attempt in the NDJSON log.
pub async fn run_ghr_if_needed(
    enabled: bool,
    cfg: &GhrConfig,
    verdict: &ClusterVerdict,
    log: &SubmissionLog,
    client: &dyn GhrClient,
    now: u64,
) -> GhrResult<GhrOutcome> {
    if !enabled {
        info!("ghr disabled by configuration");
        return Ok(GhrOutcome::Disabled);
    }

    let window = std::time::Duration::from_secs(u64::from(cfg.skip_hours) * 3600);
    if log.has_recent_success(now, window) {
        info!(skip_hours = cfg.skip_hours, "skipping ghr: recent success in window");
        return Ok(GhrOutcome::RecentSuccess);
    }

    let mut failed = failed_entries(verdict);
    if failed.is_empty() {
        info!("no failed nodes, no ghr submission");
        return Ok(GhrOutcome::NoFailedNodes);
    }

    if failed.len() > cfg.max_nodes {
        warn!(
            count = failed.len(),
            max_nodes = cfg.max_nodes,
            "failed node count exceeds the batch cap, trimming"
        );
        failed.truncate(cfg.max_nodes);
    }

    let request_id = new_request_id();
    let payload = build_payload(
        &cfg.impact_category,
        &cfg.impact_description,
        &failed,
        now,
        &request_id,
    );

    for attempt in 1..=cfg.max_retries.max(1) {
        match client.submit(&payload).await {
            Ok(()) => {
                log.record(now, "success", &request_id, &failed)?;
                info!(attempt, nodes = failed.len(), "ghr batch submitted");
                return Ok(GhrOutcome::Submitted { attempts: attempt });
            }
            Err(e) => {
                log.record(now, "failure", &request_id, &failed)?;
                warn!(attempt, error = %e, "ghr submission attempt failed");
                if attempt < cfg.max_retries {
                    tokio::time::sleep(cfg.retry_interval).await;
                }
            }
        }
    }

    Ok(GhrOutcome::Failed {
        attempts: cfg.max_retries.max(1),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use gridmedic_diag::{CheckKind, CheckResult, DiagnosticResult, FailReason};
    use gridmedic_orchestrator::NodeReport;
    use gridmedic_recovery::RecoveryAction;
    use gridmedic_state::RebootRecord;

    use crate::GhrError;

    struct FakeClient {
        /// Results to hand out, in order; missing entries succeed.
        failures_before_success: Mutex<u32>,
        payloads: Mutex<Vec<serde_json::Value>>,
    }

    impl FakeClient {
        fn succeeding() -> Self {
            Self {
                failures_before_success: Mutex::new(0),
                payloads: Mutex::new(Vec::new()),
            }
        }

        fn failing_first(n: u32) -> Self {
            Self {
                failures_before_success: Mutex::new(n),
                payloads: Mutex::new(Vec::new()),
            }
        }

        fn seen(&self) -> Vec<serde_json::Value> {
            self.payloads.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl GhrClient for FakeClient {
        async fn submit(&self, payload: &serde_json::Value) -> GhrResult<()> {
            self.payloads.lock().unwrap().push(payload.clone());
            let mut remaining = self.failures_before_success.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(GhrError::Submit("endpoint returned 503".to_string()));
            }
            Ok(())
        }
    }

    fn failing_report(node: &str, codes: &[&str]) -> NodeReport {
        NodeReport {
            result: DiagnosticResult {
                node: node.to_string(),
                checks: vec![
                    CheckResult::fail(CheckKind::Hardware, FailReason::Unhealthy, "")
                        .with_codes(codes.iter().map(|c| c.to_string()).collect()),
                ],
                physical_host: String::new(),
                vm_name: String::new(),
                started_at: 0,
                completed_at: 1,
            },
            action: RecoveryAction::Reboot,
            history: RebootRecord::new(node),
        }
    }

    fn clean_report(node: &str) -> NodeReport {
        NodeReport {
            result: DiagnosticResult {
                node: node.to_string(),
                checks: vec![CheckResult::pass(CheckKind::Hardware, None)],
                physical_host: String::new(),
                vm_name: String::new(),
                started_at: 0,
                completed_at: 1,
            },
            action: RecoveryAction::NoAction,
            history: RebootRecord::new(node),
        }
    }

    fn verdict(nodes: Vec<NodeReport>) -> ClusterVerdict {
        ClusterVerdict {
            started_at: 0,
            completed_at: 1,
            deadline_hit: false,
            nodes,
        }
    }

    fn test_cfg() -> GhrConfig {
        GhrConfig {
            endpoint: "http://ghr.internal/api/v1/ghr".to_string(),
            skip_hours: 24,
            max_nodes: 10,
            max_retries: 3,
            retry_interval: Duration::from_millis(1),
            impact_category: "NHC2001".to_string(),
            impact_description: String::new(),
        }
    }

    fn temp_log() -> (tempfile::TempDir, SubmissionLog) {
        let dir = tempfile::tempdir().unwrap();
        let log = SubmissionLog::new(dir.path().join("ghr_log.ndjson"));
        (dir, log)
    }

    #[tokio::test]
    async fn disabled_submits_nothing() {
        let (_dir, log) = temp_log();
        let client = FakeClient::succeeding();
        let v = verdict(vec![failing_report("gpu-1", &["NHC2009"])]);

        let outcome = run_ghr_if_needed(false, &test_cfg(), &v, &log, &client, 1_700_000_000)
            .await
            .unwrap();

        assert_eq!(outcome, GhrOutcome::Disabled);
        assert!(client.seen().is_empty());
    }

    #[tokio::test]
    async fn clean_verdict_submits_nothing() {
        let (_dir, log) = temp_log();
        let client = FakeClient::succeeding();
        let v = verdict(vec![clean_report("gpu-1")]);

        let outcome = run_ghr_if_needed(true, &test_cfg(), &v, &log, &client, 1_700_000_000)
            .await
            .unwrap();

        assert_eq!(outcome, GhrOutcome::NoFailedNodes);
    }

    #[tokio::test]
    async fn recent_success_skips_submission() {
        let (_dir, log) = temp_log();
        let client = FakeClient::succeeding();
        let v = verdict(vec![failing_report("gpu-1", &["NHC2009"])]);

        // First run submits and records success.
        let outcome = run_ghr_if_needed(true, &test_cfg(), &v, &log, &client, 1_700_000_000)
            .await
            .unwrap();
        assert_eq!(outcome, GhrOutcome::Submitted { attempts: 1 });

        // An hour later the gate holds.
        let outcome = run_ghr_if_needed(true, &test_cfg(), &v, &log, &client, 1_700_003_600)
            .await
            .unwrap();
        assert_eq!(outcome, GhrOutcome::RecentSuccess);
        assert_eq!(client.seen().len(), 1);
    }

    #[tokio::test]
    async fn node_list_is_trimmed_to_cap() {
        let (_dir, log) = temp_log();
        let client = FakeClient::succeeding();
        let mut cfg = test_cfg();
        cfg.max_nodes = 2;

        let v = verdict(vec![
            failing_report("gpu-1", &["NHC2009"]),
            failing_report("gpu-2", &["NHC2016"]),
            failing_report("gpu-3", &["NHC2021"]),
        ]);

        run_ghr_if_needed(true, &cfg, &v, &log, &client, 1_700_000_000)
            .await
            .unwrap();

        let payload = &client.seen()[0];
        assert_eq!(payload["properties"]["nodes"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let (_dir, log) = temp_log();
        let client = FakeClient::failing_first(2);
        let v = verdict(vec![failing_report("gpu-1", &["NHC2009"])]);

        let outcome = run_ghr_if_needed(true, &test_cfg(), &v, &log, &client, 1_700_000_000)
            .await
            .unwrap();

        assert_eq!(outcome, GhrOutcome::Submitted { attempts: 3 });
        assert_eq!(client.seen().len(), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_report_failure_and_do_not_gate() {
        let (_dir, log) = temp_log();
        let client = FakeClient::failing_first(10);
        let v = verdict(vec![failing_report("gpu-1", &["NHC2009"])]);

        let outcome = run_ghr_if_needed(true, &test_cfg(), &v, &log, &client, 1_700_000_000)
            .await
            .unwrap();
        assert_eq!(outcome, GhrOutcome::Failed { attempts: 3 });

        // Failures never satisfy the recent-success gate.
        let client2 = FakeClient::succeeding();
        let outcome = run_ghr_if_needed(true, &test_cfg(), &v, &log, &client2, 1_700_000_100)
            .await
            .unwrap();
        assert_eq!(outcome, GhrOutcome::Submitted { attempts: 1 });
    }
}
