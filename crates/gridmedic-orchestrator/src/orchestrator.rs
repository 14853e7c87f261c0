//! The orchestrator — one `run` per sweep or job trigger.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use gridmedic_config::Config;
use gridmedic_diag::{DiagConfig, DiagnosticResult, diagnose};
use gridmedic_recovery::{RecoveryAction, RecoveryEngine};
use gridmedic_remote::{ExecError, RemoteExecutor};
use gridmedic_state::{HistoryStore, RebootRecord};

use crate::error::OrchestratorResult;
use crate::nodes::{NodeLister, Target};
use crate::verdict::{ClusterVerdict, NodeReport};

/// Probe interval while waiting for a rebooted node to come back.
const REACHABILITY_PROBE_INTERVAL: Duration = Duration::from_secs(5);

/// Timeout for the reboot command itself; the connection usually drops
/// before ssh reports anything.
const REBOOT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Top-level coordinator for one health run.
pub struct Orchestrator {
    config: Config,
    executor: Arc<dyn RemoteExecutor>,
    recovery: RecoveryEngine,
}

impl Orchestrator {
    /// Assemble an orchestrator. The configuration must already be
    /// validated — an invalid threshold or cap never reaches a run.
    pub fn new(config: Config, executor: Arc<dyn RemoteExecutor>, history: HistoryStore) -> Self {
        let recovery = RecoveryEngine::new(history, config.max_reboot_count);
        Self {
            config,
            executor,
            recovery,
        }
    }

    /// The recovery engine (for operator commands: clear, show).
    pub fn recovery(&self) -> &RecoveryEngine {
        &self.recovery
    }

    /// Resolve a target and run diagnosis over it.
    pub async fn run(
        &self,
        target: &Target,
        lister: &dyn NodeLister,
    ) -> OrchestratorResult<ClusterVerdict> {
        let nodes = match target {
            Target::FullCluster => lister.cluster_nodes().await?,
            Target::Job(job_id) => {
                let nodes = lister.job_nodes(job_id).await?;
                info!(%job_id, count = nodes.len(), "job node set resolved");
                nodes
            }
        };
        self.run_nodes(nodes).await
    }

    /// Run diagnosis over an explicit node set and assemble the verdict.
    pub async fn run_nodes(&self, nodes: Vec<String>) -> OrchestratorResult<ClusterVerdict> {
        let started_at = epoch_secs();
        info!(
            nodes = nodes.len(),
            max_parallel = self.config.max_parallel,
            deadline_secs = self.config.run_deadline.as_secs(),
            "health run starting"
        );

        let (mut results, deadline_hit) = self.fan_out(&nodes).await;

        // Every selected node gets a definitive result: anything still
        // missing at this point ran past the deadline (fail-closed).
        let now = epoch_secs();
        for node in &nodes {
            if !results.contains_key(node) {
                warn!(%node, "diagnosis missed the run deadline");
                results.insert(
                    node.clone(),
                    DiagnosticResult::timed_out(node, started_at, now),
                );
            }
        }

        // Feed every result through the state machine; collect actions.
        let mut actions: HashMap<String, RecoveryAction> = HashMap::new();
        for node in &nodes {
            let result = &results[node];
            let decision = self.recovery.apply(result)?;
            actions.insert(node.clone(), decision.action);
        }

        // Drive the reboots this run decided on.
        let reboot_targets: Vec<String> = nodes
            .iter()
            .filter(|n| actions.get(*n) == Some(&RecoveryAction::Reboot))
            .cloned()
            .collect();
        if !reboot_targets.is_empty() {
            if self.config.enable_reboot {
                self.dispatch_reboots(&reboot_targets).await?;
            } else {
                info!(
                    count = reboot_targets.len(),
                    "reboots disabled by configuration, leaving nodes pending"
                );
            }
        }

        // Assemble the verdict from the final history snapshots.
        let mut reports = Vec::with_capacity(nodes.len());
        for node in &nodes {
            let result = results.remove(node).unwrap_or_else(|| {
                // Unreachable: every node was populated above.
                DiagnosticResult::timed_out(node, started_at, now)
            });
            let history = self
                .recovery
                .history()
                .get(node)?
                .unwrap_or_else(|| RebootRecord::new(node));
            reports.push(NodeReport {
                action: actions[node],
                result,
                history,
            });
        }

        let verdict = ClusterVerdict {
            started_at,
            completed_at: epoch_secs(),
            deadline_hit,
            nodes: reports,
        };
        info!(
            nodes = verdict.nodes.len(),
            failed = verdict.failed_nodes().len(),
            deadline_hit,
            "health run finished"
        );
        Ok(verdict)
    }

    /// Diagnose all nodes concurrently under the parallelism cap.
    ///
    /// Returns the completed results and whether the deadline fired.
    /// Pipelines still in flight at the deadline are aborted; their
    /// nodes simply have no entry in the map.
    async fn fan_out(&self, nodes: &[String]) -> (HashMap<String, DiagnosticResult>, bool) {
        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel));
        let diag_config = Arc::new(DiagConfig {
            health_check_script: self.config.health_check_script.clone(),
            nccl_bw_threshold: self.config.nccl_bw_threshold,
            nccl_multi_bw_threshold: self.config.nccl_multi_bw_threshold,
            check_timeout: self.config.check_timeout,
            peers: nodes.to_vec(),
        });

        let mut tasks = JoinSet::new();
        for node in nodes {
            let node = node.clone();
            let semaphore = semaphore.clone();
            let diag_config = diag_config.clone();
            let executor = self.executor.clone();
            tasks.spawn(async move {
                // Closed only when the whole set is aborted.
                let _permit = semaphore.acquire_owned().await;
                diagnose(&node, &diag_config, executor.as_ref()).await
            });
        }

        let mut results = HashMap::new();
        let deadline = tokio::time::sleep(self.config.run_deadline);
        tokio::pin!(deadline);
        let mut deadline_hit = false;

        loop {
            tokio::select! {
                joined = tasks.join_next() => {
                    match joined {
                        Some(Ok(result)) => {
                            debug!(node = %result.node, passing = result.is_passing(), "pipeline finished");
                            results.insert(result.node.clone(), result);
                        }
                        Some(Err(e)) => {
                            // A panicked pipeline only loses its own node.
                            error!(error = %e, "diagnosis task failed");
                        }
                        None => break,
                    }
                }
                _ = &mut deadline => {
                    warn!(
                        completed = results.len(),
                        total = nodes.len(),
                        "run deadline reached, cancelling remaining pipelines"
                    );
                    tasks.abort_all();
                    deadline_hit = true;
                    break;
                }
            }
        }

        (results, deadline_hit)
    }

    /// Reboot the given nodes and wait for them to come back.
    ///
    /// The ssh connection normally drops when the reboot fires, so a
    /// transport error counts as dispatched. Nodes that return within
    /// the wait window move to post-reboot check; the rest stay
    /// `Rebooting` and the next run picks them up.
    async fn dispatch_reboots(&self, nodes: &[String]) -> OrchestratorResult<()> {
        info!(count = nodes.len(), "dispatching reboots");

        let mut waiters = JoinSet::new();
        let dispatch_timeout = self.config.check_timeout.min(REBOOT_DISPATCH_TIMEOUT);
        for node in nodes {
            // The executor bounds each attempt, but a scripted or hung
            // transport must not stall the whole dispatch phase either.
            let attempt = tokio::time::timeout(
                dispatch_timeout,
                self.executor.execute(node, "sudo reboot", dispatch_timeout),
            )
            .await;
            let dispatched = match attempt {
                Ok(Ok(_)) | Ok(Err(ExecError::Transport { .. })) => true,
                Ok(Err(e)) => {
                    warn!(%node, error = %e, "reboot dispatch failed, node stays pending");
                    false
                }
                Err(_) => {
                    warn!(%node, "reboot dispatch timed out, node stays pending");
                    false
                }
            };
            if !dispatched {
                continue;
            }

            self.recovery.mark_rebooting(node, epoch_secs())?;
            info!(%node, "reboot dispatched");

            let node = node.clone();
            let executor = self.executor.clone();
            let grace = self.config.recheck_interval;
            let wait = self.config.reboot_wait;
            waiters.spawn(async move {
                tokio::time::sleep(grace).await;
                let back = executor
                    .wait_reachable(&node, wait, REACHABILITY_PROBE_INTERVAL)
                    .await;
                (node, back)
            });
        }

        while let Some(joined) = waiters.join_next().await {
            match joined {
                Ok((node, true)) => {
                    self.recovery.mark_post_reboot(&node)?;
                    info!(%node, "node back after reboot, post-reboot check pending");
                }
                Ok((node, false)) => {
                    warn!(%node, "node did not return within the reboot wait");
                }
                Err(e) => error!(error = %e, "reboot waiter failed"),
            }
        }

        Ok(())
    }
}

/// Current Unix epoch in seconds.
fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use gridmedic_remote::{ExecOutput, ExecResult};
    use gridmedic_state::NodeLifecycle;

    use crate::nodes::StaticNodeList;

    /// Scripted executor for orchestrator tests: closure-driven responses,
    /// concurrency accounting, instant "reachability".
    struct ScriptedExecutor {
        script: Box<dyn Fn(&str, &str) -> ExecResult<ExecOutput> + Send + Sync>,
        /// Per-call artificial latency.
        latency: Duration,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        reboots: Mutex<Vec<String>>,
    }

    impl ScriptedExecutor {
        fn new(
            script: impl Fn(&str, &str) -> ExecResult<ExecOutput> + Send + Sync + 'static,
        ) -> Self {
            Self {
                script: Box::new(script),
                latency: Duration::ZERO,
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                reboots: Mutex::new(Vec::new()),
            }
        }

        fn with_latency(mut self, latency: Duration) -> Self {
            self.latency = latency;
            self
        }

        fn max_seen(&self) -> usize {
            self.max_in_flight.load(Ordering::SeqCst)
        }

        fn rebooted(&self) -> Vec<String> {
            self.reboots.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RemoteExecutor for ScriptedExecutor {
        async fn execute(
            &self,
            node: &str,
            command: &str,
            _timeout: Duration,
        ) -> ExecResult<ExecOutput> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if command.contains("sudo reboot") {
                self.reboots.lock().unwrap().push(node.to_string());
                // Connection drops mid-reboot.
                return Err(ExecError::Transport {
                    node: node.to_string(),
                    detail: "connection closed".to_string(),
                });
            }
            (self.script)(node, command)
        }

        async fn transfer(
            &self,
            _node: &str,
            _local_path: &std::path::Path,
            _remote_path: &str,
            _timeout: Duration,
        ) -> ExecResult<()> {
            Ok(())
        }

        async fn wait_reachable(
            &self,
            _node: &str,
            _timeout: Duration,
            _interval: Duration,
        ) -> bool {
            true
        }
    }

    fn ok(stdout: &str) -> ExecResult<ExecOutput> {
        Ok(ExecOutput {
            stdout: stdout.to_string(),
            stderr: String::new(),
        })
    }

    fn eight_gpus() -> String {
        (0..8).map(|i| format!("GPU {i}: NVIDIA A100\n")).collect()
    }

    /// Responses for a healthy GPU node.
    fn healthy_script(_node: &str, command: &str) -> ExecResult<ExecOutput> {
        if command.contains("nvidia-smi") {
            ok(&eight_gpus())
        } else if command.contains("mpirun") {
            ok("4G 1073741824 float sum -1 9000.1 400.00 0")
        } else if command.contains("all_reduce_perf") {
            ok("4G 1073741824 float sum -1 8122.3 512.43 0")
        } else {
            ok("health checks clean\n")
        }
    }

    /// Healthy except the NCCL bandwidth is under the 480 floor.
    fn slow_nccl_script(_node: &str, command: &str) -> ExecResult<ExecOutput> {
        if command.contains("nvidia-smi") {
            ok(&eight_gpus())
        } else if command.contains("mpirun") {
            ok("4G 1073741824 float sum -1 9000.1 400.00 0")
        } else if command.contains("all_reduce_perf") {
            ok("4G 1073741824 float sum -1 8122.3 300.00 0")
        } else {
            ok("health checks clean\n")
        }
    }

    fn test_config() -> Config {
        Config {
            node_count: 2,
            max_parallel: 4,
            run_deadline: Duration::from_secs(10),
            check_timeout: Duration::from_secs(5),
            recheck_interval: Duration::from_millis(1),
            reboot_wait: Duration::from_millis(10),
            ..Config::default()
        }
    }

    fn orchestrator(
        config: Config,
        executor: Arc<ScriptedExecutor>,
    ) -> (Orchestrator, Arc<ScriptedExecutor>) {
        let history = HistoryStore::open_in_memory().unwrap();
        (
            Orchestrator::new(config, executor.clone(), history),
            executor,
        )
    }

    fn nodes(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn healthy_cluster_produces_passing_verdict() {
        let (orch, _) = orchestrator(test_config(), Arc::new(ScriptedExecutor::new(healthy_script)));

        let verdict = orch.run_nodes(nodes(&["gpu-1", "gpu-2"])).await.unwrap();

        assert_eq!(verdict.nodes.len(), 2);
        assert!(verdict.all_passing());
        assert!(!verdict.deadline_hit);
        for report in &verdict.nodes {
            assert_eq!(report.action, RecoveryAction::NoAction);
            assert_eq!(report.history.attempt_count, 0);
        }
    }

    #[tokio::test]
    async fn empty_node_set_succeeds_trivially() {
        let (orch, _) = orchestrator(test_config(), Arc::new(ScriptedExecutor::new(healthy_script)));

        let verdict = orch.run_nodes(Vec::new()).await.unwrap();
        assert!(verdict.nodes.is_empty());
        assert!(verdict.all_passing());
    }

    #[tokio::test]
    async fn job_target_with_null_resolution_runs_empty() {
        let (orch, _) = orchestrator(test_config(), Arc::new(ScriptedExecutor::new(healthy_script)));
        let lister = StaticNodeList::from_inventory("gpu", 4);

        let verdict = orch
            .run(&Target::Job("J123".to_string()), &lister)
            .await
            .unwrap();
        assert!(verdict.nodes.is_empty());
    }

    #[tokio::test]
    async fn idempotent_on_healthy_cluster() {
        let (orch, _) = orchestrator(test_config(), Arc::new(ScriptedExecutor::new(healthy_script)));
        let set = nodes(&["gpu-1", "gpu-2"]);

        let first = orch.run_nodes(set.clone()).await.unwrap();
        let second = orch.run_nodes(set).await.unwrap();

        // Identical content modulo timestamps; no attempt count moved.
        for (a, b) in first.nodes.iter().zip(second.nodes.iter()) {
            assert_eq!(a.result.node, b.result.node);
            assert_eq!(a.action, b.action);
            assert_eq!(a.history, b.history);
            assert_eq!(a.history.attempt_count, 0);
            for (ca, cb) in a.result.checks.iter().zip(b.result.checks.iter()) {
                assert_eq!(ca, cb);
            }
        }
    }

    #[tokio::test]
    async fn failing_node_is_rebooted_and_tracked() {
        let (orch, executor) =
            orchestrator(test_config(), Arc::new(ScriptedExecutor::new(slow_nccl_script)));

        let verdict = orch.run_nodes(nodes(&["gpu-1", "gpu-2"])).await.unwrap();

        assert!(!verdict.all_passing());
        assert_eq!(verdict.failed_nodes().len(), 2);
        for report in &verdict.nodes {
            assert_eq!(report.action, RecoveryAction::Reboot);
            assert_eq!(report.history.attempt_count, 1);
            // Reboot dispatched and the node came back.
            assert_eq!(report.history.lifecycle, NodeLifecycle::PostRebootCheck);
            assert!(report.history.last_reboot_at > 0);
        }
        assert_eq!(executor.rebooted(), vec!["gpu-1", "gpu-2"]);
    }

    #[tokio::test]
    async fn reboots_disabled_leaves_nodes_pending() {
        let mut config = test_config();
        config.enable_reboot = false;
        let (orch, executor) =
            orchestrator(config, Arc::new(ScriptedExecutor::new(slow_nccl_script)));

        let verdict = orch.run_nodes(nodes(&["gpu-1"])).await.unwrap();

        assert_eq!(verdict.nodes[0].action, RecoveryAction::Reboot);
        assert_eq!(verdict.nodes[0].history.lifecycle, NodeLifecycle::RebootPending);
        assert!(executor.rebooted().is_empty());
    }

    #[tokio::test]
    async fn second_failing_run_quarantines() {
        let (orch, _) =
            orchestrator(test_config(), Arc::new(ScriptedExecutor::new(slow_nccl_script)));

        let first = orch.run_nodes(nodes(&["gpu-017", "gpu-018"])).await.unwrap();
        assert_eq!(first.nodes[0].action, RecoveryAction::Reboot);

        let second = orch.run_nodes(nodes(&["gpu-017", "gpu-018"])).await.unwrap();
        assert_eq!(second.nodes[0].action, RecoveryAction::Quarantine);
        assert_eq!(second.nodes[0].history.lifecycle, NodeLifecycle::Quarantined);
        // Quarantined nodes are still diagnosed for visibility.
        assert_eq!(second.nodes[0].result.checks.len(), 3);
    }

    #[tokio::test]
    async fn concurrency_stays_under_the_cap() {
        let mut config = test_config();
        config.max_parallel = 2;
        let executor = Arc::new(
            ScriptedExecutor::new(healthy_script).with_latency(Duration::from_millis(5)),
        );
        let (orch, executor) = orchestrator(config, executor);

        orch.run_nodes(nodes(&["gpu-1", "gpu-2", "gpu-3", "gpu-4", "gpu-5", "gpu-6"]))
            .await
            .unwrap();

        // Each pipeline issues one remote call at a time, so in-flight
        // calls never exceed the pipeline cap.
        assert!(executor.max_seen() <= 2, "saw {}", executor.max_seen());
    }

    /// Executor where one node's remote calls hang forever.
    struct HangingExecutor {
        hung_node: String,
        inner: ScriptedExecutor,
    }

    #[async_trait]
    impl RemoteExecutor for HangingExecutor {
        async fn execute(
            &self,
            node: &str,
            command: &str,
            timeout: Duration,
        ) -> ExecResult<ExecOutput> {
            if node == self.hung_node {
                std::future::pending::<()>().await;
                unreachable!();
            }
            self.inner.execute(node, command, timeout).await
        }

        async fn transfer(
            &self,
            _node: &str,
            _local_path: &std::path::Path,
            _remote_path: &str,
            _timeout: Duration,
        ) -> ExecResult<()> {
            Ok(())
        }

        async fn wait_reachable(
            &self,
            _node: &str,
            _timeout: Duration,
            _interval: Duration,
        ) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn hung_node_times_out_without_delaying_others() {
        let mut config = test_config();
        config.run_deadline = Duration::from_millis(300);
        config.check_timeout = Duration::from_millis(100);

        // gpu-1 carries 2 GPUs, so both NCCL checks skip structurally and
        // its pipeline never touches the hung peer.
        let executor = Arc::new(HangingExecutor {
            hung_node: "gpu-2".to_string(),
            inner: ScriptedExecutor::new(|_node, command| {
                if command.contains("nvidia-smi") {
                    ok("GPU 0: NVIDIA A100\nGPU 1: NVIDIA A100\n")
                } else {
                    ok("health checks clean\n")
                }
            }),
        });
        let history = HistoryStore::open_in_memory().unwrap();
        let orch = Orchestrator::new(config, executor, history);

        let verdict = orch.run_nodes(nodes(&["gpu-1", "gpu-2"])).await.unwrap();

        assert!(verdict.deadline_hit);
        assert_eq!(verdict.nodes.len(), 2);

        let gpu1 = &verdict.nodes[0];
        assert_eq!(gpu1.result.node, "gpu-1");
        assert!(gpu1.result.is_passing());

        let gpu2 = &verdict.nodes[1];
        assert_eq!(gpu2.result.node, "gpu-2");
        assert!(!gpu2.result.is_passing());
        assert!(gpu2.result.is_unreachable());
        // Fail-closed: the timeout consumed a reboot attempt, and the
        // reboot could not be dispatched to a hung node.
        assert_eq!(gpu2.action, RecoveryAction::Reboot);
        assert_eq!(gpu2.history.lifecycle, NodeLifecycle::RebootPending);
    }

    #[tokio::test]
    async fn zero_reboot_budget_quarantines_on_first_failure() {
        let mut config = test_config();
        config.max_reboot_count = 0;
        let (orch, executor) =
            orchestrator(config, Arc::new(ScriptedExecutor::new(slow_nccl_script)));

        let verdict = orch.run_nodes(nodes(&["gpu-1", "gpu-2"])).await.unwrap();

        for report in &verdict.nodes {
            assert_eq!(report.action, RecoveryAction::Quarantine);
        }
        // No reboot was ever attempted.
        assert!(executor.rebooted().is_empty());
    }

    #[tokio::test]
    async fn full_cluster_target_uses_lister() {
        let (orch, _) = orchestrator(test_config(), Arc::new(ScriptedExecutor::new(healthy_script)));
        let lister = StaticNodeList::from_inventory("gpu", 3);

        let verdict = orch.run(&Target::FullCluster, &lister).await.unwrap();
        let names: Vec<&str> = verdict.nodes.iter().map(|n| n.result.node.as_str()).collect();
        assert_eq!(names, vec!["gpu-1", "gpu-2", "gpu-3"]);
    }
}
