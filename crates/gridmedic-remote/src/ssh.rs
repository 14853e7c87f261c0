//! SSH/SCP-backed implementation of [`RemoteExecutor`].
//!
//! Shells out to the system `ssh`/`scp` binaries via `tokio::process`,
//! with per-attempt timeouts and transport-only retry with doubling
//! backoff. Host keys are not checked — nodes are reimaged and rebooted
//! routinely, so keys churn.

use std::path::Path;
use std::process::Output;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::executor::{ExecError, ExecOutput, ExecResult, RemoteExecutor};

const SSH_OPTS: [&str; 6] = [
    "-o",
    "StrictHostKeyChecking=no",
    "-o",
    "UserKnownHostsFile=/dev/null",
    "-o",
    "BatchMode=yes",
];

/// stderr fragments that identify an authentication failure. Checked
/// before the exit code: ssh reports both auth and transport failures
/// with exit 255.
const AUTH_MARKERS: [&str; 3] = [
    "Permission denied",
    "Authentication failed",
    "Too many authentication failures",
];

/// stderr fragments that identify a transport failure from scp, which
/// does not reserve an exit code for them.
const TRANSPORT_MARKERS: [&str; 5] = [
    "Connection refused",
    "Connection timed out",
    "Could not resolve hostname",
    "No route to host",
    "Connection closed by remote host",
];

/// Production remote executor: `ssh`/`scp` subprocesses.
#[derive(Debug, Clone)]
pub struct SshExecutor {
    /// Attempts per call (first try included). Only transport errors
    /// consume extra attempts.
    max_attempts: u32,
    /// Backoff before the second attempt; doubles per retry.
    backoff: Duration,
}

impl Default for SshExecutor {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(5),
        }
    }
}

impl SshExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the retry policy (mainly for tests and the reboot path,
    /// where retrying against a node that is going down is pointless).
    pub fn with_retry(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    async fn run_once(
        &self,
        node: &str,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> ExecResult<ExecOutput> {
        let mut cmd = tokio::process::Command::new(program);
        cmd.args(args).kill_on_drop(true);

        let output = match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ExecError::Transport {
                    node: node.to_string(),
                    detail: format!("failed to spawn {program}: {e}"),
                });
            }
            Err(_) => {
                return Err(ExecError::Transport {
                    node: node.to_string(),
                    detail: format!("{program} timed out after {}s", timeout.as_secs()),
                });
            }
        };

        classify_output(node, &output)
    }

    async fn run_with_retry(
        &self,
        node: &str,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> ExecResult<ExecOutput> {
        if timeout.is_zero() {
            return Err(ExecError::InvalidTimeout);
        }

        let mut backoff = self.backoff;
        let mut attempt = 1;
        loop {
            match self.run_once(node, program, args, timeout).await {
                Ok(output) => return Ok(output),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    warn!(
                        %node,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn execute(
        &self,
        node: &str,
        command: &str,
        timeout: Duration,
    ) -> ExecResult<ExecOutput> {
        let mut args: Vec<String> = SSH_OPTS.iter().map(|s| s.to_string()).collect();
        args.push(node.to_string());
        args.push(command.to_string());

        debug!(%node, %command, "ssh execute");
        self.run_with_retry(node, "ssh", &args, timeout).await
    }

    async fn transfer(
        &self,
        node: &str,
        local_path: &Path,
        remote_path: &str,
        timeout: Duration,
    ) -> ExecResult<()> {
        let mut args: Vec<String> = SSH_OPTS.iter().map(|s| s.to_string()).collect();
        args.push(local_path.display().to_string());
        args.push(format!("{node}:{remote_path}"));

        debug!(%node, local = %local_path.display(), %remote_path, "scp transfer");
        self.run_with_retry(node, "scp", &args, timeout).await?;
        Ok(())
    }
}

/// Map a finished subprocess into the error taxonomy.
fn classify_output(node: &str, output: &Output) -> ExecResult<ExecOutput> {
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if output.status.success() {
        return Ok(ExecOutput { stdout, stderr });
    }

    if AUTH_MARKERS.iter().any(|m| stderr.contains(m)) {
        return Err(ExecError::Auth {
            node: node.to_string(),
            detail: first_line(&stderr),
        });
    }

    let exit_code = output.status.code().unwrap_or(-1);

    // ssh reserves 255 for its own (transport) failures; everything else
    // is the remote command's exit status. scp signals transport trouble
    // only through stderr.
    if exit_code == 255 || TRANSPORT_MARKERS.iter().any(|m| stderr.contains(m)) {
        return Err(ExecError::Transport {
            node: node.to_string(),
            detail: first_line(&stderr),
        });
    }

    Err(ExecError::RemoteFailure {
        node: node.to_string(),
        exit_code,
        stderr: first_line(&stderr),
    })
}

fn first_line(s: &str) -> String {
    s.lines().next().unwrap_or("").trim().to_string()
}

/// Wait until TCP port 22 on `node` accepts connections.
///
/// Used after a reboot dispatch to detect the node coming back. Each
/// probe has a short connect timeout; probes repeat every `interval`
/// until `timeout` elapses.
pub async fn wait_for_reachable(node: &str, timeout: Duration, interval: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        let probe = tokio::time::timeout(
            Duration::from_secs(2),
            TcpStream::connect((node, 22u16)),
        )
        .await;

        if matches!(probe, Ok(Ok(_))) {
            info!(%node, "ssh port reachable");
            return true;
        }

        if tokio::time::Instant::now() + interval >= deadline {
            warn!(%node, timeout_secs = timeout.as_secs(), "node did not become reachable");
            return false;
        }
        debug!(%node, "waiting for ssh port");
        tokio::time::sleep(interval).await;
    }
}
