//! The remote execution capability and its error taxonomy.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Output of a successfully-executed remote command (exit status 0).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Errors surfaced by a remote execution attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecError {
    /// The node could not be reached: connect refused, DNS failure,
    /// connection timeout. Retried inside the executor, then surfaced.
    #[error("transport error on {node}: {detail}")]
    Transport { node: String, detail: String },

    /// Credentials rejected. Never retried.
    #[error("authentication failed on {node}: {detail}")]
    Auth { node: String, detail: String },

    /// The remote command ran and exited non-zero. Never retried.
    #[error("remote command on {node} exited {exit_code}: {stderr}")]
    RemoteFailure {
        node: String,
        exit_code: i32,
        stderr: String,
    },

    /// A zero timeout was requested. Rejected before any attempt.
    #[error("timeout must be positive")]
    InvalidTimeout,
}

impl ExecError {
    /// Whether the executor may retry this error.
    pub fn is_transient(&self) -> bool {
        matches!(self, ExecError::Transport { .. })
    }
}

pub type ExecResult<T> = Result<T, ExecError>;

/// Capability for running commands and pushing files on cluster nodes.
///
/// Implementations must not leave partial state on the calling side: a
/// failed `transfer` must report an error, never an implicit success.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Run `command` on `node`, bounded by `timeout` per attempt.
    async fn execute(&self, node: &str, command: &str, timeout: Duration)
    -> ExecResult<ExecOutput>;

    /// Copy `local_path` to `remote_path` on `node`.
    async fn transfer(
        &self,
        node: &str,
        local_path: &Path,
        remote_path: &str,
        timeout: Duration,
    ) -> ExecResult<()>;

    /// Wait until the node accepts connections again, polling every
    /// `interval` until `timeout` elapses. Used after a reboot dispatch.
    async fn wait_reachable(&self, node: &str, timeout: Duration, interval: Duration) -> bool {
        crate::ssh::wait_for_reachable(node, timeout, interval).await
    }
}
