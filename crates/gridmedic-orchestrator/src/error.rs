//! Orchestrator error types.

use thiserror::Error;

/// Errors that abort a whole run. Per-node failures never surface here —
/// they are captured inside the verdict.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("configuration error: {0}")]
    Config(#[from] gridmedic_config::ConfigError),

    #[error("history store error: {0}")]
    State(#[from] gridmedic_state::StateError),

    #[error("node list resolution failed: {0}")]
    NodeList(#[from] anyhow::Error),
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
