//! gridmedic-ghr — Global Health Reporting submission.
//!
//! Consumes a [`ClusterVerdict`](gridmedic_orchestrator::ClusterVerdict)
//! and, when failed nodes exist, submits a batch report to the GHR
//! endpoint. Submission is gated:
//!
//! - disabled entirely by configuration (`ENABLE_GHR=false`),
//! - skipped when a successful submission is recorded within the
//!   configured window (default 24h),
//! - trimmed to at most `GHR_MAX_NODES` failed nodes per batch.
//!
//! Every attempt — success or failure — is appended to an NDJSON
//! submission log, which is also what the recent-success gate reads.

pub mod client;
pub mod codes;
pub mod controller;
pub mod log;
pub mod payload;

pub use client::{GhrClient, HttpGhrClient};
pub use codes::classification_for;
pub use controller::{GhrOutcome, run_ghr_if_needed};
pub use log::SubmissionLog;
pub use payload::{FailedNode, build_payload, failed_entries};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GhrError {
    #[error("submission log error: {0}")]
    Io(#[from] std::io::Error),

    #[error("payload serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid GHR endpoint {0:?}")]
    Endpoint(String),

    #[error("submission failed: {0}")]
    Submit(String),
}

pub type GhrResult<T> = Result<T, GhrError>;
