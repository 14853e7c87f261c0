//! gridmedic-diag — per-node diagnostics for GridMedic.
//!
//! For one node, runs the ordered check pipeline over the remote
//! execution capability and produces an immutable [`DiagnosticResult`]:
//!
//! 1. Hardware health check (NHC) — pass/fail from the node health
//!    check tooling, with `NHC****` error codes extracted from its log.
//! 2. Single-node NCCL bandwidth, against `NCCL_BW_THRESHOLD`.
//! 3. Multi-node NCCL bandwidth across the run's node set, against
//!    `NCCL_MULTI_BW_THRESHOLD`.
//!
//! A failing check never short-circuits the pipeline — recovery and
//! reports always see the complete picture. Remote transport/auth errors
//! classify the affected check as failing (`Unreachable`/`Unauthorized`);
//! a node is never assumed healthy by default.

pub mod checks;
pub mod result;
pub mod runner;
pub mod threshold;

pub use result::{CheckKind, CheckResult, CheckStatus, DiagnosticResult, FailReason};
pub use runner::{DiagConfig, diagnose};
pub use threshold::{Comparison, evaluate};
