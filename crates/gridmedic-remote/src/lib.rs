//! gridmedic-remote — remote execution for GridMedic.
//!
//! Everything the health manager does to a node goes through the
//! [`RemoteExecutor`] capability: run a command, push a file. The
//! production implementation ([`SshExecutor`]) shells out to `ssh`/`scp`;
//! diagnostics and orchestration are written against the trait so tests
//! inject scripted executors instead of a cluster.
//!
//! # Error taxonomy
//!
//! - `Transport` — the node could not be reached (connect refused, DNS,
//!   timeout). Retried a small fixed number of times with doubling
//!   backoff, then surfaced.
//! - `Auth` — credentials rejected. Never retried; a failing credential
//!   cannot succeed on retry.
//! - `RemoteFailure` — the remote command ran and exited non-zero. A
//!   semantic failure, surfaced as-is.

pub mod executor;
pub mod ssh;

pub use executor::{ExecError, ExecOutput, ExecResult, RemoteExecutor};
pub use ssh::{SshExecutor, wait_for_reachable};
