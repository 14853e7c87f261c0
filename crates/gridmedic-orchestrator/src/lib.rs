//! gridmedic-orchestrator — the cluster-level run coordinator.
//!
//! Resolves the target node set (full cluster or the nodes of one job),
//! fans out per-node diagnosis concurrently under a semaphore cap, feeds
//! every result through the recovery state machine, dispatches reboots,
//! and assembles the immutable [`ClusterVerdict`].
//!
//! # Architecture
//!
//! ```text
//! Orchestrator::run
//!   ├── NodeLister → target node set
//!   ├── JoinSet + Semaphore(max_parallel)
//!   │     └── diagnose(node) per node        (gridmedic-diag)
//!   ├── run deadline → abort stragglers, record Timeout (fail-closed)
//!   ├── RecoveryEngine::apply per result     (gridmedic-recovery)
//!   ├── reboot dispatch + reachability wait
//!   └── ClusterVerdict (every node exactly once)
//! ```
//!
//! One node hanging never delays the others; its pipeline is cancelled
//! at the deadline and recorded as a definitive `Timeout` failure.

pub mod error;
pub mod nodes;
pub mod orchestrator;
pub mod verdict;

pub use error::{OrchestratorError, OrchestratorResult};
pub use nodes::{NodeLister, StaticNodeList, Target, parse_node_list};
pub use orchestrator::Orchestrator;
pub use verdict::{ClusterVerdict, NodeReport};
