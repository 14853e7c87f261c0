//! The cluster verdict — the run's sole output artifact.

use serde::{Deserialize, Serialize};

use gridmedic_diag::DiagnosticResult;
use gridmedic_recovery::RecoveryAction;
use gridmedic_state::RebootRecord;

/// One node's complete outcome for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeReport {
    pub result: DiagnosticResult,
    pub action: RecoveryAction,
    /// History snapshot after this run's transitions.
    pub history: RebootRecord,
}

/// Immutable aggregate of one run. Handed to reporting, notification,
/// and GHR collaborators; every originally-selected node appears exactly
/// once with a definitive result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterVerdict {
    /// Unix timestamps (seconds) bracketing the run.
    pub started_at: u64,
    pub completed_at: u64,
    /// Whether the run deadline cut diagnosis short.
    pub deadline_hit: bool,
    /// Per-node reports, in target-set order.
    pub nodes: Vec<NodeReport>,
}

impl ClusterVerdict {
    /// `true` when every node passed its full diagnosis.
    pub fn all_passing(&self) -> bool {
        self.nodes.iter().all(|n| n.result.is_passing())
    }

    /// Nodes whose diagnosis failed, in target-set order.
    pub fn failed_nodes(&self) -> Vec<&NodeReport> {
        self.nodes
            .iter()
            .filter(|n| !n.result.is_passing())
            .collect()
    }

    /// Nodes quarantined as of this run.
    pub fn quarantined_nodes(&self) -> Vec<&NodeReport> {
        self.nodes
            .iter()
            .filter(|n| n.action == RecoveryAction::Quarantine)
            .collect()
    }
}
