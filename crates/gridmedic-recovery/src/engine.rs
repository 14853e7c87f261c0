//! The recovery engine — drives lifecycle transitions per node.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use gridmedic_diag::DiagnosticResult;
use gridmedic_state::{HistoryStore, NodeLifecycle, RebootRecord, StateResult};

/// Automated action decided for a node after one diagnosis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    NoAction,
    Reboot,
    Quarantine,
}

/// Outcome of feeding one diagnosis through the state machine.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub action: RecoveryAction,
    /// The node's record after the transition.
    pub record: RebootRecord,
}

/// The recovery state machine over the persisted history store.
#[derive(Clone)]
pub struct RecoveryEngine {
    history: HistoryStore,
    max_reboot_count: u32,
}

impl RecoveryEngine {
    pub fn new(history: HistoryStore, max_reboot_count: u32) -> Self {
        Self {
            history,
            max_reboot_count,
        }
    }

    /// The underlying history store.
    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// Apply one diagnosis to the node's history and decide the action.
    ///
    /// The transition runs inside the store's read-modify-write, so two
    /// overlapping runs on the same node serialize here.
    pub fn apply(&self, result: &DiagnosticResult) -> StateResult<Decision> {
        let passing = result.is_passing();
        let max = self.max_reboot_count;
        let mut action = RecoveryAction::NoAction;

        let record = self.history.update(&result.node, |r| {
            action = transition(r, passing, max);
        })?;

        match action {
            RecoveryAction::NoAction => {
                info!(node = %record.node, lifecycle = ?record.lifecycle, "no recovery action")
            }
            RecoveryAction::Reboot => info!(
                node = %record.node,
                attempt = record.attempt_count,
                max_reboot_count = max,
                "reboot scheduled"
            ),
            RecoveryAction::Quarantine => warn!(
                node = %record.node,
                attempts = record.attempt_count,
                "node quarantined — reboot budget exhausted"
            ),
        }

        Ok(Decision { action, record })
    }

    /// Record that the reboot for a pending node was actually dispatched.
    pub fn mark_rebooting(&self, node: &str, now: u64) -> StateResult<RebootRecord> {
        self.history.update(node, |r| {
            if r.lifecycle == NodeLifecycle::RebootPending {
                r.lifecycle = NodeLifecycle::Rebooting;
                r.last_reboot_at = now;
            }
        })
    }

    /// Record that a rebooted node is reachable again; the next diagnosis
    /// is its post-reboot check.
    pub fn mark_post_reboot(&self, node: &str) -> StateResult<RebootRecord> {
        self.history.update(node, |r| {
            if r.lifecycle == NodeLifecycle::Rebooting {
                r.lifecycle = NodeLifecycle::PostRebootCheck;
            }
        })
    }

    /// Operator clear: drop the node's record entirely, ending a
    /// quarantine. Returns true if a record existed.
    pub fn clear(&self, node: &str) -> StateResult<bool> {
        self.history.clear(node)
    }
}

/// The transition table. Mutates the record in place and returns the
/// action to emit.
fn transition(r: &mut RebootRecord, passing: bool, max: u32) -> RecoveryAction {
    // Quarantined is absorbing: no automated action either way, but a
    // fresh failure still reports as Quarantine (never Reboot).
    if r.lifecycle == NodeLifecycle::Quarantined {
        return if passing {
            RecoveryAction::NoAction
        } else {
            RecoveryAction::Quarantine
        };
    }

    if passing {
        // Only a pass that confirms a reboot worked releases the budget.
        if r.lifecycle == NodeLifecycle::PostRebootCheck {
            r.attempt_count = 0;
        }
        r.lifecycle = NodeLifecycle::Healthy;
        return RecoveryAction::NoAction;
    }

    if r.attempt_count < max {
        r.attempt_count += 1;
        r.lifecycle = NodeLifecycle::RebootPending;
        RecoveryAction::Reboot
    } else {
        r.lifecycle = NodeLifecycle::Quarantined;
        RecoveryAction::Quarantine
    }
}
