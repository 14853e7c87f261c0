//! Domain types persisted by the reboot-history store.

use serde::{Deserialize, Serialize};

/// Where a node sits in the automated recovery lifecycle.
///
/// `Quarantined` is absorbing: the node keeps being diagnosed for
/// visibility but receives no automated reboots until an operator clears
/// its record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeLifecycle {
    Healthy,
    RebootPending,
    Rebooting,
    PostRebootCheck,
    Quarantined,
}

/// Per-node reboot history. The only state shared across runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebootRecord {
    /// Node hostname.
    pub node: String,
    /// Automated reboot attempts consumed so far.
    pub attempt_count: u32,
    /// Unix timestamp (seconds) of the last reboot dispatch, 0 if never.
    pub last_reboot_at: u64,
    /// Current lifecycle state.
    pub lifecycle: NodeLifecycle,
}

impl RebootRecord {
    /// A fresh record for a node with no history.
    pub fn new(node: &str) -> Self {
        Self {
            node: node.to_string(),
            attempt_count: 0,
            last_reboot_at: 0,
            lifecycle: NodeLifecycle::Healthy,
        }
    }
}
