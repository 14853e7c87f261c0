//! gridmedic-recovery — the per-node recovery state machine.
//!
//! Consumes a node's [`DiagnosticResult`] together with its persisted
//! reboot history and decides the next automated action:
//!
//! ```text
//! Healthy → RebootPending → Rebooting → PostRebootCheck
//!                                          ├── Pass  → Healthy (count reset)
//!                                          └── Fail  → RebootPending | Quarantined
//! ```
//!
//! Attempts are bounded by `max_reboot_count`; once exhausted the node is
//! `Quarantined` — absorbing, diagnosed each run for visibility but never
//! rebooted again until an operator clears its record. Every decision is a
//! single atomic read-modify-write of the node's record, so overlapping
//! runs serialize instead of losing updates.

pub mod engine;

pub use engine::{Decision, RecoveryAction, RecoveryEngine};
