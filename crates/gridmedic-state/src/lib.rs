//! gridmedic-state — persistent reboot history for GridMedic.
//!
//! Backed by [redb](https://docs.rs/redb). The reboot history is the only
//! state that survives across health runs: one [`RebootRecord`] per node,
//! tracking how many automated reboots it has consumed, when the last one
//! happened, and where the node sits in the recovery lifecycle.
//!
//! # Architecture
//!
//! Records are JSON-serialized into redb's `&[u8]` value column, keyed by
//! node hostname. [`HistoryStore::update`] performs the read-modify-write
//! inside a single write transaction; redb write transactions are exclusive,
//! so overlapping runs updating the same node serialize instead of losing
//! writes.
//!
//! The store is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`) and is
//! shared across the orchestrator's concurrent pipelines.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::HistoryStore;
pub use types::{NodeLifecycle, RebootRecord};
