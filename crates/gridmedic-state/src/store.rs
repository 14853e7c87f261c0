//! HistoryStore — redb-backed persistence for per-node reboot records.
//!
//! Supports on-disk and in-memory backends (the latter for testing).
//! `update` is the primitive the recovery state machine builds on: a
//! closure applied to the current record inside one write transaction,
//! which makes every per-node decision an atomic read-modify-write.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::REBOOT_HISTORY;
use crate::types::RebootRecord;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe reboot-history store backed by redb.
#[derive(Clone)]
pub struct HistoryStore {
    db: Arc<Database>,
}

impl HistoryStore {
    /// Open (or create) a persistent history store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "history store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory history store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory history store opened");
        Ok(store)
    }

    /// Create the table if it doesn't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(REBOOT_HISTORY).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Get the record for a node, if any.
    pub fn get(&self, node: &str) -> StateResult<Option<RebootRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(REBOOT_HISTORY).map_err(map_err!(Table))?;
        match table.get(node).map_err(map_err!(Read))? {
            Some(guard) => {
                let record: RebootRecord =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Insert or replace a record.
    pub fn put(&self, record: &RebootRecord) -> StateResult<()> {
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(REBOOT_HISTORY).map_err(map_err!(Table))?;
            table
                .insert(record.node.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Atomically read-modify-write a node's record.
    ///
    /// The closure receives the stored record (or a fresh one for an
    /// unknown node) and mutates it in place; the result is committed in
    /// the same write transaction. Concurrent updates of the same node
    /// serialize on redb's exclusive writer — the second caller blocks
    /// until the first commit, then observes it.
    pub fn update<F>(&self, node: &str, mutate: F) -> StateResult<RebootRecord>
    where
        F: FnOnce(&mut RebootRecord),
    {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let record = {
            let mut table = txn.open_table(REBOOT_HISTORY).map_err(map_err!(Table))?;
            let mut record = match table.get(node).map_err(map_err!(Read))? {
                Some(guard) => {
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?
                }
                None => RebootRecord::new(node),
            };
            mutate(&mut record);
            let value = serde_json::to_vec(&record).map_err(map_err!(Serialize))?;
            table
                .insert(node, value.as_slice())
                .map_err(map_err!(Write))?;
            record
        };
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(record)
    }

    /// List all records, sorted by node key.
    pub fn list(&self) -> StateResult<Vec<RebootRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(REBOOT_HISTORY).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let record: RebootRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(record);
        }
        Ok(results)
    }

    /// Remove a node's record (operator clear). Returns true if it existed.
    pub fn clear(&self, node: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(REBOOT_HISTORY).map_err(map_err!(Table))?;
            existed = table.remove(node).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%node, existed, "reboot record cleared");
        Ok(existed)
    }
}
