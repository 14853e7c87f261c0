//! redb table definitions for the reboot-history store.
//!
//! A single table: `&str` node hostname keys, `&[u8]` JSON-serialized
//! [`crate::RebootRecord`] values.

use redb::TableDefinition;

/// Reboot records keyed by node hostname.
pub const REBOOT_HISTORY: TableDefinition<&str, &[u8]> = TableDefinition::new("reboot_history");
