//! redb table definitions for the persistent counter store.

use redb::TableDefinition;

/// All entries keyed by their full store key; values are JSON envelopes
/// carrying the raw value and its expiry.
pub const ENTRIES: TableDefinition<&str, &[u8]> = TableDefinition::new("entries");
