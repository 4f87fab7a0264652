//! redb table definitions for the Muster intent store.
//!
//! The table uses `&str` keys and `&[u8]` values (JSON-serialized
//! domain types).

use redb::TableDefinition;

/// Intent records keyed by `{container_id}`.
pub const INTENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("intents");
