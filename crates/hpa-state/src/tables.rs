//! redb table definitions for the autoscaler store.
//!
//! Each table uses `&str` keys (`{namespace}/{name}`) and `&[u8]` values
//! (JSON-serialized domain types).

use redb::TableDefinition;

/// Autoscaler specs keyed by `{namespace}/{name}`.
pub const AUTOSCALERS: TableDefinition<&str, &[u8]> = TableDefinition::new("autoscalers");

/// Autoscaler status keyed by `{namespace}/{name}`.
pub const STATUSES: TableDefinition<&str, &[u8]> = TableDefinition::new("statuses");
