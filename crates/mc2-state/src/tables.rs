//! redb table definitions for the controller store.
//!
//! Values are JSON-serialized domain types.

use redb::TableDefinition;

/// Controller records keyed by controller id.
pub const CONTROLLERS: TableDefinition<&str, &[u8]> = TableDefinition::new("controllers");

/// App id reservations: `{app_id}` → controller id. Never released, so a
/// deleted controller's app id can't be handed out again.
pub const APP_IDS: TableDefinition<&str, &str> = TableDefinition::new("app_ids");
