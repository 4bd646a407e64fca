//! redb table definitions shared by storage modules.

use redb::TableDefinition;

/// Canonical item rows (`Item`, bincode-encoded), keyed by item id.
pub const ITEMS: TableDefinition<&str, &[u8]> = TableDefinition::new("items");

/// Per-owner recency index ordered by owner, reverse-millis, then id.
pub const ITEMS_BY_CREATED: TableDefinition<(&str, u64, &str), ()> =
    TableDefinition::new("items_by_created");

/// Folder rows (`Folder`, bincode-encoded), keyed by owner then name.
pub const FOLDERS: TableDefinition<(&str, &str), &[u8]> = TableDefinition::new("folders");
