//! Redb table definitions for persistent metadata storage.

use redb::TableDefinition;

// Key: absolute path, Value: serialized metadata record
pub const METADENTRIES: TableDefinition<&str, &[u8]> = TableDefinition::new("metadentries");
