//! Persistent metadata store backed by redb.
//!
//! One table maps absolute paths to serialized records. `merge` runs the
//! configured [`MergeOperator`] inside a single write transaction; redb
//! admits one writer at a time, so folds on a key never interleave and
//! only the folded value is committed.

use crate::kv::KvStore;
use crate::merge::MergeOperator;
use crate::tables;
use redb::{Database, ReadableTable};
use scatterfs_common::{Error, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error};

/// Error type for metadata store operations
#[derive(Debug, thiserror::Error)]
pub enum MetaStoreError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::DatabaseError),
    #[error("redb storage error: {0}")]
    Storage(#[from] redb::StorageError),
    #[error("redb table error: {0}")]
    Table(#[from] redb::TableError),
    #[error("redb transaction error: {0}")]
    Transaction(Box<redb::TransactionError>),
    #[error("redb commit error: {0}")]
    Commit(#[from] redb::CommitError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<redb::TransactionError> for MetaStoreError {
    fn from(e: redb::TransactionError) -> Self {
        Self::Transaction(Box::new(e))
    }
}

impl From<MetaStoreError> for Error {
    fn from(e: MetaStoreError) -> Self {
        match e {
            MetaStoreError::Io(io) => Self::Io(io),
            other => Self::internal(other.to_string()),
        }
    }
}

pub type MetaStoreResult<T> = std::result::Result<T, MetaStoreError>;

/// Persistent metadata store backed by redb.
pub struct MetaStore {
    db: Database,
    operator: Arc<dyn MergeOperator>,
}

impl MetaStore {
    /// Open (or create) the redb database at the given path.
    pub fn open(path: impl AsRef<Path>, operator: Arc<dyn MergeOperator>) -> MetaStoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Create the table eagerly so later read txns don't fail
        let write_txn = db.begin_write()?;
        {
            let _t = write_txn.open_table(tables::METADENTRIES)?;
        }
        write_txn.commit()?;

        debug!(
            "Opened metadata store at {} with {}",
            path.display(),
            operator.name()
        );
        Ok(Self { db, operator })
    }

    fn get_raw(&self, key: &str) -> MetaStoreResult<Option<Vec<u8>>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(tables::METADENTRIES)?;
        Ok(table.get(key)?.map(|v| v.value().to_vec()))
    }

    fn put_raw(&self, key: &str, value: &[u8]) -> MetaStoreResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(tables::METADENTRIES)?;
            table.insert(key, value)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn delete_raw(&self, key: &str) -> MetaStoreResult<Option<Vec<u8>>> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(tables::METADENTRIES)?;
            let removed = table.remove(key)?.map(|v| v.value().to_vec());
            removed
        };
        write_txn.commit()?;
        Ok(removed)
    }

    fn scan_raw(&self, prefix: &str) -> MetaStoreResult<Vec<(String, Vec<u8>)>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(tables::METADENTRIES)?;
        let mut result = Vec::new();
        for entry in table.range(prefix..)? {
            let (key, value) = entry?;
            let key = key.value();
            if !key.starts_with(prefix) {
                break;
            }
            result.push((key.to_string(), value.value().to_vec()));
        }
        Ok(result)
    }
}

impl KvStore for MetaStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.get_raw(key)?)
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        Ok(self.put_raw(key, value)?)
    }

    fn delete(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.delete_raw(key)?)
    }

    fn merge(&self, key: &str, operand: &[u8]) -> Result<Vec<u8>> {
        let write_txn = self.db.begin_write().map_err(MetaStoreError::from)?;
        let merged = {
            let mut table = write_txn
                .open_table(tables::METADENTRIES)
                .map_err(MetaStoreError::from)?;
            let existing = table
                .get(key)
                .map_err(MetaStoreError::from)?
                .map(|v| v.value().to_vec());

            // A failed fold drops the transaction, leaving the stored value untouched
            let merged = self
                .operator
                .full_merge(key, existing.as_deref(), &[operand])
                .inspect_err(|e| error!("Merge on '{}' failed: {}", key, e))?;
            table
                .insert(key, merged.as_slice())
                .map_err(MetaStoreError::from)?;
            merged
        };
        write_txn.commit().map_err(MetaStoreError::from)?;
        Ok(merged)
    }

    fn update_with(
        &self,
        key: &str,
        f: &mut dyn FnMut(&[u8]) -> Result<Vec<u8>>,
    ) -> Result<Vec<u8>> {
        let write_txn = self.db.begin_write().map_err(MetaStoreError::from)?;
        let updated = {
            let mut table = write_txn
                .open_table(tables::METADENTRIES)
                .map_err(MetaStoreError::from)?;
            let current = table
                .get(key)
                .map_err(MetaStoreError::from)?
                .map(|v| v.value().to_vec())
                .ok_or_else(|| Error::not_found(key))?;
            let updated = f(&current)?;
            table
                .insert(key, updated.as_slice())
                .map_err(MetaStoreError::from)?;
            updated
        };
        write_txn.commit().map_err(MetaStoreError::from)?;
        Ok(updated)
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        Ok(self.scan_raw(prefix)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::{MergeOperand, MetadataMergeOperator};
    use scatterfs_common::Metadata;
    use tempfile::tempdir;

    fn open(dir: &Path) -> MetaStore {
        MetaStore::open(dir.join("meta/md.redb"), Arc::new(MetadataMergeOperator)).unwrap()
    }

    #[test]
    fn test_put_get_delete() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());
        store.put("/a", b"value").unwrap();
        assert_eq!(store.get("/a").unwrap().unwrap(), b"value");
        assert!(store.get("/b").unwrap().is_none());
        assert_eq!(store.delete("/a").unwrap().unwrap(), b"value");
        assert!(store.delete("/a").unwrap().is_none());
    }

    #[test]
    fn test_merge_and_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = open(dir.path());
            let create = MergeOperand::Create(Metadata::file(0o644)).encode().unwrap();
            store.merge("/f", &create).unwrap();
            for _ in 0..3 {
                let op = MergeOperand::for_write(100, 0, true).unwrap().encode().unwrap();
                store.merge("/f", &op).unwrap();
            }
        }

        let store = open(dir.path());
        let md = Metadata::deserialize(&store.get("/f").unwrap().unwrap()).unwrap();
        assert_eq!(md.size, 300);
    }

    #[test]
    fn test_corrupt_operand_aborts_fold() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());
        let create = MergeOperand::Create(Metadata::file(0o644)).encode().unwrap();
        let before = store.merge("/f", &create).unwrap();

        let err = store.merge("/f", b"i:nope").unwrap_err();
        assert!(matches!(err, Error::CorruptRecord(_)));
        assert_eq!(store.get("/f").unwrap().unwrap(), before);
    }

    #[test]
    fn test_scan_prefix() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());
        for key in ["/", "/a", "/a/x", "/a/y", "/b"] {
            store.put(key, b"").unwrap();
        }
        let keys: Vec<String> = store
            .scan_prefix("/a/")
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["/a/x", "/a/y"]);
        assert_eq!(store.scan_prefix("/").unwrap().len(), 5);
    }
}
