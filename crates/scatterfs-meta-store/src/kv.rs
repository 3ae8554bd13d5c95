//! Key-value capability used by the metadentry service

use crate::merge::MergeOperator;
use parking_lot::Mutex;
use scatterfs_common::{Error, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Ordered key-value store with a pluggable merge fold.
///
/// Folds for one key are serialized by the store. Only folded values are
/// ever persisted; operands are never stored on their own.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    fn put(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Remove a key. Returns the value it held, if any.
    fn delete(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Fold `operand` onto the current value of `key` and return the new value
    fn merge(&self, key: &str, operand: &[u8]) -> Result<Vec<u8>>;

    /// Replace the value of an existing key with `f(current)` and return the
    /// new value. Other writers to the key wait until the rewrite is stored.
    ///
    /// Fails with `NotFound` if the key has no value. An error from `f`
    /// leaves the stored value untouched.
    fn update_with(
        &self,
        key: &str,
        f: &mut dyn FnMut(&[u8]) -> Result<Vec<u8>>,
    ) -> Result<Vec<u8>>;

    /// All entries whose key starts with `prefix`, in key order
    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>>;

    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }
}

/// In-memory store, for tests and throwaway nodes
pub struct MemoryKv {
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
    operator: Arc<dyn MergeOperator>,
}

impl MemoryKv {
    pub fn new(operator: Arc<dyn MergeOperator>) -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            operator,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl KvStore for MemoryKv {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entries.lock().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.lock().remove(key))
    }

    fn merge(&self, key: &str, operand: &[u8]) -> Result<Vec<u8>> {
        let mut entries = self.entries.lock();
        let merged = self
            .operator
            .full_merge(key, entries.get(key).map(Vec::as_slice), &[operand])?;
        entries.insert(key.to_string(), merged.clone());
        Ok(merged)
    }

    fn update_with(
        &self,
        key: &str,
        f: &mut dyn FnMut(&[u8]) -> Result<Vec<u8>>,
    ) -> Result<Vec<u8>> {
        let mut entries = self.entries.lock();
        let current = entries.get_mut(key).ok_or_else(|| Error::not_found(key))?;
        let updated = f(current.as_slice())?;
        current.clone_from(&updated);
        Ok(updated)
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        Ok(self
            .entries
            .lock()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}
