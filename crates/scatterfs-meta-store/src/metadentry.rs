//! Metadentry service
//!
//! Host-local metadata operations. Every call here acts on the records this
//! host owns; routing a request to the right host and fanning directory
//! listings out over all hosts happens above this layer.

use crate::kv::KvStore;
use crate::merge::MergeOperand;
use scatterfs_common::{
    Dirent, DirentExtended, Error, FieldMask, Metadata, PATH_SEPARATOR, ROOT_PATH, Result,
    now_secs,
};
use std::sync::Arc;
use tracing::{debug, trace};

/// Metadata operations over a [`KvStore`]
#[derive(Clone)]
pub struct MetadentryService {
    kv: Arc<dyn KvStore>,
}

impl MetadentryService {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Create a record for `path`, stamping all three timestamps.
    ///
    /// Fails with `AlreadyExists` if the path already has a record.
    pub fn create(&self, path: &str, mut metadata: Metadata) -> Result<()> {
        if self.kv.exists(path)? {
            return Err(Error::AlreadyExists(path.to_string()));
        }
        metadata.init_times();
        self.kv
            .merge(path, &MergeOperand::Create(metadata).encode()?)?;
        debug!(path, "Created metadentry");
        Ok(())
    }

    /// Install `/` if this host has no record for it yet
    pub fn ensure_root(&self, perm: u32) -> Result<()> {
        if self.kv.exists(ROOT_PATH)? {
            return Ok(());
        }
        let mut root = Metadata::directory(perm);
        root.init_times();
        self.kv
            .merge(ROOT_PATH, &MergeOperand::Create(root).encode()?)?;
        Ok(())
    }

    pub fn exists(&self, path: &str) -> Result<bool> {
        self.kv.exists(path)
    }

    pub fn get(&self, path: &str) -> Result<Metadata> {
        let bytes = self.kv.get(path)?.ok_or_else(|| Error::not_found(path))?;
        Metadata::deserialize(&bytes)
    }

    pub fn get_size(&self, path: &str) -> Result<u64> {
        Ok(self.get(path)?.size)
    }

    /// Overwrite the fields selected by `mask` and return the new record.
    ///
    /// `ctime` is refreshed unless the mask sets it explicitly.
    pub fn update(&self, path: &str, metadata: &Metadata, mask: FieldMask) -> Result<Metadata> {
        let updated = self.kv.update_with(path, &mut |bytes| {
            let mut current = Metadata::deserialize(bytes)?;
            current.apply(metadata, mask);
            if !mask.contains(FieldMask::CTIME) {
                current.ctime = now_secs();
            }
            current.serialize()
        })?;
        trace!(path, ?mask, "Updated metadentry");
        Metadata::deserialize(&updated)
    }

    /// Account a write of `io_size` bytes at `offset` and return the size
    /// after the fold.
    pub fn update_size(&self, path: &str, io_size: u64, offset: u64, append: bool) -> Result<u64> {
        let operand = MergeOperand::for_write(io_size, offset, append)?;
        let folded = self.kv.merge(path, &operand.encode()?)?;
        let size = Metadata::deserialize(&folded)?.size;
        trace!(path, io_size, offset, append, size, "Updated size");
        Ok(size)
    }

    /// Lower the size to at most `size` and return the size after the fold
    pub fn decrease_size(&self, path: &str, size: u64) -> Result<u64> {
        if !self.kv.exists(path)? {
            return Err(Error::not_found(path));
        }
        let folded = self
            .kv
            .merge(path, &MergeOperand::DecreaseSize { size }.encode()?)?;
        Ok(Metadata::deserialize(&folded)?.size)
    }

    /// Delete the record of `path` and return it.
    ///
    /// Chunk data is not touched.
    pub fn remove(&self, path: &str) -> Result<Metadata> {
        let bytes = self.kv.delete(path)?.ok_or_else(|| Error::not_found(path))?;
        debug!(path, "Removed metadentry");
        Metadata::deserialize(&bytes)
    }

    /// Immediate children of `dir` held by this host
    pub fn get_dirents(&self, dir: &str) -> Result<Vec<Dirent>> {
        Ok(self
            .children(dir)?
            .into_iter()
            .map(|(name, md)| Dirent {
                name,
                is_dir: md.is_dir(),
            })
            .collect())
    }

    /// Immediate children of `dir` with size and modification time
    pub fn get_dirents_extended(&self, dir: &str) -> Result<Vec<DirentExtended>> {
        Ok(self
            .children(dir)?
            .into_iter()
            .map(|(name, md)| DirentExtended {
                name,
                is_dir: md.is_dir(),
                size: md.size,
                mtime: md.mtime,
            })
            .collect())
    }

    /// Whether this host holds any child of `dir`
    pub fn has_children(&self, dir: &str) -> Result<bool> {
        Ok(!self.children(dir)?.is_empty())
    }

    fn children(&self, dir: &str) -> Result<Vec<(String, Metadata)>> {
        let prefix = dir_prefix(dir);
        let mut entries = Vec::new();
        for (key, value) in self.kv.scan_prefix(&prefix)? {
            let name = &key[prefix.len()..];
            // skip the directory itself and anything nested deeper
            if name.is_empty() || name.contains(PATH_SEPARATOR) {
                continue;
            }
            entries.push((name.to_string(), Metadata::deserialize(&value)?));
        }
        Ok(entries)
    }
}

/// Key prefix shared by all entries below `dir`
fn dir_prefix(dir: &str) -> String {
    if dir.ends_with(PATH_SEPARATOR) {
        dir.to_string()
    } else {
        format!("{dir}{PATH_SEPARATOR}")
    }
}
