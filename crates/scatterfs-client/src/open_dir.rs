//! Directory snapshots
//!
//! Opening a directory lists it once, on every host that may hold entries,
//! and keeps the merged result for the lifetime of the handle. Later
//! creates and removes in the directory are not visible through it.

use scatterfs_common::{DirentExtended, FileType, HostId, Timestamp};
use std::collections::BTreeMap;

/// One entry of a directory snapshot
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub file_type: FileType,
    pub size: u64,
    pub mtime: Timestamp,
}

impl From<DirentExtended> for DirEntry {
    fn from(d: DirentExtended) -> Self {
        Self {
            name: d.name,
            file_type: if d.is_dir {
                FileType::Directory
            } else {
                FileType::File
            },
            size: d.size,
            mtime: d.mtime,
        }
    }
}

/// Materialized listing of one directory
#[derive(Clone, Debug, Default)]
pub struct OpenDir {
    entries: Vec<DirEntry>,
    unreachable: Vec<HostId>,
}

impl OpenDir {
    /// Merge per-host listings into one snapshot ordered by name.
    ///
    /// A name reported by several hosts keeps the entry seen last.
    /// `unreachable` lists hosts that could not be asked; a non-empty list
    /// marks the snapshot as partial.
    pub fn from_listings(
        listings: impl IntoIterator<Item = Vec<DirentExtended>>,
        mut unreachable: Vec<HostId>,
    ) -> Self {
        let mut merged = BTreeMap::new();
        for listing in listings {
            for dirent in listing {
                merged.insert(dirent.name.clone(), DirEntry::from(dirent));
            }
        }
        unreachable.sort_unstable();
        Self {
            entries: merged.into_values().collect(),
            unreachable,
        }
    }

    /// Entry at `index`, or `None` past the end
    pub fn getdent(&self, index: usize) -> Option<&DirEntry> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DirEntry> {
        self.entries.iter()
    }

    /// Whether some host did not contribute to the snapshot
    pub fn is_partial(&self) -> bool {
        !self.unreachable.is_empty()
    }

    pub fn unreachable_hosts(&self) -> &[HostId] {
        &self.unreachable
    }
}
