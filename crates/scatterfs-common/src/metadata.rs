//! Metadata record
//!
//! One record per path. The absolute path is both the identity of the
//! object and its key in the metadata store, so it is not repeated inside
//! the record.
//!
//! # Wire format
//!
//! The record is encoded with bincode's fixed-width little-endian layout,
//! fields in declaration order, no delimiters:
//!
//! ```text
//! atime:i64 | mtime:i64 | ctime:i64 | uid:u32 | gid:u32 | mode:u32 |
//! link_count:u64 | size:u64 | blocks:i64                      (60 bytes)
//! ```
//!
//! The field order is part of the format and must not change.

use crate::error::{Error, Result};
use crate::types::{FileType, Timestamp, now_secs};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Attribute record of one file system object
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Last access time
    pub atime: Timestamp,
    /// Last content modification time
    pub mtime: Timestamp,
    /// Last attribute change time
    pub ctime: Timestamp,
    /// Owning user
    pub uid: u32,
    /// Owning group
    pub gid: u32,
    /// Permission and file type bits (`st_mode`)
    pub mode: u32,
    /// Number of hard links
    pub link_count: u64,
    /// Logical size in bytes, authoritative
    pub size: u64,
    /// Allocated blocks, approximate
    pub blocks: i64,
}

bitflags! {
    /// Selects which fields of a record an update overwrites
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct FieldMask: u16 {
        const ATIME = 1 << 0;
        const MTIME = 1 << 1;
        const CTIME = 1 << 2;
        const UID = 1 << 3;
        const GID = 1 << 4;
        const MODE = 1 << 5;
        const LINK_COUNT = 1 << 6;
        const SIZE = 1 << 7;
        const BLOCKS = 1 << 8;
    }
}

impl Metadata {
    /// Encoded size of a record
    pub const SERIALIZED_SIZE: usize = 60;

    /// New record with the given mode and one link
    #[must_use]
    pub fn new(mode: u32) -> Self {
        Self {
            mode,
            link_count: 1,
            ..Self::default()
        }
    }

    /// New directory record
    #[must_use]
    pub fn directory(perm: u32) -> Self {
        Self::new(libc::S_IFDIR as u32 | (perm & 0o7777))
    }

    /// New regular file record
    #[must_use]
    pub fn file(perm: u32) -> Self {
        Self::new(libc::S_IFREG as u32 | (perm & 0o7777))
    }

    #[must_use]
    pub const fn file_type(&self) -> FileType {
        FileType::from_mode(self.mode)
    }

    #[must_use]
    pub const fn is_dir(&self) -> bool {
        self.file_type().is_dir()
    }

    /// Stamp access, modify and change times with the current time
    pub fn init_times(&mut self) {
        let now = now_secs();
        self.atime = now;
        self.mtime = now;
        self.ctime = now;
    }

    /// Encode to the wire form
    pub fn serialize(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode from the wire form
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::SERIALIZED_SIZE {
            return Err(Error::corrupt(format!(
                "metadata record has {} bytes, expected {}",
                bytes.len(),
                Self::SERIALIZED_SIZE
            )));
        }
        bincode::deserialize(bytes).map_err(|e| Error::corrupt(e.to_string()))
    }

    /// Copy the fields selected by `mask` from `other`
    pub fn apply(&mut self, other: &Self, mask: FieldMask) {
        if mask.contains(FieldMask::ATIME) {
            self.atime = other.atime;
        }
        if mask.contains(FieldMask::MTIME) {
            self.mtime = other.mtime;
        }
        if mask.contains(FieldMask::CTIME) {
            self.ctime = other.ctime;
        }
        if mask.contains(FieldMask::UID) {
            self.uid = other.uid;
        }
        if mask.contains(FieldMask::GID) {
            self.gid = other.gid;
        }
        if mask.contains(FieldMask::MODE) {
            self.mode = other.mode;
        }
        if mask.contains(FieldMask::LINK_COUNT) {
            self.link_count = other.link_count;
        }
        if mask.contains(FieldMask::SIZE) {
            self.size = other.size;
        }
        if mask.contains(FieldMask::BLOCKS) {
            self.blocks = other.blocks;
        }
    }
}
