//! Core type definitions for ScatterFS
//!
//! Hosts and chunks are plain integers; a file system object is identified
//! by its absolute path, there is no inode number.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one participating node, `0..host_count`
pub type HostId = u32;

/// Index of a fixed-size chunk within a file's content, 0-based
pub type ChunkId = u64;

/// Seconds since the Unix epoch
pub type Timestamp = i64;

/// Path separator used in metadata keys
pub const PATH_SEPARATOR: char = '/';

/// The root directory path
pub const ROOT_PATH: &str = "/";

/// Default chunk size (512 KiB)
pub const DEFAULT_CHUNK_SIZE: u64 = 512 * 1024;

/// Kind of object an open descriptor or directory entry refers to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileType {
    File,
    Directory,
}

impl FileType {
    /// File type encoded in a `st_mode` value
    #[must_use]
    pub const fn from_mode(mode: u32) -> Self {
        if mode & libc::S_IFMT as u32 == libc::S_IFDIR as u32 {
            Self::Directory
        } else {
            Self::File
        }
    }

    #[must_use]
    pub const fn is_dir(self) -> bool {
        matches!(self, Self::Directory)
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::Directory => write!(f, "dir"),
        }
    }
}

/// Short directory listing entry: `(name, is_directory)`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dirent {
    pub name: String,
    pub is_dir: bool,
}

/// Extended directory listing entry: `(name, is_directory, size, mtime)`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirentExtended {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
    pub mtime: Timestamp,
}

/// Chunk space statistics of one host
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkStat {
    /// Configured chunk size in bytes
    pub chunk_size: u64,
    /// Chunks that fit on the backing file system
    pub chunk_total: u64,
    /// Chunks that still fit into the free space
    pub chunk_free: u64,
}

impl ChunkStat {
    /// Sum the statistics of several hosts
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        Self {
            chunk_size: self.chunk_size.max(other.chunk_size),
            chunk_total: self.chunk_total + other.chunk_total,
            chunk_free: self.chunk_free + other.chunk_free,
        }
    }
}

/// Current wall clock time in seconds
#[must_use]
pub fn now_secs() -> Timestamp {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as Timestamp)
        .unwrap_or_default()
}

/// Check that `path` is absolute and normalized (no trailing separator
/// except for the root itself).
#[must_use]
pub fn is_valid_path(path: &str) -> bool {
    path == ROOT_PATH
        || (path.starts_with(PATH_SEPARATOR)
            && !path.ends_with(PATH_SEPARATOR)
            && !path.contains("//"))
}

/// Parent directory of an absolute path
#[must_use]
pub fn parent_path(path: &str) -> Option<&str> {
    if path == ROOT_PATH {
        return None;
    }
    match path.rfind(PATH_SEPARATOR) {
        Some(0) => Some(ROOT_PATH),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}
