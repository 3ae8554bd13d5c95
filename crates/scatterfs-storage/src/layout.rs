//! Chunk file layout
//!
//! Layout under the storage root:
//! ```text
//! <root>/
//!   <bucket>/                 two hex digits, xxh64(path) mod 256
//!     <escaped path>/         "/dir/file" -> "dir:file"
//!       0                     chunk files, named by decimal chunk index
//!       1
//!       ...
//! ```
//!
//! The location of a chunk is a pure function of the owning path and the
//! chunk index, so no separate index is kept. Buckets only exist to bound
//! the fan-out of the root directory.

use scatterfs_common::{ChunkId, Error, Result};
use std::path::{Path, PathBuf};
use xxhash_rust::xxh64::xxh64;

/// Number of bucket directories under the root
pub const BUCKET_COUNT: u64 = 256;

/// Maps file system paths to chunk directories and files
#[derive(Debug, Clone)]
pub struct ChunkLayout {
    root: PathBuf,
}

impl ChunkLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Bucket directory name for a path
    #[must_use]
    pub fn bucket(path: &str) -> String {
        format!("{:02x}", xxh64(path.as_bytes(), 0) % BUCKET_COUNT)
    }

    /// Flatten an absolute path into a single directory name.
    ///
    /// `%` and `:` are percent-escaped first so distinct paths never map
    /// to the same name.
    pub fn escape(path: &str) -> Result<String> {
        let relative = path
            .strip_prefix('/')
            .ok_or_else(|| Error::invalid_argument(format!("not an absolute path: {path}")))?;
        if relative.is_empty() {
            return Err(Error::invalid_argument("the root directory has no chunks"));
        }

        let mut escaped = String::with_capacity(relative.len());
        for c in relative.chars() {
            match c {
                '%' => escaped.push_str("%25"),
                ':' => escaped.push_str("%3A"),
                '/' => escaped.push(':'),
                other => escaped.push(other),
            }
        }
        Ok(escaped)
    }

    /// Directory holding all chunks of `path`
    pub fn chunk_dir(&self, path: &str) -> Result<PathBuf> {
        Ok(self.root.join(Self::bucket(path)).join(Self::escape(path)?))
    }

    /// File holding one chunk of `path`
    pub fn chunk_path(&self, path: &str, chunk_id: ChunkId) -> Result<PathBuf> {
        Ok(self.chunk_dir(path)?.join(chunk_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_path_shape() {
        let layout = ChunkLayout::new("/srv/chunks");
        let p = layout.chunk_path("/dir/file", 12).unwrap();
        let bucket = ChunkLayout::bucket("/dir/file");
        assert_eq!(bucket.len(), 2);
        assert_eq!(
            p,
            PathBuf::from(format!("/srv/chunks/{bucket}/dir:file/12"))
        );
    }

    #[test]
    fn test_bucket_is_deterministic() {
        assert_eq!(ChunkLayout::bucket("/a/b"), ChunkLayout::bucket("/a/b"));
        let n = u64::from_str_radix(&ChunkLayout::bucket("/a/b"), 16).unwrap();
        assert!(n < BUCKET_COUNT);
    }

    #[test]
    fn test_escape_keeps_paths_distinct() {
        assert_eq!(ChunkLayout::escape("/a/b").unwrap(), "a:b");
        assert_eq!(ChunkLayout::escape("/a:b").unwrap(), "a%3Ab");
        assert_eq!(ChunkLayout::escape("/100%").unwrap(), "100%25");
        assert_ne!(
            ChunkLayout::escape("/a/b").unwrap(),
            ChunkLayout::escape("/a:b").unwrap()
        );
    }

    #[test]
    fn test_root_and_relative_rejected() {
        assert!(ChunkLayout::escape("/").is_err());
        assert!(ChunkLayout::escape("relative").is_err());
    }
}
