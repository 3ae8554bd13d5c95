//! Virtual file descriptors
//!
//! Every descriptor handed to a caller is the number of a real, anonymous
//! temporary file. The file never holds data; it only reserves a
//! descriptor number that the kernel will not give out to anyone else
//! while the entry lives.

use crate::open_dir::OpenDir;
use parking_lot::Mutex;
use scatterfs_common::{Error, FileType, Result};
use std::collections::HashMap;
use std::fs::File;
use std::os::fd::{AsRawFd, RawFd};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// State behind one open descriptor
#[derive(Debug)]
pub struct OpenFile {
    path: String,
    file_type: FileType,
    append: bool,
    pos: AtomicU64,
    dir: Option<OpenDir>,
    // keeps the descriptor number reserved until the last reference drops
    anchor: File,
}

impl OpenFile {
    pub fn fd(&self) -> RawFd {
        self.anchor.as_raw_fd()
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub const fn file_type(&self) -> FileType {
        self.file_type
    }

    pub const fn append(&self) -> bool {
        self.append
    }

    /// Current offset; for directories the index of the next entry
    pub fn pos(&self) -> u64 {
        self.pos.load(Ordering::Acquire)
    }

    pub fn set_pos(&self, pos: u64) {
        self.pos.store(pos, Ordering::Release);
    }

    /// Directory snapshot, present for directory descriptors only
    pub const fn dir(&self) -> Option<&OpenDir> {
        self.dir.as_ref()
    }
}

/// Table of descriptors opened through one client
#[derive(Debug, Default)]
pub struct OpenFileMap {
    files: Mutex<HashMap<RawFd, Arc<OpenFile>>>,
}

impl OpenFileMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an open file and return its descriptor
    pub fn add(&self, path: &str, append: bool, file_type: FileType) -> Result<RawFd> {
        self.insert(path, append, file_type, None)
    }

    /// Register an open directory with its snapshot
    pub fn add_dir(&self, path: &str, dir: OpenDir) -> Result<RawFd> {
        self.insert(path, false, FileType::Directory, Some(dir))
    }

    fn insert(
        &self,
        path: &str,
        append: bool,
        file_type: FileType,
        dir: Option<OpenDir>,
    ) -> Result<RawFd> {
        let anchor = tempfile::tempfile()?;
        let fd = anchor.as_raw_fd();
        let entry = Arc::new(OpenFile {
            path: path.to_owned(),
            file_type,
            append,
            pos: AtomicU64::new(0),
            dir,
            anchor,
        });
        self.files.lock().insert(fd, entry);
        trace!(fd, path, %file_type, "Descriptor opened");
        Ok(fd)
    }

    pub fn get(&self, fd: RawFd) -> Result<Arc<OpenFile>> {
        self.files
            .lock()
            .get(&fd)
            .cloned()
            .ok_or(Error::BadDescriptor(fd))
    }

    pub fn exists(&self, fd: RawFd) -> bool {
        self.files.lock().contains_key(&fd)
    }

    /// Forget a descriptor. The backing temporary file closes once no
    /// caller holds the entry anymore.
    pub fn remove(&self, fd: RawFd) -> bool {
        let removed = self.files.lock().remove(&fd);
        if removed.is_some() {
            trace!(fd, "Descriptor closed");
        }
        removed.is_some()
    }

    pub fn len(&self) -> usize {
        self.files.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    #[test]
    fn test_add_get_remove() {
        let map = OpenFileMap::new();
        let fd = map.add("/a", true, FileType::File).unwrap();
        assert!(fd >= 0);
        assert!(map.exists(fd));

        let file = map.get(fd).unwrap();
        assert_eq!(file.path(), "/a");
        assert!(file.append());
        assert_eq!(file.pos(), 0);
        assert!(file.dir().is_none());
        file.set_pos(42);
        assert_eq!(map.get(fd).unwrap().pos(), 42);

        assert!(map.remove(fd));
        assert!(!map.remove(fd));
        assert!(!map.exists(fd));
        assert!(matches!(map.get(fd), Err(Error::BadDescriptor(n)) if n == fd));
    }

    #[test]
    fn test_descriptors_unique_across_threads() {
        let map = Arc::new(OpenFileMap::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let map = Arc::clone(&map);
                thread::spawn(move || {
                    (0..16)
                        .map(|i| map.add(&format!("/t{t}/{i}"), false, FileType::File).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let fds: Vec<RawFd> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        let unique: HashSet<_> = fds.iter().copied().collect();
        assert_eq!(unique.len(), 128);
        assert_eq!(map.len(), 128);
        for fd in fds {
            assert!(map.remove(fd));
        }
        assert!(map.is_empty());
    }

    #[test]
    fn test_directory_entry() {
        let map = OpenFileMap::new();
        let fd = map.add_dir("/d", OpenDir::default()).unwrap();
        let entry = map.get(fd).unwrap();
        assert_eq!(entry.file_type(), FileType::Directory);
        assert!(entry.dir().unwrap().is_empty());
    }
}
