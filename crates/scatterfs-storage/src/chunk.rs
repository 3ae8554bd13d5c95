//! Chunk storage engine
//!
//! Stores the chunks of files owned by this host as individual files below
//! a root directory (see [`crate::layout`]). All offsets taken here are
//! offsets within one chunk; splitting a logical byte range into chunk
//! pieces is the caller's job (`scatterfs_common::arithmetic::split_range`).
//!
//! Operations are blocking and are meant to run on the [`crate::IoPool`].

use crate::layout::ChunkLayout;
use nix::sys::statvfs::statvfs;
use scatterfs_common::arithmetic::{chunk_index, is_power_of_2, pad_left};
use scatterfs_common::{ChunkId, ChunkStat, Error, Result};
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::os::unix::fs::{FileExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, warn};

/// Permission bits of newly created chunk files
const CHUNK_FILE_MODE: u32 = 0o640;

/// Chunk storage statistics
#[derive(Debug, Default)]
pub struct ChunkStorageStats {
    pub reads: AtomicU64,
    pub writes: AtomicU64,
    pub bytes_read: AtomicU64,
    pub bytes_written: AtomicU64,
    pub read_errors: AtomicU64,
    pub write_errors: AtomicU64,
    /// Reads that hit a chunk file that does not exist
    pub holes: AtomicU64,
}

/// Per-host chunk store
#[derive(Debug)]
pub struct ChunkStorage {
    layout: ChunkLayout,
    chunk_size: u64,
    stats: ChunkStorageStats,
}

impl ChunkStorage {
    /// Open (and create if needed) a chunk store rooted at `root`
    pub fn open(root: impl Into<PathBuf>, chunk_size: u64) -> Result<Self> {
        if !is_power_of_2(chunk_size) {
            return Err(Error::Configuration(format!(
                "chunk size {chunk_size} is not a power of two"
            )));
        }
        let root = root.into();
        fs::create_dir_all(&root)?;
        debug!("Chunk storage initialized at {}", root.display());

        Ok(Self {
            layout: ChunkLayout::new(root),
            chunk_size,
            stats: ChunkStorageStats::default(),
        })
    }

    pub fn root(&self) -> &Path {
        self.layout.root()
    }

    pub const fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub const fn layout(&self) -> &ChunkLayout {
        &self.layout
    }

    pub const fn stats(&self) -> &ChunkStorageStats {
        &self.stats
    }

    fn check_bounds(&self, offset_in_chunk: u64, len: usize) -> Result<()> {
        let end = offset_in_chunk.checked_add(len as u64);
        if end.is_none_or(|end| end > self.chunk_size) {
            return Err(Error::invalid_argument(format!(
                "range {}+{} crosses the chunk boundary at {}",
                offset_in_chunk, len, self.chunk_size
            )));
        }
        Ok(())
    }

    /// Write `buf` into one chunk at `offset_in_chunk`, creating the chunk
    /// file and its directory on demand.
    ///
    /// Returns the number of bytes written.
    pub fn write_chunk(
        &self,
        path: &str,
        chunk_id: ChunkId,
        buf: &[u8],
        offset_in_chunk: u64,
    ) -> Result<u64> {
        self.check_bounds(offset_in_chunk, buf.len())?;
        let required = buf.len() as u64;
        let chunk_dir = self.layout.chunk_dir(path)?;
        let chunk_path = chunk_dir.join(chunk_id.to_string());

        let result = fs::create_dir_all(&chunk_dir).and_then(|()| {
            let file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(false)
                .mode(CHUNK_FILE_MODE)
                .open(&chunk_path)?;
            file.write_all_at(buf, offset_in_chunk)
        });

        match result {
            Ok(()) => {
                self.stats.writes.fetch_add(1, Ordering::Relaxed);
                self.stats.bytes_written.fetch_add(required, Ordering::Relaxed);
                Ok(required)
            }
            Err(e) => {
                self.stats.write_errors.fetch_add(1, Ordering::Relaxed);
                error!(
                    path,
                    chunk_id,
                    offset_in_chunk,
                    size = required,
                    "Failed to write chunk: {e}"
                );
                Err(Error::from_io(e, required))
            }
        }
    }

    /// Read into `buf` from one chunk starting at `offset_in_chunk`.
    ///
    /// Returns the number of bytes found on disk. Everything in `buf` past
    /// that count is zeroed, so a missing chunk reads as a hole of zeros.
    pub fn read_chunk(
        &self,
        path: &str,
        chunk_id: ChunkId,
        buf: &mut [u8],
        offset_in_chunk: u64,
    ) -> Result<u64> {
        self.check_bounds(offset_in_chunk, buf.len())?;
        let chunk_path = self.layout.chunk_path(path, chunk_id)?;

        let file = match fs::File::open(&chunk_path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                buf.fill(0);
                self.stats.reads.fetch_add(1, Ordering::Relaxed);
                self.stats.holes.fetch_add(1, Ordering::Relaxed);
                return Ok(0);
            }
            Err(e) => {
                self.stats.read_errors.fetch_add(1, Ordering::Relaxed);
                error!(path, chunk_id, "Failed to open chunk for read: {e}");
                return Err(e.into());
            }
        };

        let mut total = 0usize;
        while total < buf.len() {
            match file.read_at(&mut buf[total..], offset_in_chunk + total as u64) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    self.stats.read_errors.fetch_add(1, Ordering::Relaxed);
                    error!(
                        path,
                        chunk_id,
                        offset_in_chunk,
                        size = buf.len(),
                        "Failed to read chunk: {e}"
                    );
                    return Err(e.into());
                }
            }
        }
        buf[total..].fill(0);

        self.stats.reads.fetch_add(1, Ordering::Relaxed);
        self.stats.bytes_read.fetch_add(total as u64, Ordering::Relaxed);
        Ok(total as u64)
    }

    /// Delete every chunk of `path` with an index of at least `first`
    pub fn trim_chunk_space(&self, path: &str, first: ChunkId) -> Result<()> {
        let dir = self.layout.chunk_dir(path)?;
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(chunk_id) = name.to_str().and_then(|n| n.parse::<ChunkId>().ok()) else {
                warn!(path, "Ignoring stray entry {:?} in chunk directory", name);
                continue;
            };
            if chunk_id >= first {
                match fs::remove_file(entry.path()) {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => {
                        error!(path, chunk_id, "Failed to remove chunk: {e}");
                        return Err(e.into());
                    }
                }
            }
        }
        Ok(())
    }

    /// Shorten one chunk file to `len` bytes. Missing chunks are left alone.
    pub fn truncate_chunk(&self, path: &str, chunk_id: ChunkId, len: u64) -> Result<()> {
        if len > self.chunk_size {
            return Err(Error::invalid_argument(format!(
                "chunk length {len} exceeds chunk size {}",
                self.chunk_size
            )));
        }
        let chunk_path = self.layout.chunk_path(path, chunk_id)?;
        match OpenOptions::new().write(true).open(&chunk_path) {
            Ok(file) => {
                // Only ever shrink; a shorter chunk already reads as zeros past its end
                if file.metadata()?.len() > len {
                    file.set_len(len)?;
                }
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => {
                error!(path, chunk_id, "Failed to truncate chunk: {e}");
                Err(e.into())
            }
        }
    }

    /// Drop the chunks of `path` that lie beyond `new_size` and cut the new
    /// last chunk to its in-chunk length.
    pub fn truncate_space(&self, path: &str, new_size: u64) -> Result<()> {
        if new_size == 0 {
            return self.trim_chunk_space(path, 0);
        }

        let last = chunk_index(new_size - 1, self.chunk_size);
        self.trim_chunk_space(path, last + 1)?;

        let tail = pad_left(new_size, self.chunk_size);
        if tail != 0 {
            self.truncate_chunk(path, last, tail)?;
        }
        debug!(path, new_size, "Truncated chunk space");
        Ok(())
    }

    /// Delete all chunks of `path` along with their directory
    pub fn destroy_space(&self, path: &str) -> Result<()> {
        let dir = self.layout.chunk_dir(path)?;
        match fs::remove_dir_all(&dir) {
            Ok(()) => {
                debug!(path, "Destroyed chunk space");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => {
                error!(path, "Failed to remove chunk directory {}: {e}", dir.display());
                Err(e.into())
            }
        }
    }

    /// Capacity of the backing file system, in chunks
    pub fn chunk_stat(&self) -> Result<ChunkStat> {
        let (total, available) = self.space()?;
        debug!(
            chunk_size = self.chunk_size,
            total, available, "Chunk space statistics"
        );
        Ok(ChunkStat {
            chunk_size: self.chunk_size,
            chunk_total: total / self.chunk_size,
            chunk_free: available / self.chunk_size,
        })
    }

    /// Fail with `CapacityExceeded` if `required` bytes do not fit
    pub fn ensure_capacity(&self, required: u64) -> Result<()> {
        let (_, available) = self.space()?;
        if required > available {
            warn!(required, available, "Chunk space exhausted");
            return Err(Error::CapacityExceeded {
                required,
                available,
            });
        }
        Ok(())
    }

    /// Total and available bytes of the file system holding the root
    fn space(&self) -> Result<(u64, u64)> {
        let vfs = statvfs(self.layout.root()).map_err(std::io::Error::from)?;
        let unit = vfs.fragment_size() as u64;
        let total = vfs.blocks() as u64 * unit;
        let available = vfs.blocks_available() as u64 * unit;
        Ok((total, available))
    }
}
