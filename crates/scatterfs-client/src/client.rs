//! File system client
//!
//! [`FsClient`] turns POSIX-style calls into requests against the hosts a
//! [`Distributor`] names. Metadata calls go to the single owning host.
//! Data calls are split into chunk pieces, grouped per host and sent
//! concurrently; the per-host byte counts are summed on the way back.

use crate::file_map::{OpenFile, OpenFileMap};
use crate::open_dir::{DirEntry, OpenDir};
use bitflags::bitflags;
use futures::future::join_all;
use scatterfs_common::arithmetic::{ChunkSpan, is_power_of_2, range_end, split_range};
use scatterfs_common::rpc::{self, ChunkRead, ChunkWrite};
use scatterfs_common::{
    ChunkStat, Error, FileType, FsConfig, HostId, Metadata, ROOT_PATH, Request, Response, Result,
    Transport, is_valid_path, parent_path,
};
use scatterfs_placement::{Distributor, build_distributor};
use std::collections::{BTreeMap, HashMap};
use std::os::fd::RawFd;
use std::sync::Arc;
use tracing::{debug, warn};

bitflags! {
    /// Flags honoured by [`FsClient::open`]
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        const CREATE = 1 << 0;
        const EXCL = 1 << 1;
        const TRUNC = 1 << 2;
        const APPEND = 1 << 3;
    }
}

impl OpenFlags {
    /// Pick the supported bits out of `open(2)` flags
    #[must_use]
    pub const fn from_posix(flags: i32) -> Self {
        let mut out = Self::empty();
        if flags & libc::O_CREAT != 0 {
            out = out.union(Self::CREATE);
        }
        if flags & libc::O_EXCL != 0 {
            out = out.union(Self::EXCL);
        }
        if flags & libc::O_TRUNC != 0 {
            out = out.union(Self::TRUNC);
        }
        if flags & libc::O_APPEND != 0 {
            out = out.union(Self::APPEND);
        }
        out
    }
}

/// Reference point of [`FsClient::lseek`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Whence {
    Set,
    Cur,
    End,
}

/// Client of a ScatterFS deployment
pub struct FsClient {
    transport: Arc<dyn Transport>,
    distributor: Arc<dyn Distributor>,
    chunk_size: u64,
    files: OpenFileMap,
}

impl FsClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        distributor: Arc<dyn Distributor>,
        chunk_size: u64,
    ) -> Result<Self> {
        if !is_power_of_2(chunk_size) {
            return Err(Error::Configuration(format!(
                "chunk size {chunk_size} is not a power of two"
            )));
        }
        if distributor.host_count() > transport.host_count() {
            return Err(Error::Configuration(format!(
                "distributor spans {} hosts but the transport reaches only {}",
                distributor.host_count(),
                transport.host_count()
            )));
        }
        Ok(Self {
            transport,
            distributor,
            chunk_size,
            files: OpenFileMap::new(),
        })
    }

    /// Client using the placement and chunk size of `config`
    pub fn from_config(config: &FsConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        Self::new(transport, build_distributor(config)?, config.chunk_size)
    }

    pub fn distributor(&self) -> &Arc<dyn Distributor> {
        &self.distributor
    }

    pub const fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub const fn files(&self) -> &OpenFileMap {
        &self.files
    }

    async fn call(&self, host: HostId, request: Request) -> Result<Response> {
        rpc::call(self.transport.as_ref(), host, &request).await
    }

    fn metadata_host(&self, path: &str) -> HostId {
        self.distributor.locate_file_metadata(path)
    }

    // ---- metadata ----

    pub async fn stat(&self, path: &str) -> Result<Metadata> {
        check_path(path)?;
        let host = self.metadata_host(path);
        match self.call(host, Request::Stat { path: path.into() }).await? {
            Response::Metadata(md) => Ok(md),
            _ => Err(unexpected(host, "Stat")),
        }
    }

    async fn get_size(&self, path: &str) -> Result<u64> {
        let host = self.metadata_host(path);
        match self.call(host, Request::GetSize { path: path.into() }).await? {
            Response::Size(size) => Ok(size),
            _ => Err(unexpected(host, "GetSize")),
        }
    }

    /// Create a file record. Mode bits without a file type make a regular file.
    pub async fn create(&self, path: &str, mode: u32) -> Result<()> {
        let metadata = if mode & libc::S_IFMT as u32 == 0 {
            Metadata::file(mode)
        } else {
            Metadata::new(mode)
        };
        self.create_record(path, metadata).await
    }

    pub async fn mkdir(&self, path: &str, perm: u32) -> Result<()> {
        self.create_record(path, Metadata::directory(perm)).await
    }

    async fn create_record(&self, path: &str, metadata: Metadata) -> Result<()> {
        check_path(path)?;
        let parent = parent_path(path).ok_or_else(|| Error::AlreadyExists(path.into()))?;
        if !self.stat(parent).await?.is_dir() {
            return Err(Error::NotADirectory(parent.into()));
        }
        let host = self.metadata_host(path);
        self.call(
            host,
            Request::Create {
                path: path.into(),
                metadata,
            },
        )
        .await?;
        debug!(path, host, "Created");
        Ok(())
    }

    /// Remove a file record and all of its chunks
    pub async fn unlink(&self, path: &str) -> Result<()> {
        let md = self.stat(path).await?;
        if md.is_dir() {
            return Err(Error::IsADirectory(path.into()));
        }
        let host = self.metadata_host(path);
        self.call(host, Request::Remove { path: path.into() }).await?;
        if md.size > 0 {
            self.broadcast(|| Request::RemoveData { path: path.into() })
                .await?;
        }
        debug!(path, "Unlinked");
        Ok(())
    }

    /// Remove an empty directory.
    ///
    /// Fails when any host holding entries of the directory can not be
    /// reached, since emptiness can not be confirmed then.
    pub async fn rmdir(&self, path: &str) -> Result<()> {
        if path == ROOT_PATH {
            return Err(Error::invalid_argument("cannot remove the root directory"));
        }
        let md = self.stat(path).await?;
        if !md.is_dir() {
            return Err(Error::NotADirectory(path.into()));
        }
        let listing = self.list_dir(path).await?;
        if let Some(&host) = listing.unreachable_hosts().first() {
            return Err(Error::Transport {
                host,
                message: format!("cannot confirm that {path} is empty"),
            });
        }
        if !listing.is_empty() {
            return Err(Error::DirectoryNotEmpty(path.into()));
        }
        let host = self.metadata_host(path);
        self.call(host, Request::Remove { path: path.into() }).await?;
        Ok(())
    }

    /// Set the logical size of a file, dropping chunk data past it
    pub async fn truncate(&self, path: &str, size: u64) -> Result<()> {
        let md = self.stat(path).await?;
        if md.is_dir() {
            return Err(Error::IsADirectory(path.into()));
        }
        let host = self.metadata_host(path);
        if size > md.size {
            self.call(
                host,
                Request::UpdateSize {
                    path: path.into(),
                    io_size: 0,
                    offset: size,
                    append: false,
                },
            )
            .await?;
        } else if size < md.size {
            self.call(
                host,
                Request::DecreaseSize {
                    path: path.into(),
                    size,
                },
            )
            .await?;
            self.broadcast(|| Request::TruncateData {
                path: path.into(),
                size,
            })
            .await?;
        }
        debug!(path, old = md.size, new = size, "Truncated");
        Ok(())
    }

    /// Chunk space of the whole deployment
    pub async fn statfs(&self) -> Result<ChunkStat> {
        let replies = join_all((0..self.transport.host_count()).map(|host| async move {
            match self.call(host, Request::ChunkStat).await? {
                Response::ChunkStat(stat) => Ok(stat),
                _ => Err(unexpected(host, "ChunkStat")),
            }
        }))
        .await;
        replies
            .into_iter()
            .try_fold(ChunkStat::default(), |acc, stat| stat.map(|s| acc.merge(s)))
    }

    /// Send a request to every host behind the transport, including hosts
    /// the distributor never places data on. Any failure fails the whole call.
    async fn broadcast(&self, request: impl Fn() -> Request) -> Result<()> {
        let calls = (0..self.transport.host_count()).map(|host| {
            let request = request();
            async move { (host, self.call(host, request).await) }
        });
        let mut failure = None;
        for (host, result) in join_all(calls).await {
            if let Err(e) = result {
                warn!(host, "Broadcast request failed: {}", e);
                failure.get_or_insert(e);
            }
        }
        failure.map_or(Ok(()), Err)
    }

    // ---- descriptors ----

    /// Open a path and return a descriptor. Directories are opened with a
    /// fresh snapshot of their entries.
    pub async fn open(&self, path: &str, flags: OpenFlags, mode: u32) -> Result<RawFd> {
        let md = match self.stat(path).await {
            Ok(md) => md,
            Err(e) if e.is_not_found() && flags.contains(OpenFlags::CREATE) => {
                match self.create(path, mode).await {
                    Ok(()) => {}
                    Err(Error::AlreadyExists(_)) if !flags.contains(OpenFlags::EXCL) => {}
                    Err(e) => return Err(e),
                }
                return self
                    .files
                    .add(path, flags.contains(OpenFlags::APPEND), FileType::File);
            }
            Err(e) => return Err(e),
        };

        if flags.contains(OpenFlags::CREATE | OpenFlags::EXCL) {
            return Err(Error::AlreadyExists(path.into()));
        }
        if md.is_dir() {
            if flags.intersects(OpenFlags::TRUNC | OpenFlags::APPEND) {
                return Err(Error::IsADirectory(path.into()));
            }
            return self.opendir(path).await;
        }
        if flags.contains(OpenFlags::TRUNC) && md.size > 0 {
            self.truncate(path, 0).await?;
        }
        self.files
            .add(path, flags.contains(OpenFlags::APPEND), FileType::File)
    }

    pub fn close(&self, fd: RawFd) -> Result<()> {
        if self.files.remove(fd) {
            Ok(())
        } else {
            Err(Error::BadDescriptor(fd))
        }
    }

    pub async fn fstat(&self, fd: RawFd) -> Result<Metadata> {
        let file = self.files.get(fd)?;
        self.stat(file.path()).await
    }

    pub async fn ftruncate(&self, fd: RawFd, size: u64) -> Result<()> {
        let file = self.files.get(fd)?;
        self.truncate(file.path(), size).await
    }

    /// Move the offset of a descriptor
    pub async fn lseek(&self, fd: RawFd, offset: i64, whence: Whence) -> Result<u64> {
        let file = self.files.get(fd)?;
        let base = match whence {
            Whence::Set => 0,
            Whence::Cur => file.pos(),
            Whence::End => match file.dir() {
                Some(dir) => dir.len() as u64,
                None => self.get_size(file.path()).await?,
            },
        };
        let pos = i64::try_from(base)
            .ok()
            .and_then(|base| base.checked_add(offset))
            .and_then(|pos| u64::try_from(pos).ok())
            .ok_or_else(|| {
                Error::invalid_argument(format!("seek of {offset} from {base} out of range"))
            })?;
        file.set_pos(pos);
        Ok(pos)
    }

    /// Write at the descriptor offset, or at the end of file for append
    /// descriptors, and advance the offset.
    pub async fn write(&self, fd: RawFd, buf: &[u8]) -> Result<usize> {
        let file = self.file(fd)?;
        let start = self
            .write_at(file.path(), buf, file.pos(), file.append())
            .await?;
        file.set_pos(start + buf.len() as u64);
        Ok(buf.len())
    }

    /// Write at `offset` without touching the descriptor offset
    pub async fn pwrite(&self, fd: RawFd, buf: &[u8], offset: u64) -> Result<usize> {
        let file = self.file(fd)?;
        self.write_at(file.path(), buf, offset, false).await?;
        Ok(buf.len())
    }

    /// Read from the descriptor offset and advance it
    pub async fn read(&self, fd: RawFd, buf: &mut [u8]) -> Result<usize> {
        let file = self.file(fd)?;
        let n = self.read_at(file.path(), buf, file.pos()).await?;
        file.set_pos(file.pos() + n as u64);
        Ok(n)
    }

    /// Read at `offset` without touching the descriptor offset
    pub async fn pread(&self, fd: RawFd, buf: &mut [u8], offset: u64) -> Result<usize> {
        let file = self.file(fd)?;
        self.read_at(file.path(), buf, offset).await
    }

    /// Regular file behind a descriptor
    fn file(&self, fd: RawFd) -> Result<Arc<OpenFile>> {
        let file = self.files.get(fd)?;
        if file.file_type().is_dir() {
            return Err(Error::IsADirectory(file.path().into()));
        }
        Ok(file)
    }

    /// Grow the size record, then write the chunk pieces. Returns the
    /// offset the data landed at.
    async fn write_at(&self, path: &str, buf: &[u8], offset: u64, append: bool) -> Result<u64> {
        if buf.is_empty() {
            return Ok(offset);
        }
        let len = buf.len() as u64;
        if !append && range_end(offset, len).is_none() {
            return Err(Error::invalid_argument(format!(
                "write of {len} bytes at {offset} to {path} overflows"
            )));
        }
        let md_host = self.metadata_host(path);
        let new_size = match self
            .call(
                md_host,
                Request::UpdateSize {
                    path: path.into(),
                    io_size: len,
                    offset,
                    append,
                },
            )
            .await?
        {
            Response::Size(size) => size,
            _ => return Err(unexpected(md_host, "UpdateSize")),
        };
        // the size record decides where appended data goes
        let start = if append {
            new_size.saturating_sub(len)
        } else {
            offset
        };

        let mut per_host: BTreeMap<HostId, Vec<ChunkWrite>> = BTreeMap::new();
        for span in split_range(start, len, self.chunk_size) {
            let from = span.buf_offset as usize;
            let to = from + span.len as usize;
            per_host
                .entry(self.distributor.locate_data(path, span.chunk_id))
                .or_default()
                .push(ChunkWrite {
                    chunk_id: span.chunk_id,
                    offset_in_chunk: span.offset_in_chunk,
                    data: buf[from..to].to_vec(),
                });
        }

        let calls = per_host.into_iter().map(|(host, chunks)| async move {
            let request = Request::WriteData {
                path: path.into(),
                chunks,
            };
            match self.call(host, request).await {
                Ok(Response::Written(n)) => (host, Ok(n)),
                Ok(_) => (host, Err(unexpected(host, "WriteData"))),
                Err(e) => (host, Err(e)),
            }
        });

        let mut written = 0u64;
        let mut failure = None;
        for (host, result) in join_all(calls).await {
            match result {
                Ok(n) => written += n,
                Err(e) => {
                    warn!(path, host, "Chunk write failed: {}", e);
                    failure.get_or_insert(e);
                }
            }
        }
        if let Some(e) = failure {
            return Err(e);
        }
        if written != len {
            return Err(Error::Io(std::io::Error::other(format!(
                "short write to {path}: {written} of {len} bytes"
            ))));
        }
        debug!(path, offset = start, len, "Wrote");
        Ok(start)
    }

    /// Read up to the end of file. Holes read as zeros.
    async fn read_at(&self, path: &str, buf: &mut [u8], offset: u64) -> Result<usize> {
        let size = self.get_size(path).await?;
        if buf.is_empty() || offset >= size {
            return Ok(0);
        }
        let len = (buf.len() as u64).min(size - offset);

        let spans = split_range(offset, len, self.chunk_size);
        let mut per_host: BTreeMap<HostId, Vec<ChunkRead>> = BTreeMap::new();
        for span in &spans {
            per_host
                .entry(self.distributor.locate_data(path, span.chunk_id))
                .or_default()
                .push(ChunkRead {
                    chunk_id: span.chunk_id,
                    offset_in_chunk: span.offset_in_chunk,
                    len: span.len,
                });
        }
        let by_chunk: HashMap<u64, ChunkSpan> = spans.iter().map(|s| (s.chunk_id, *s)).collect();

        let calls = per_host.into_iter().map(|(host, chunks)| async move {
            let request = Request::ReadData {
                path: path.into(),
                chunks,
            };
            match self.call(host, request).await? {
                Response::Read(pieces) => Ok(pieces),
                _ => Err(unexpected(host, "ReadData")),
            }
        });

        for result in join_all(calls).await {
            for piece in result? {
                let span = by_chunk.get(&piece.chunk_id).ok_or_else(|| {
                    Error::internal(format!("unrequested chunk {} in reply", piece.chunk_id))
                })?;
                let n = span.len as usize;
                if piece.data.len() < n {
                    return Err(Error::internal(format!(
                        "chunk {} reply holds {} of {n} bytes",
                        piece.chunk_id,
                        piece.data.len()
                    )));
                }
                let from = span.buf_offset as usize;
                buf[from..from + n].copy_from_slice(&piece.data[..n]);
            }
        }
        debug!(path, offset, len, "Read");
        Ok(len as usize)
    }

    // ---- directories ----

    /// Open a directory with a snapshot of its entries.
    ///
    /// Hosts that fail to answer leave the snapshot partial instead of
    /// failing the call, unless no host answers at all.
    pub async fn opendir(&self, path: &str) -> Result<RawFd> {
        let md = self.stat(path).await?;
        if !md.is_dir() {
            return Err(Error::NotADirectory(path.into()));
        }
        let dir = self.list_dir(path).await?;
        if dir.is_partial() {
            warn!(
                path,
                unreachable = ?dir.unreachable_hosts(),
                "Directory snapshot is partial"
            );
        }
        self.files.add_dir(path, dir)
    }

    /// Entry `index` of a directory snapshot
    pub fn getdent(&self, fd: RawFd, index: usize) -> Result<Option<DirEntry>> {
        let file = self.files.get(fd)?;
        let dir = file
            .dir()
            .ok_or_else(|| Error::NotADirectory(file.path().into()))?;
        Ok(dir.getdent(index).cloned())
    }

    /// Next entry of a directory snapshot, advancing the descriptor offset
    pub fn readdir(&self, fd: RawFd) -> Result<Option<DirEntry>> {
        let file = self.files.get(fd)?;
        let dir = file
            .dir()
            .ok_or_else(|| Error::NotADirectory(file.path().into()))?;
        let entry = usize::try_from(file.pos())
            .ok()
            .and_then(|idx| dir.getdent(idx))
            .cloned();
        if entry.is_some() {
            file.set_pos(file.pos() + 1);
        }
        Ok(entry)
    }

    /// Ask every host that may hold entries of `path` and merge the answers
    async fn list_dir(&self, path: &str) -> Result<OpenDir> {
        let hosts = self.distributor.locate_directory_metadata(path);
        let calls = hosts.iter().map(|&host| async move {
            let reply = self
                .call(host, Request::GetDirentsExtended { path: path.into() })
                .await;
            let listing = match reply {
                Ok(Response::DirentsExtended(entries)) => Ok(entries),
                Ok(_) => Err(unexpected(host, "GetDirentsExtended")),
                Err(e) => Err(e),
            };
            (host, listing)
        });

        let mut listings = Vec::with_capacity(hosts.len());
        let mut unreachable = Vec::new();
        let mut last_error = None;
        for (host, listing) in join_all(calls).await {
            match listing {
                Ok(entries) => listings.push(entries),
                Err(e) => {
                    warn!(path, host, "Directory listing failed: {}", e);
                    unreachable.push(host);
                    last_error = Some(e);
                }
            }
        }
        if listings.is_empty() {
            if let Some(e) = last_error {
                return Err(e);
            }
        }
        Ok(OpenDir::from_listings(listings, unreachable))
    }
}

fn check_path(path: &str) -> Result<()> {
    if is_valid_path(path) {
        Ok(())
    } else {
        Err(Error::invalid_argument(format!("invalid path {path:?}")))
    }
}

fn unexpected(host: HostId, request: &str) -> Error {
    Error::internal(format!("unexpected reply to {request} from host {host}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use scatterfs_common::DistributorConfig;
    use scatterfs_daemon::LoopbackTransport;
    use std::path::Path;
    use tempfile::tempdir;

    const CHUNK: u64 = 4096;

    fn cluster(dir: &Path, hosts: u32) -> (Arc<LoopbackTransport>, FsClient) {
        let config = FsConfig {
            chunk_size: CHUNK,
            host_count: hosts,
            io_workers: 2,
            distributor: DistributorConfig::Hash,
            ..FsConfig::default()
        };
        let transport = Arc::new(LoopbackTransport::local_cluster(&config, dir).unwrap());
        let client = FsClient::from_config(&config, transport.clone()).unwrap();
        (transport, client)
    }

    fn random_bytes(len: usize) -> Vec<u8> {
        let mut rng = rand::thread_rng();
        (0..len).map(|_| rng.r#gen()).collect()
    }

    #[tokio::test]
    async fn test_write_read_across_chunks() {
        let dir = tempdir().unwrap();
        let (_transport, client) = cluster(dir.path(), 3);
        let data = random_bytes(3 * CHUNK as usize + 123);

        let fd = client.open("/big", OpenFlags::CREATE, 0o644).await.unwrap();
        assert_eq!(client.write(fd, &data).await.unwrap(), data.len());
        assert_eq!(client.lseek(fd, 0, Whence::Cur).await.unwrap(), data.len() as u64);
        client.close(fd).unwrap();

        assert_eq!(client.stat("/big").await.unwrap().size, data.len() as u64);

        let fd = client.open("/big", OpenFlags::empty(), 0).await.unwrap();
        let mut buf = vec![0u8; data.len() + 500];
        assert_eq!(client.read(fd, &mut buf).await.unwrap(), data.len());
        assert_eq!(&buf[..data.len()], &data[..]);
        assert_eq!(client.read(fd, &mut buf).await.unwrap(), 0);

        let mut middle = vec![0u8; 100];
        assert_eq!(client.pread(fd, &mut middle, 4050).await.unwrap(), 100);
        assert_eq!(&middle[..], &data[4050..4150]);
    }

    #[tokio::test]
    async fn test_sparse_file_reads_zeros() {
        let dir = tempdir().unwrap();
        let (_transport, client) = cluster(dir.path(), 2);
        let fd = client.open("/sparse", OpenFlags::CREATE, 0o644).await.unwrap();
        client.pwrite(fd, b"xyz", 9000).await.unwrap();
        assert_eq!(client.fstat(fd).await.unwrap().size, 9003);

        let mut buf = vec![0xffu8; 9003];
        assert_eq!(client.pread(fd, &mut buf, 0).await.unwrap(), 9003);
        assert!(buf[..9000].iter().all(|&b| b == 0));
        assert_eq!(&buf[9000..], b"xyz");
    }

    #[tokio::test]
    async fn test_concurrent_appends_do_not_overlap() {
        let dir = tempdir().unwrap();
        let (_transport, client) = cluster(dir.path(), 3);
        client.create("/log", 0o644).await.unwrap();

        let fds: Vec<RawFd> = {
            let mut fds = Vec::new();
            for _ in 0..4 {
                fds.push(client.open("/log", OpenFlags::APPEND, 0).await.unwrap());
            }
            fds
        };
        let blocks: Vec<Vec<u8>> = (0..4u8).map(|i| vec![b'a' + i; 1500]).collect();
        let writes = fds
            .iter()
            .zip(&blocks)
            .map(|(&fd, block)| client.write(fd, block));
        for result in join_all(writes).await {
            assert_eq!(result.unwrap(), 1500);
        }

        assert_eq!(client.stat("/log").await.unwrap().size, 6000);
        let fd = client.open("/log", OpenFlags::empty(), 0).await.unwrap();
        let mut buf = vec![0u8; 6000];
        assert_eq!(client.read(fd, &mut buf).await.unwrap(), 6000);
        let mut seen: Vec<u8> = buf
            .chunks(1500)
            .map(|block| {
                assert!(block.iter().all(|&b| b == block[0]));
                block[0]
            })
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![b'a', b'b', b'c', b'd']);
    }

    #[tokio::test]
    async fn test_lseek() {
        let dir = tempdir().unwrap();
        let (_transport, client) = cluster(dir.path(), 1);
        let fd = client.open("/s", OpenFlags::CREATE, 0o644).await.unwrap();
        client.write(fd, b"0123456789").await.unwrap();

        assert_eq!(client.lseek(fd, 2, Whence::Set).await.unwrap(), 2);
        assert_eq!(client.lseek(fd, 3, Whence::Cur).await.unwrap(), 5);
        assert_eq!(client.lseek(fd, -4, Whence::End).await.unwrap(), 6);
        let mut buf = [0u8; 2];
        client.read(fd, &mut buf).await.unwrap();
        assert_eq!(&buf, b"67");

        let err = client.lseek(fd, -11, Whence::End).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(client.lseek(fd, 0, Whence::Cur).await.unwrap(), 8);
    }

    #[tokio::test]
    async fn test_truncate_shrink_and_grow() {
        let dir = tempdir().unwrap();
        let (_transport, client) = cluster(dir.path(), 3);
        let data = random_bytes(10_000);
        let fd = client.open("/t", OpenFlags::CREATE, 0o644).await.unwrap();
        client.write(fd, &data).await.unwrap();

        client.truncate("/t", 5000).await.unwrap();
        assert_eq!(client.stat("/t").await.unwrap().size, 5000);
        let mut buf = vec![0u8; 10_000];
        assert_eq!(client.pread(fd, &mut buf, 0).await.unwrap(), 5000);
        assert_eq!(&buf[..5000], &data[..5000]);

        client.ftruncate(fd, 8000).await.unwrap();
        assert_eq!(client.pread(fd, &mut buf, 0).await.unwrap(), 8000);
        assert_eq!(&buf[..5000], &data[..5000]);
        assert!(buf[5000..8000].iter().all(|&b| b == 0));
    }

    #[tokio::test]
    async fn test_open_truncate_flag() {
        let dir = tempdir().unwrap();
        let (_transport, client) = cluster(dir.path(), 2);
        let fd = client.open("/o", OpenFlags::CREATE, 0o644).await.unwrap();
        client.write(fd, b"hello").await.unwrap();
        client.close(fd).unwrap();

        let fd = client
            .open("/o", OpenFlags::TRUNC, 0)
            .await
            .unwrap();
        assert_eq!(client.fstat(fd).await.unwrap().size, 0);
        let mut buf = [0u8; 5];
        assert_eq!(client.read(fd, &mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unlink_removes_chunks() {
        let dir = tempdir().unwrap();
        let (transport, client) = cluster(dir.path(), 3);
        let fd = client.open("/gone", OpenFlags::CREATE, 0o644).await.unwrap();
        client.write(fd, &random_bytes(5 * CHUNK as usize)).await.unwrap();
        client.close(fd).unwrap();

        client.unlink("/gone").await.unwrap();
        assert!(client.stat("/gone").await.unwrap_err().is_not_found());
        for host in 0..3 {
            let storage = transport.host(host).unwrap().storage();
            assert!(!storage.layout().chunk_dir("/gone").unwrap().exists());
        }
        assert!(client.unlink("/gone").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_open_errors() {
        let dir = tempdir().unwrap();
        let (_transport, client) = cluster(dir.path(), 2);

        let err = client.open("/missing", OpenFlags::empty(), 0).await.unwrap_err();
        assert!(err.is_not_found());

        client.create("/f", 0o644).await.unwrap();
        let err = client
            .open("/f", OpenFlags::CREATE | OpenFlags::EXCL, 0o644)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
        assert!(client.open("/f", OpenFlags::CREATE, 0o644).await.is_ok());

        assert!(client.create("/nodir/f", 0o644).await.unwrap_err().is_not_found());
        assert!(matches!(
            client.create("/f/child", 0o644).await.unwrap_err(),
            Error::NotADirectory(_)
        ));
        assert!(matches!(
            client.open("relative", OpenFlags::empty(), 0).await.unwrap_err(),
            Error::InvalidArgument(_)
        ));

        let mut buf = [0u8; 1];
        assert!(matches!(
            client.read(9999, &mut buf).await.unwrap_err(),
            Error::BadDescriptor(9999)
        ));
        assert!(matches!(client.close(9999), Err(Error::BadDescriptor(_))));

        client.mkdir("/d", 0o755).await.unwrap();
        let fd = client.open("/d", OpenFlags::empty(), 0).await.unwrap();
        assert!(matches!(
            client.write(fd, b"x").await.unwrap_err(),
            Error::IsADirectory(_)
        ));
    }

    #[tokio::test]
    async fn test_directory_snapshot_isolation() {
        let dir = tempdir().unwrap();
        let (_transport, client) = cluster(dir.path(), 3);
        client.mkdir("/d", 0o755).await.unwrap();
        client.create("/d/b", 0o644).await.unwrap();
        client.create("/d/a", 0o644).await.unwrap();
        client.mkdir("/d/sub", 0o755).await.unwrap();
        client.create("/d/sub/deep", 0o644).await.unwrap();

        let fd = client.opendir("/d").await.unwrap();
        client.create("/d/c", 0o644).await.unwrap();

        let mut names = Vec::new();
        while let Some(entry) = client.readdir(fd).unwrap() {
            names.push((entry.name, entry.file_type));
        }
        assert_eq!(
            names,
            vec![
                ("a".to_string(), FileType::File),
                ("b".to_string(), FileType::File),
                ("sub".to_string(), FileType::Directory),
            ]
        );
        assert_eq!(client.getdent(fd, 0).unwrap().unwrap().name, "a");
        assert!(client.getdent(fd, 3).unwrap().is_none());

        client.lseek(fd, 0, Whence::Set).await.unwrap();
        assert_eq!(client.readdir(fd).unwrap().unwrap().name, "a");
        client.close(fd).unwrap();

        let fd = client.opendir("/d").await.unwrap();
        assert_eq!(client.lseek(fd, 0, Whence::End).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_rmdir() {
        let dir = tempdir().unwrap();
        let (_transport, client) = cluster(dir.path(), 3);
        client.mkdir("/d", 0o755).await.unwrap();
        client.create("/d/f", 0o644).await.unwrap();

        assert!(matches!(
            client.rmdir("/d").await.unwrap_err(),
            Error::DirectoryNotEmpty(_)
        ));
        assert!(matches!(
            client.rmdir("/d/f").await.unwrap_err(),
            Error::NotADirectory(_)
        ));
        assert!(matches!(
            client.unlink("/d").await.unwrap_err(),
            Error::IsADirectory(_)
        ));

        client.unlink("/d/f").await.unwrap();
        client.rmdir("/d").await.unwrap();
        assert!(client.stat("/d").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_partial_directory_listing() {
        let dir = tempdir().unwrap();
        let (transport, client) = cluster(dir.path(), 3);
        client.mkdir("/d", 0o755).await.unwrap();
        for i in 0..12 {
            client.create(&format!("/d/f{i}"), 0o644).await.unwrap();
        }

        let md_host = client.distributor().locate_file_metadata("/d");
        let down = (md_host + 1) % 3;
        let on_down = (0..12)
            .filter(|i| client.distributor().locate_file_metadata(&format!("/d/f{i}")) == down)
            .count();
        transport.set_unreachable(down);

        let fd = client.opendir("/d").await.unwrap();
        let file = client.files().get(fd).unwrap();
        let snapshot = file.dir().unwrap();
        assert!(snapshot.is_partial());
        assert_eq!(snapshot.unreachable_hosts(), &[down]);
        assert_eq!(snapshot.len(), 12 - on_down);

        let err = client.rmdir("/d").await.unwrap_err();
        assert!(err.is_retryable());

        transport.set_reachable(down);
        let fd = client.opendir("/d").await.unwrap();
        let file = client.files().get(fd).unwrap();
        assert!(!file.dir().unwrap().is_partial());
        assert_eq!(file.dir().unwrap().len(), 12);
    }

    #[tokio::test]
    async fn test_statfs_sums_hosts() {
        let dir = tempdir().unwrap();
        let (transport, client) = cluster(dir.path(), 2);
        let stat = client.statfs().await.unwrap();
        assert_eq!(stat.chunk_size, CHUNK);
        assert!(stat.chunk_free <= stat.chunk_total);

        transport.set_unreachable(1);
        assert!(client.statfs().await.is_err());
    }

    #[tokio::test]
    async fn test_local_only_on_second_host_reaches_every_host() {
        let dir = tempdir().unwrap();
        let config = FsConfig {
            chunk_size: CHUNK,
            host_count: 2,
            localhost: 1,
            io_workers: 2,
            distributor: DistributorConfig::LocalOnly,
            ..FsConfig::default()
        };
        let transport = Arc::new(LoopbackTransport::local_cluster(&config, dir.path()).unwrap());
        let client = FsClient::from_config(&config, transport.clone()).unwrap();

        let fd = client.open("/f", OpenFlags::CREATE, 0o644).await.unwrap();
        client.write(fd, &[0xAA; 2 * CHUNK as usize]).await.unwrap();
        client.truncate("/f", 0).await.unwrap();
        client.truncate("/f", 2 * CHUNK).await.unwrap();

        let mut buf = vec![0xFF; 2 * CHUNK as usize];
        assert_eq!(client.pread(fd, &mut buf, 0).await.unwrap(), buf.len());
        assert!(buf.iter().all(|&b| b == 0));
        client.close(fd).unwrap();

        let fd = client.open("/g", OpenFlags::CREATE, 0o644).await.unwrap();
        client.write(fd, b"payload").await.unwrap();
        client.close(fd).unwrap();
        let chunk_dir = transport
            .host(1)
            .unwrap()
            .storage()
            .layout()
            .chunk_dir("/g")
            .unwrap();
        assert!(chunk_dir.exists());
        client.unlink("/g").await.unwrap();
        assert!(!chunk_dir.exists());

        let stat = client.statfs().await.unwrap();
        let one_host = transport.host(0).unwrap().storage().chunk_stat().unwrap();
        assert_eq!(stat.chunk_total, 2 * one_host.chunk_total);
    }

    #[tokio::test]
    async fn test_write_past_u64_max_rejected() {
        let dir = tempdir().unwrap();
        let (_transport, client) = cluster(dir.path(), 2);
        let fd = client.open("/edge", OpenFlags::CREATE, 0o644).await.unwrap();

        let err = client.pwrite(fd, &[1u8; 8], u64::MAX - 4).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(client.get_size("/edge").await.unwrap(), 0);
        assert_eq!(client.pwrite(fd, &[1u8; 4], u64::MAX - 4).await.unwrap(), 4);
        assert_eq!(client.get_size("/edge").await.unwrap(), u64::MAX);
        client.close(fd).unwrap();
    }

    #[test]
    fn test_open_flags_from_posix() {
        let flags = OpenFlags::from_posix(libc::O_WRONLY | libc::O_CREAT | libc::O_APPEND);
        assert_eq!(flags, OpenFlags::CREATE | OpenFlags::APPEND);
        assert_eq!(OpenFlags::from_posix(libc::O_RDONLY), OpenFlags::empty());
    }

    #[test]
    fn test_rejects_distributor_wider_than_transport() {
        let dir = tempdir().unwrap();
        let config = FsConfig {
            chunk_size: CHUNK,
            host_count: 2,
            io_workers: 1,
            ..FsConfig::default()
        };
        let transport = Arc::new(LoopbackTransport::local_cluster(&config, dir.path()).unwrap());
        let wider = FsConfig {
            host_count: 3,
            ..config
        };
        assert!(matches!(
            FsClient::from_config(&wider, transport),
            Err(Error::Configuration(_))
        ));
    }
}
