//! Request dispatch
//!
//! Decodes a request, runs it against the local metadentry service or the
//! chunk store and encodes the response. Failures travel back inside the
//! response as [`Response::Error`].

use crate::context::DaemonContext;
use scatterfs_common::rpc::{ChunkData, ChunkRead, ChunkWrite};
use scatterfs_common::{Error, Request, Response, Result, RpcError};
use scatterfs_storage::sum_transferred;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::{debug, trace, warn};

impl DaemonContext {
    /// Serve one encoded request and return the encoded response
    pub async fn handle(&self, request: &[u8]) -> Vec<u8> {
        let response = match Request::decode(request) {
            Ok(request) => self.dispatch(request).await,
            Err(e) => {
                warn!(host = self.host(), "Undecodable request: {}", e);
                self.stats.record(false);
                Response::Error(RpcError::from(&e))
            }
        };

        response.encode().unwrap_or_else(|e| {
            Response::Error(RpcError::from(&e))
                .encode()
                .unwrap_or_default()
        })
    }

    /// Serve one decoded request
    pub async fn dispatch(&self, request: Request) -> Response {
        let name = request.name();
        trace!(host = self.host(), request = name, "Dispatching");
        let result = self.execute(request).await;
        if let Err(e) = &result {
            debug!(host = self.host(), request = name, "Request failed: {}", e);
        }
        self.stats.record(result.is_ok());
        Response::from_result(result)
    }

    async fn execute(&self, request: Request) -> Result<Response> {
        let md = &self.metadentries;
        match request {
            Request::Create { path, metadata } => {
                md.create(&path, metadata)?;
                Ok(Response::Ok)
            }
            Request::Stat { path } => Ok(Response::Metadata(md.get(&path)?)),
            Request::GetSize { path } => Ok(Response::Size(md.get_size(&path)?)),
            Request::Update {
                path,
                metadata,
                mask,
            } => Ok(Response::Metadata(md.update(&path, &metadata, mask)?)),
            Request::UpdateSize {
                path,
                io_size,
                offset,
                append,
            } => Ok(Response::Size(md.update_size(&path, io_size, offset, append)?)),
            Request::DecreaseSize { path, size } => {
                Ok(Response::Size(md.decrease_size(&path, size)?))
            }
            Request::Remove { path } => Ok(Response::Metadata(md.remove(&path)?)),
            Request::GetDirents { path } => Ok(Response::Dirents(md.get_dirents(&path)?)),
            Request::GetDirentsExtended { path } => {
                Ok(Response::DirentsExtended(md.get_dirents_extended(&path)?))
            }
            Request::WriteData { path, chunks } => {
                Ok(Response::Written(self.write_data(path, chunks).await?))
            }
            Request::ReadData { path, chunks } => {
                Ok(Response::Read(self.read_data(path, chunks).await?))
            }
            Request::TruncateData { path, size } => {
                let storage = Arc::clone(&self.storage);
                self.io_pool
                    .run(move || storage.truncate_space(&path, size))
                    .await?;
                Ok(Response::Ok)
            }
            Request::RemoveData { path } => {
                let storage = Arc::clone(&self.storage);
                self.io_pool
                    .run(move || storage.destroy_space(&path))
                    .await?;
                Ok(Response::Ok)
            }
            Request::ChunkStat => {
                let storage = Arc::clone(&self.storage);
                Ok(Response::ChunkStat(
                    self.io_pool.run(move || storage.chunk_stat()).await?,
                ))
            }
        }
    }

    /// Write chunk pieces in parallel and return the total bytes written.
    ///
    /// A failed piece fails the request; pieces already written stay on disk.
    async fn write_data(&self, path: String, chunks: Vec<ChunkWrite>) -> Result<u64> {
        self.check_ownership(&path, chunks.iter().map(|c| c.chunk_id));
        let total: u64 = chunks.iter().map(|c| c.data.len() as u64).sum();
        let storage = Arc::clone(&self.storage);
        self.io_pool
            .run(move || storage.ensure_capacity(total))
            .await?;

        let path: Arc<str> = Arc::from(path);
        let jobs: Vec<_> = chunks
            .into_iter()
            .map(|chunk| {
                let storage = Arc::clone(&self.storage);
                let path = Arc::clone(&path);
                move || storage.write_chunk(&path, chunk.chunk_id, &chunk.data, chunk.offset_in_chunk)
            })
            .collect();

        let written = sum_transferred(self.io_pool.run_all(jobs).await)?;
        self.stats.bytes_written.fetch_add(written, Ordering::Relaxed);
        debug!(path = &*path, written, "Wrote chunks");
        Ok(written)
    }

    /// Read chunk pieces in parallel. Holes come back as zeros.
    async fn read_data(&self, path: String, chunks: Vec<ChunkRead>) -> Result<Vec<ChunkData>> {
        self.check_ownership(&path, chunks.iter().map(|c| c.chunk_id));
        let chunk_size = self.storage.chunk_size();
        if let Some(bad) = chunks.iter().find(|c| {
            c.offset_in_chunk
                .checked_add(c.len)
                .is_none_or(|end| end > chunk_size)
        }) {
            return Err(Error::invalid_argument(format!(
                "read of chunk {} crosses the chunk boundary",
                bad.chunk_id
            )));
        }

        let path: Arc<str> = Arc::from(path);
        let jobs: Vec<_> = chunks
            .into_iter()
            .map(|chunk| {
                let storage = Arc::clone(&self.storage);
                let path = Arc::clone(&path);
                move || -> Result<ChunkData> {
                    let mut data = vec![0u8; chunk.len as usize];
                    let bytes_read =
                        storage.read_chunk(&path, chunk.chunk_id, &mut data, chunk.offset_in_chunk)?;
                    Ok(ChunkData {
                        chunk_id: chunk.chunk_id,
                        bytes_read,
                        data,
                    })
                }
            })
            .collect();

        let pieces = self
            .io_pool
            .run_all(jobs)
            .await
            .into_iter()
            .collect::<Result<Vec<_>>>()?;
        let read: u64 = pieces.iter().map(|p| p.bytes_read).sum();
        self.stats.bytes_read.fetch_add(read, Ordering::Relaxed);
        Ok(pieces)
    }

    /// Log chunks that the distributor would not place on this host
    fn check_ownership(&self, path: &str, chunk_ids: impl Iterator<Item = u64>) {
        for chunk_id in chunk_ids {
            let owner = self.distributor.locate_data(path, chunk_id);
            if owner != self.host() {
                warn!(
                    path,
                    chunk_id,
                    owner,
                    host = self.host(),
                    "Serving chunk owned by another host"
                );
            }
        }
    }
}
