//! Request/response vocabulary between clients and hosts
//!
//! The transport itself is pluggable: it only has to deliver opaque request
//! bytes to the host chosen by the distributor and hand back the opaque
//! response bytes. Messages are bincode-encoded.

use crate::error::{Error, Result, RpcError};
use crate::metadata::{FieldMask, Metadata};
use crate::types::{ChunkId, ChunkStat, Dirent, DirentExtended, HostId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Delivers opaque request bytes to a host and returns its response bytes.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Number of hosts reachable through this transport
    fn host_count(&self) -> u32;

    /// Send a request to `host` and wait for the response
    async fn send(&self, host: HostId, request: Vec<u8>) -> Result<Vec<u8>>;
}

/// A chunk-local write
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkWrite {
    pub chunk_id: ChunkId,
    pub offset_in_chunk: u64,
    pub data: Vec<u8>,
}

/// A chunk-local read
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRead {
    pub chunk_id: ChunkId,
    pub offset_in_chunk: u64,
    pub len: u64,
}

/// Data returned for one [`ChunkRead`]. `data` always has the requested
/// length; bytes past `bytes_read` are zero.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkData {
    pub chunk_id: ChunkId,
    pub bytes_read: u64,
    pub data: Vec<u8>,
}

/// Requests served by a host
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    // Metadata
    Create { path: String, metadata: Metadata },
    Stat { path: String },
    GetSize { path: String },
    Update { path: String, metadata: Metadata, mask: FieldMask },
    UpdateSize { path: String, io_size: u64, offset: u64, append: bool },
    DecreaseSize { path: String, size: u64 },
    Remove { path: String },
    GetDirents { path: String },
    GetDirentsExtended { path: String },

    // Data
    WriteData { path: String, chunks: Vec<ChunkWrite> },
    ReadData { path: String, chunks: Vec<ChunkRead> },
    TruncateData { path: String, size: u64 },
    RemoveData { path: String },
    ChunkStat,
}

/// Responses to [`Request`]s
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    Ok,
    Metadata(Metadata),
    Size(u64),
    Dirents(Vec<Dirent>),
    DirentsExtended(Vec<DirentExtended>),
    Written(u64),
    Read(Vec<ChunkData>),
    ChunkStat(ChunkStat),
    Error(RpcError),
}

impl Request {
    /// Short name for logging
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Stat { .. } => "stat",
            Self::GetSize { .. } => "get_size",
            Self::Update { .. } => "update",
            Self::UpdateSize { .. } => "update_size",
            Self::DecreaseSize { .. } => "decrease_size",
            Self::Remove { .. } => "remove",
            Self::GetDirents { .. } => "get_dirents",
            Self::GetDirentsExtended { .. } => "get_dirents_extended",
            Self::WriteData { .. } => "write_data",
            Self::ReadData { .. } => "read_data",
            Self::TruncateData { .. } => "truncate_data",
            Self::RemoveData { .. } => "remove_data",
            Self::ChunkStat => "chunk_stat",
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

impl Response {
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }

    /// Turn a handler outcome into a response
    #[must_use]
    pub fn from_result(result: Result<Self>) -> Self {
        result.unwrap_or_else(|e| Self::Error(RpcError::from(&e)))
    }

    /// Surface a remote error as a local one
    pub fn into_result(self, host: HostId) -> Result<Self> {
        match self {
            Self::Error(err) => Err(Error::from_rpc(host, err)),
            other => Ok(other),
        }
    }
}

/// Encode `request`, send it to `host` and decode the reply, turning remote
/// errors into local ones.
pub async fn call(transport: &dyn Transport, host: HostId, request: &Request) -> Result<Response> {
    let reply = transport.send(host, request.encode()?).await?;
    Response::decode(&reply)?.into_result(host)
}
