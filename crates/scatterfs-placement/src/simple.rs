//! Stateless distributors
//!
//! [`SimpleHashDistributor`] spreads records and chunks over all hosts by
//! hashing; [`LocalOnlyDistributor`] pins everything to the local node.

use crate::distributor::{Distributor, check_host_count};
use scatterfs_common::hash::{chunk_hash, path_hash};
use scatterfs_common::{ChunkId, HostId, Result};

/// Hash based placement over `[0, host_count)`
#[derive(Debug, Clone)]
pub struct SimpleHashDistributor {
    localhost: HostId,
    host_count: u32,
    all_hosts: Vec<HostId>,
}

impl SimpleHashDistributor {
    /// Create a distributor. Fails if `host_count` is zero.
    pub fn new(localhost: HostId, host_count: u32) -> Result<Self> {
        check_host_count(host_count)?;
        Ok(Self {
            localhost,
            host_count,
            all_hosts: (0..host_count).collect(),
        })
    }
}

impl Distributor for SimpleHashDistributor {
    fn localhost(&self) -> HostId {
        self.localhost
    }

    fn host_count(&self) -> u32 {
        self.host_count
    }

    fn locate_file_metadata(&self, path: &str) -> HostId {
        (path_hash(path) % u64::from(self.host_count)) as HostId
    }

    fn locate_directory_metadata(&self, _path: &str) -> Vec<HostId> {
        self.all_hosts.clone()
    }

    fn locate_data(&self, path: &str, chunk_id: ChunkId) -> HostId {
        (chunk_hash(path, chunk_id) % u64::from(self.host_count)) as HostId
    }
}

/// Every query answers with the local host
#[derive(Debug, Clone, Copy)]
pub struct LocalOnlyDistributor {
    localhost: HostId,
}

impl LocalOnlyDistributor {
    #[must_use]
    pub const fn new(localhost: HostId) -> Self {
        Self { localhost }
    }
}

impl Distributor for LocalOnlyDistributor {
    fn localhost(&self) -> HostId {
        self.localhost
    }

    fn host_count(&self) -> u32 {
        1
    }

    fn locate_file_metadata(&self, _path: &str) -> HostId {
        self.localhost
    }

    fn locate_directory_metadata(&self, _path: &str) -> Vec<HostId> {
        vec![self.localhost]
    }

    fn locate_data(&self, _path: &str, _chunk_id: ChunkId) -> HostId {
        self.localhost
    }
}
