//! Daemon context
//!
//! Everything one host needs to serve requests, built once at startup and
//! passed by reference. There is no process-global state.

use scatterfs_common::{FsConfig, HostId, Result};
use scatterfs_meta_store::{KvStore, MemoryKv, MetaStore, MetadataMergeOperator, MetadentryService};
use scatterfs_placement::{Distributor, build_distributor};
use scatterfs_storage::{ChunkStorage, IoPool};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Permission bits of the root directory record
const ROOT_PERMISSIONS: u32 = 0o755;

/// Request counters of one host
#[derive(Debug, Default)]
pub struct DaemonStats {
    pub requests: AtomicU64,
    pub errors: AtomicU64,
    pub bytes_written: AtomicU64,
    pub bytes_read: AtomicU64,
}

impl DaemonStats {
    pub fn record(&self, success: bool) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// State of one serving host
pub struct DaemonContext {
    pub(crate) config: FsConfig,
    pub(crate) distributor: Arc<dyn Distributor>,
    pub(crate) metadentries: MetadentryService,
    pub(crate) storage: Arc<ChunkStorage>,
    pub(crate) io_pool: IoPool,
    pub(crate) stats: DaemonStats,
}

impl DaemonContext {
    /// Open a host with its redb metadata store and chunk directory
    pub fn open(config: FsConfig) -> Result<Self> {
        config.validate()?;
        let store = MetaStore::open(&config.metadata_file, Arc::new(MetadataMergeOperator))?;
        info!(
            "Host {} metadata at {}",
            config.localhost,
            config.metadata_file.display()
        );
        Self::with_store(config, Arc::new(store))
    }

    /// Open a host whose metadata lives only in memory
    pub fn open_in_memory(config: FsConfig) -> Result<Self> {
        config.validate()?;
        Self::with_store(config, Arc::new(MemoryKv::new(Arc::new(MetadataMergeOperator))))
    }

    /// Open a host on top of an existing key-value store
    pub fn with_store(config: FsConfig, kv: Arc<dyn KvStore>) -> Result<Self> {
        let distributor = build_distributor(&config)?;
        let storage = ChunkStorage::open(&config.root_dir, config.chunk_size)?;
        let io_pool = IoPool::new(config.io_workers)?;

        let metadentries = MetadentryService::new(kv);
        metadentries.ensure_root(ROOT_PERMISSIONS)?;

        info!(
            "Host {}/{} ready: chunks at {}, chunk size {}, {} I/O workers",
            config.localhost,
            config.host_count,
            config.root_dir.display(),
            config.chunk_size,
            config.io_workers
        );

        Ok(Self {
            config,
            distributor,
            metadentries,
            storage: Arc::new(storage),
            io_pool,
            stats: DaemonStats::default(),
        })
    }

    pub fn host(&self) -> HostId {
        self.config.localhost
    }

    pub const fn config(&self) -> &FsConfig {
        &self.config
    }

    pub fn distributor(&self) -> &Arc<dyn Distributor> {
        &self.distributor
    }

    pub const fn metadentries(&self) -> &MetadentryService {
        &self.metadentries
    }

    pub fn storage(&self) -> &Arc<ChunkStorage> {
        &self.storage
    }

    pub const fn stats(&self) -> &DaemonStats {
        &self.stats
    }
}
