//! Configuration types for ScatterFS
//!
//! A configuration is fixed for the lifetime of a mount: host count, chunk
//! size and distributor are never changed on a running deployment.

use crate::arithmetic::is_power_of_2;
use crate::error::{Error, Result};
use crate::types::{DEFAULT_CHUNK_SIZE, HostId};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration of one ScatterFS host
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FsConfig {
    /// Chunk size in bytes (power of two)
    pub chunk_size: u64,
    /// Number of hosts in the deployment
    pub host_count: u32,
    /// Identity of this host
    pub localhost: HostId,
    /// Data placement strategy
    pub distributor: DistributorConfig,
    /// Directory holding this host's chunk files
    pub root_dir: PathBuf,
    /// Metadata database file
    pub metadata_file: PathBuf,
    /// Threads in the chunk I/O worker pool
    pub io_workers: usize,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            host_count: 1,
            localhost: 0,
            distributor: DistributorConfig::default(),
            root_dir: PathBuf::from("/var/lib/scatterfs/chunks"),
            metadata_file: PathBuf::from("/var/lib/scatterfs/metadata.redb"),
            io_workers: 8,
        }
    }
}

impl FsConfig {
    /// Load a configuration from a TOML file and validate it
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&text)
            .map_err(|e| Error::Configuration(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that could not be served
    pub fn validate(&self) -> Result<()> {
        if self.host_count == 0 {
            return Err(Error::Configuration("host_count must be at least 1".into()));
        }
        if self.localhost >= self.host_count {
            return Err(Error::Configuration(format!(
                "localhost {} out of range for {} hosts",
                self.localhost, self.host_count
            )));
        }
        if !is_power_of_2(self.chunk_size) {
            return Err(Error::Configuration(format!(
                "chunk_size {} is not a power of two",
                self.chunk_size
            )));
        }
        if self.io_workers == 0 {
            return Err(Error::Configuration("io_workers must be at least 1".into()));
        }
        Ok(())
    }
}

/// Distributor selection
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DistributorConfig {
    /// `hash(path) mod host_count`
    #[default]
    Hash,
    /// Everything on the local host
    LocalOnly,
    /// Explicit override table with hashed fallback
    Guided {
        /// Mapping file with `path chunk_id host` lines
        mapping: PathBuf,
    },
}
