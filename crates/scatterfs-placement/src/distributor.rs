//! Distributor capability and factory

use crate::guided::GuidedDistributor;
use crate::simple::{LocalOnlyDistributor, SimpleHashDistributor};
use scatterfs_common::{ChunkId, DistributorConfig, Error, FsConfig, HostId, Result};
use std::fmt;
use std::sync::Arc;

/// Maps paths and chunks to owning hosts.
///
/// All queries are side-effect free for a fixed configuration.
pub trait Distributor: Send + Sync + fmt::Debug {
    /// Identity of the current node
    fn localhost(&self) -> HostId;

    /// Number of hosts placement is spread over
    fn host_count(&self) -> u32;

    /// Owner of the metadata record of a file or directory
    fn locate_file_metadata(&self, path: &str) -> HostId;

    /// Hosts that may hold entries of a directory.
    ///
    /// Children hash independently of their parent, so a full listing has
    /// to fan out to every returned host and merge the results.
    fn locate_directory_metadata(&self, path: &str) -> Vec<HostId>;

    /// Owner of one chunk of file content
    fn locate_data(&self, path: &str, chunk_id: ChunkId) -> HostId;
}

/// Reject a host count of zero at configuration time
pub(crate) fn check_host_count(host_count: u32) -> Result<()> {
    if host_count == 0 {
        return Err(Error::Configuration(
            "distributor requires at least one host".into(),
        ));
    }
    Ok(())
}

/// Build the distributor selected by the configuration
pub fn build_distributor(config: &FsConfig) -> Result<Arc<dyn Distributor>> {
    let distributor: Arc<dyn Distributor> = match &config.distributor {
        DistributorConfig::Hash => Arc::new(SimpleHashDistributor::new(
            config.localhost,
            config.host_count,
        )?),
        DistributorConfig::LocalOnly => Arc::new(LocalOnlyDistributor::new(config.localhost)),
        DistributorConfig::Guided { mapping } => Arc::new(GuidedDistributor::from_file(
            config.localhost,
            config.host_count,
            mapping,
        )?),
    };
    Ok(distributor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_hash_distributor() {
        let config = FsConfig {
            host_count: 3,
            localhost: 1,
            ..FsConfig::default()
        };
        let d = build_distributor(&config).unwrap();
        assert_eq!(d.localhost(), 1);
        assert_eq!(d.host_count(), 3);
        assert_eq!(d.locate_directory_metadata("/"), vec![0, 1, 2]);
    }

    #[test]
    fn test_build_rejects_zero_hosts() {
        let config = FsConfig {
            host_count: 0,
            ..FsConfig::default()
        };
        assert!(matches!(
            build_distributor(&config),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_build_guided_without_mapping_file_fails() {
        let config = FsConfig {
            host_count: 2,
            distributor: DistributorConfig::Guided {
                mapping: "/nonexistent/guided.txt".into(),
            },
            ..FsConfig::default()
        };
        assert!(build_distributor(&config).is_err());
    }
}
