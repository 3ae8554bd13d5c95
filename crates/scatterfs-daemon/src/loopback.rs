//! In-process transport
//!
//! Delivers requests straight to [`DaemonContext`]s living in the same
//! process. Used for single-process deployments, the CLI and end-to-end
//! tests. Hosts can be marked unreachable to exercise degraded paths.

use crate::context::DaemonContext;
use async_trait::async_trait;
use parking_lot::RwLock;
use scatterfs_common::{Error, FsConfig, HostId, Result, Transport};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Transport over daemons in the current process
pub struct LoopbackTransport {
    hosts: Vec<Arc<DaemonContext>>,
    unreachable: RwLock<HashSet<HostId>>,
}

impl LoopbackTransport {
    /// Wrap daemons; the position in `hosts` is the host id
    pub fn new(hosts: Vec<Arc<DaemonContext>>) -> Result<Self> {
        for (idx, host) in hosts.iter().enumerate() {
            if host.host() as usize != idx {
                return Err(Error::Configuration(format!(
                    "daemon at position {idx} identifies as host {}",
                    host.host()
                )));
            }
        }
        Ok(Self {
            hosts,
            unreachable: RwLock::new(HashSet::new()),
        })
    }

    /// Start `config.host_count` daemons below `base_dir`, one directory
    /// per host, all sharing the rest of `config`.
    pub fn local_cluster(config: &FsConfig, base_dir: &Path) -> Result<Self> {
        let hosts = (0..config.host_count)
            .map(|host| {
                let host_dir = base_dir.join(format!("host-{host}"));
                let host_config = FsConfig {
                    localhost: host,
                    root_dir: host_dir.join("chunks"),
                    metadata_file: host_dir.join("metadata.redb"),
                    ..config.clone()
                };
                DaemonContext::open(host_config).map(Arc::new)
            })
            .collect::<Result<Vec<_>>>()?;
        info!(
            "Started local cluster of {} hosts at {}",
            hosts.len(),
            base_dir.display()
        );
        Self::new(hosts)
    }

    pub fn host(&self, host: HostId) -> Option<&Arc<DaemonContext>> {
        self.hosts.get(host as usize)
    }

    /// Make `host` fail every request until [`Self::set_reachable`]
    pub fn set_unreachable(&self, host: HostId) {
        self.unreachable.write().insert(host);
    }

    pub fn set_reachable(&self, host: HostId) {
        self.unreachable.write().remove(&host);
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    fn host_count(&self) -> u32 {
        self.hosts.len() as u32
    }

    async fn send(&self, host: HostId, request: Vec<u8>) -> Result<Vec<u8>> {
        if self.unreachable.read().contains(&host) {
            return Err(Error::Transport {
                host,
                message: "host marked unreachable".into(),
            });
        }
        let daemon = self.hosts.get(host as usize).ok_or_else(|| Error::Transport {
            host,
            message: "no such host".into(),
        })?;
        Ok(daemon.handle(&request).await)
    }
}
