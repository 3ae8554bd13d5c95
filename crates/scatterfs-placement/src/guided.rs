//! Guided placement
//!
//! An operator-supplied mapping pins individual chunks to hosts, for
//! example to keep the hot chunks of a shared checkpoint file on separate
//! nodes. Everything not covered by the mapping falls back to hashing.
//!
//! # Mapping format
//!
//! Plain text, one entry per line, fields separated by whitespace:
//!
//! ```text
//! /t.c01 0 3        # chunk 0 of /t.c01 lives on host 3
//! /t.c01 1 3
//! #/mdtest-hard/    # data under this prefix follows its metadata host
//! ```
//!
//! Blank lines are ignored. When the same `(path, chunk)` appears more than
//! once the first entry wins.

use crate::distributor::{Distributor, check_host_count};
use scatterfs_common::hash::chunk_hash;
use scatterfs_common::{ChunkId, Error, HostId, Result};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use tracing::{debug, info, warn};

/// Chunk used as the placement key of a file's metadata record
const METADATA_CHUNK: ChunkId = 0;

/// Parsed override table
#[derive(Debug, Clone, Default)]
pub struct GuidedMapping {
    chunks: HashMap<String, HashMap<ChunkId, HostId>>,
    prefixes: Vec<String>,
}

impl GuidedMapping {
    /// Parse a mapping from any reader
    pub fn parse<R: Read>(reader: R) -> Result<Self> {
        let mut mapping = Self::default();
        for (idx, line) in BufReader::new(reader).lines().enumerate() {
            let line = line?;
            let mut fields = line.split_whitespace();
            let Some(path) = fields.next() else {
                continue;
            };

            if let Some(prefix) = path.strip_prefix('#') {
                if !prefix.is_empty() {
                    mapping.prefixes.push(prefix.to_string());
                }
                continue;
            }

            let (Some(chunk), Some(host)) = (fields.next(), fields.next()) else {
                return Err(Error::Configuration(format!(
                    "guided mapping line {}: expected `path chunk host`",
                    idx + 1
                )));
            };
            let chunk: ChunkId = chunk.parse().map_err(|_| {
                Error::Configuration(format!("guided mapping line {}: bad chunk id", idx + 1))
            })?;
            let host: HostId = host.parse().map_err(|_| {
                Error::Configuration(format!("guided mapping line {}: bad host id", idx + 1))
            })?;

            match mapping
                .chunks
                .entry(path.to_string())
                .or_default()
                .entry(chunk)
            {
                Entry::Vacant(slot) => {
                    slot.insert(host);
                }
                Entry::Occupied(existing) => {
                    debug!(
                        "Ignoring duplicate mapping for {}:{} (kept host {})",
                        path,
                        chunk,
                        existing.get()
                    );
                }
            }
        }
        Ok(mapping)
    }

    /// Override for one chunk, if any
    #[must_use]
    pub fn lookup(&self, path: &str, chunk_id: ChunkId) -> Option<HostId> {
        self.chunks.get(path)?.get(&chunk_id).copied()
    }

    /// Whether the path falls under a colocation prefix
    #[must_use]
    pub fn has_prefix(&self, path: &str) -> bool {
        self.prefixes.iter().any(|p| path.starts_with(p.as_str()))
    }

    /// Number of explicit chunk overrides
    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.values().map(HashMap::len).sum()
    }

    /// Whether the mapping holds neither chunk overrides nor prefixes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty() && self.prefixes.is_empty()
    }
}

/// Override table in front of hash placement
#[derive(Debug, Clone)]
pub struct GuidedDistributor {
    localhost: HostId,
    host_count: u32,
    all_hosts: Vec<HostId>,
    mapping: GuidedMapping,
}

impl GuidedDistributor {
    /// Create a distributor from an already parsed mapping.
    ///
    /// Overrides that name a host outside `[0, host_count)` are dropped.
    pub fn new(localhost: HostId, host_count: u32, mut mapping: GuidedMapping) -> Result<Self> {
        check_host_count(host_count)?;

        for (path, chunks) in &mut mapping.chunks {
            chunks.retain(|chunk, host| {
                let keep = *host < host_count;
                if !keep {
                    warn!(
                        "Dropping guided mapping {}:{} -> {}: only {} hosts",
                        path, chunk, host, host_count
                    );
                }
                keep
            });
        }
        mapping.chunks.retain(|_, chunks| !chunks.is_empty());

        Ok(Self {
            localhost,
            host_count,
            all_hosts: (0..host_count).collect(),
            mapping,
        })
    }

    /// Load the mapping file and create a distributor
    pub fn from_file(localhost: HostId, host_count: u32, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| {
            Error::Configuration(format!(
                "cannot open guided mapping {}: {e}",
                path.display()
            ))
        })?;
        let mapping = GuidedMapping::parse(file)?;
        info!(
            "Loaded guided mapping from {}: {} chunk overrides, {} prefixes",
            path.display(),
            mapping.len(),
            mapping.prefixes.len()
        );
        Self::new(localhost, host_count, mapping)
    }

    #[must_use]
    pub const fn mapping(&self) -> &GuidedMapping {
        &self.mapping
    }

    fn fallback(&self, path: &str, chunk_id: ChunkId) -> HostId {
        (chunk_hash(path, chunk_id) % u64::from(self.host_count)) as HostId
    }
}

impl Distributor for GuidedDistributor {
    fn localhost(&self) -> HostId {
        self.localhost
    }

    fn host_count(&self) -> u32 {
        self.host_count
    }

    fn locate_file_metadata(&self, path: &str) -> HostId {
        self.mapping
            .lookup(path, METADATA_CHUNK)
            .unwrap_or_else(|| self.fallback(path, METADATA_CHUNK))
    }

    fn locate_directory_metadata(&self, _path: &str) -> Vec<HostId> {
        self.all_hosts.clone()
    }

    fn locate_data(&self, path: &str, chunk_id: ChunkId) -> HostId {
        if let Some(host) = self.mapping.lookup(path, chunk_id) {
            return host;
        }
        if self.mapping.has_prefix(path) {
            return self.locate_file_metadata(path);
        }
        self.fallback(path, chunk_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CHECKPOINT_MAPPING: &str = "\
/t.c01 0 3
/t.c02 0 3
/t.c01 1 3
/t.c02 1 3
/t.c01 2 3
/t.c02 2 3
/t.c03 1 3
/t.c04 1 3
/t.c05 1 3
/t.c06 1 3
/t.c07 1 3
";

    const PATHS: [&str; 7] = [
        "/t.c01", "/t.c02", "/t.c03", "/t.c04", "/t.c05", "/t.c06", "/t.c07",
    ];

    fn checkpoint_distributor() -> GuidedDistributor {
        let mapping = GuidedMapping::parse(CHECKPOINT_MAPPING.as_bytes()).unwrap();
        GuidedDistributor::new(0, 10, mapping).unwrap()
    }

    #[test]
    fn test_mapped_chunks_follow_overrides() {
        let d = checkpoint_distributor();
        for path in PATHS {
            assert_eq!(d.locate_data(path, 1), 3, "{path}");
        }
        assert_eq!(d.mapping().len(), 11);
    }

    #[test]
    fn test_unmapped_chunks_fall_back_deterministically() {
        let d = checkpoint_distributor();
        let hosts: Vec<HostId> = PATHS.iter().map(|p| d.locate_data(p, 5)).collect();
        assert_eq!(hosts, vec![6, 4, 2, 9, 9, 7, 5]);
        assert_eq!(hosts.iter().sum::<u32>(), 42);

        // Same answer from an independently built instance
        let again = checkpoint_distributor();
        for path in PATHS {
            assert_eq!(d.locate_data(path, 5), again.locate_data(path, 5));
        }
    }

    #[test]
    fn test_metadata_uses_chunk_zero_rule() {
        let d = checkpoint_distributor();
        assert_eq!(d.locate_file_metadata("/t.c01"), 3);
        assert_eq!(d.locate_file_metadata("/t.c02"), 3);
        // /t.c03 has no chunk 0 override
        assert_eq!(d.locate_file_metadata("/t.c03"), 9);
        assert_eq!(d.locate_directory_metadata("/").len(), 10);
    }

    #[test]
    fn test_first_entry_wins() {
        let mapping = GuidedMapping::parse("/f 0 1\n/f 0 2\n".as_bytes()).unwrap();
        let d = GuidedDistributor::new(0, 4, mapping).unwrap();
        assert_eq!(d.locate_data("/f", 0), 1);
    }

    #[test]
    fn test_prefix_colocates_data_with_metadata() {
        let mapping = GuidedMapping::parse("#/mdtest-hard/ 10 10\n\n".as_bytes()).unwrap();
        let d = GuidedDistributor::new(0, 16, mapping).unwrap();
        let path = "/mdtest-hard/file.17";
        let md_host = d.locate_file_metadata(path);
        for chunk in 0..32 {
            assert_eq!(d.locate_data(path, chunk), md_host);
        }
        assert!(!d.mapping().has_prefix("/other/file"));
        assert_eq!(d.mapping().len(), 0);
        assert!(!d.mapping().is_empty());
        assert!(GuidedMapping::default().is_empty());
    }

    #[test]
    fn test_out_of_range_hosts_dropped() {
        let mapping = GuidedMapping::parse("/f 0 12\n".as_bytes()).unwrap();
        let d = GuidedDistributor::new(0, 4, mapping).unwrap();
        assert!(d.mapping().is_empty());
        assert!(d.locate_data("/f", 0) < 4);
    }

    #[test]
    fn test_malformed_line_rejected() {
        let err = GuidedMapping::parse("/f 0\n".as_bytes()).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        let err = GuidedMapping::parse("/f x 1\n".as_bytes()).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CHECKPOINT_MAPPING.as_bytes()).unwrap();
        let d = GuidedDistributor::from_file(1, 10, file.path()).unwrap();
        assert_eq!(d.localhost(), 1);
        assert_eq!(d.locate_data("/t.c07", 1), 3);
    }

    #[test]
    fn test_zero_hosts_rejected() {
        assert!(GuidedDistributor::new(0, 0, GuidedMapping::default()).is_err());
    }
}
