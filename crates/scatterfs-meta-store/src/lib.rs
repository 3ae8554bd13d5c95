//! ScatterFS Metadata Store - per-host metadentries
//!
//! This crate implements the metadata side of a host:
//! - Merge operands and the commutative size fold
//! - A key-value capability with in-memory and redb-backed stores
//! - The metadentry service (create/stat/update/remove/list)

pub mod kv;
pub mod merge;
pub mod metadentry;
pub mod store;
pub mod tables;

// Re-exports
pub use kv::{KvStore, MemoryKv};
pub use merge::{MergeOperand, MergeOperator, MetadataMergeOperator};
pub use metadentry::MetadentryService;
pub use store::{MetaStore, MetaStoreError, MetaStoreResult};
