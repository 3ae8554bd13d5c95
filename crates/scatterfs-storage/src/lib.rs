//! ScatterFS Storage Engine - chunk files on the local file system
//!
//! This crate implements the per-host data store:
//! - Chunk layout (bucketed, reproducible from the path alone)
//! - Chunk read/write with sparse-file semantics
//! - Truncation and removal of a file's chunk space
//! - Capacity statistics from the backing file system
//! - A bounded worker pool for parallel chunk I/O

pub mod chunk;
pub mod io_pool;
pub mod layout;

// Re-exports
pub use chunk::{ChunkStorage, ChunkStorageStats};
pub use io_pool::{IoPool, sum_transferred};
pub use layout::{BUCKET_COUNT, ChunkLayout};
