//! ScatterFS Client - File operations over a set of hosts
//!
//! This crate provides:
//! - [`FsClient`]: open/read/write/stat and directory calls routed through a
//!   distributor and a transport
//! - [`OpenFileMap`]: descriptors that are real, unique kernel descriptor
//!   numbers mapped to remote paths
//! - [`OpenDir`]: directory snapshots taken at open time

pub mod client;
pub mod file_map;
pub mod open_dir;

pub use client::{FsClient, OpenFlags, Whence};
pub use file_map::{OpenFile, OpenFileMap};
pub use open_dir::{DirEntry, OpenDir};
