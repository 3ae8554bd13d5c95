//! ScatterFS Common - Shared types and utilities
//!
//! This crate provides common types, error definitions, configuration,
//! block arithmetic and the request/response vocabulary used across all
//! ScatterFS components.

pub mod arithmetic;
pub mod config;
pub mod error;
pub mod hash;
pub mod metadata;
pub mod rpc;
pub mod types;

pub use config::{DistributorConfig, FsConfig};
pub use error::{Error, ErrorCode, Result, RpcError};
pub use hash::placement_hash;
pub use metadata::{FieldMask, Metadata};
pub use rpc::{Request, Response, Transport};
pub use types::*;
