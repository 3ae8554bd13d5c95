//! Error types for ScatterFS
//!
//! This module defines the common error types used throughout the system,
//! and the compact error code that crosses the transport.

use crate::types::HostId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Common result type for ScatterFS operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for ScatterFS
#[derive(Debug, Error)]
pub enum Error {
    // Metadata errors
    #[error("no such file or directory: {0}")]
    NotFound(String),

    #[error("file exists: {0}")]
    AlreadyExists(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("is a directory: {0}")]
    IsADirectory(String),

    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("corrupt record: {0}")]
    CorruptRecord(String),

    // Storage errors
    #[error("chunk I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("insufficient chunk space: required {required} bytes, available {available} bytes")]
    CapacityExceeded { required: u64, available: u64 },

    // Client errors
    #[error("bad file descriptor: {0}")]
    BadDescriptor(i32),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    // Transport errors
    #[error("host {host} unreachable: {message}")]
    Transport { host: HostId, message: String },

    // Internal errors
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a not found error for a path
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create a corrupt record error
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::CorruptRecord(msg.into())
    }

    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Wrap an I/O error, promoting "disk full" to a capacity error.
    #[must_use]
    pub fn from_io(err: std::io::Error, required: u64) -> Self {
        if err.kind() == std::io::ErrorKind::StorageFull {
            Self::CapacityExceeded {
                required,
                available: 0,
            }
        } else {
            Self::Io(err)
        }
    }

    /// Check if this is a not found error
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this error may go away when the request is re-issued.
    ///
    /// This core never retries on its own; the flag is for callers above it.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Wire code for this error
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::AlreadyExists(_) => ErrorCode::AlreadyExists,
            Self::NotADirectory(_) => ErrorCode::NotADirectory,
            Self::IsADirectory(_) => ErrorCode::IsADirectory,
            Self::DirectoryNotEmpty(_) => ErrorCode::DirectoryNotEmpty,
            Self::PermissionDenied(_) => ErrorCode::PermissionDenied,
            Self::CorruptRecord(_) => ErrorCode::CorruptRecord,
            Self::Io(_) => ErrorCode::Io,
            Self::CapacityExceeded { .. } => ErrorCode::CapacityExceeded,
            Self::BadDescriptor(_) => ErrorCode::BadDescriptor,
            Self::InvalidArgument(_) | Self::Configuration(_) => ErrorCode::InvalidArgument,
            Self::Transport { .. } => ErrorCode::Transport,
            Self::Serialization(_) | Self::Internal(_) => ErrorCode::Internal,
        }
    }

    /// POSIX errno for the client surface
    #[must_use]
    pub fn errno(&self) -> i32 {
        match self {
            Self::NotFound(_) => libc::ENOENT,
            Self::AlreadyExists(_) => libc::EEXIST,
            Self::NotADirectory(_) => libc::ENOTDIR,
            Self::IsADirectory(_) => libc::EISDIR,
            Self::DirectoryNotEmpty(_) => libc::ENOTEMPTY,
            Self::PermissionDenied(_) => libc::EACCES,
            Self::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
            Self::CapacityExceeded { .. } => libc::ENOSPC,
            Self::BadDescriptor(_) => libc::EBADF,
            Self::InvalidArgument(_) | Self::Configuration(_) => libc::EINVAL,
            Self::Transport { .. } => libc::EBUSY,
            Self::CorruptRecord(_) | Self::Serialization(_) | Self::Internal(_) => libc::EIO,
        }
    }

    /// Rebuild an error received from a remote host
    #[must_use]
    pub fn from_rpc(host: HostId, err: RpcError) -> Self {
        let RpcError { code, message } = err;
        match code {
            ErrorCode::NotFound => Self::NotFound(message),
            ErrorCode::AlreadyExists => Self::AlreadyExists(message),
            ErrorCode::NotADirectory => Self::NotADirectory(message),
            ErrorCode::IsADirectory => Self::IsADirectory(message),
            ErrorCode::DirectoryNotEmpty => Self::DirectoryNotEmpty(message),
            ErrorCode::PermissionDenied => Self::PermissionDenied(message),
            ErrorCode::CorruptRecord => Self::CorruptRecord(message),
            ErrorCode::Io => Self::Io(std::io::Error::other(message)),
            ErrorCode::CapacityExceeded => Self::CapacityExceeded {
                required: 0,
                available: 0,
            },
            // descriptors are client-local, a remote host never reports one
            ErrorCode::BadDescriptor | ErrorCode::InvalidArgument => {
                Self::InvalidArgument(message)
            }
            ErrorCode::Transport => Self::Transport { host, message },
            ErrorCode::Internal => Self::Internal(message),
        }
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Error classification carried in responses
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    NotFound,
    AlreadyExists,
    NotADirectory,
    IsADirectory,
    DirectoryNotEmpty,
    PermissionDenied,
    CorruptRecord,
    Io,
    CapacityExceeded,
    BadDescriptor,
    InvalidArgument,
    Transport,
    Internal,
}

/// Error as reported by a remote host
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: ErrorCode,
    pub message: String,
}

impl From<&Error> for RpcError {
    fn from(e: &Error) -> Self {
        Self {
            code: e.code(),
            message: e.to_string(),
        }
    }
}
