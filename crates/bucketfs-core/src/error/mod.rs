//! Error types for the bucketfs core.
//!
//! Errors are split by the layer that produces them:
//!
//! - [`StoreError`] - failures reported by a [`RemoteStore`](crate::store::RemoteStore)
//! - [`PathError`] - malformed path input, raised before any network call
//! - [`CacheError`] - persistence failures of the namespace cache (always recoverable)
//! - [`TransferError`] - per-item failures inside the transfer executor
//! - [`ConfigError`] - unreadable configuration file (always recoverable)
//! - [`SessionError`] - anything surfaced by the session facade
//!
//! [`ErrorCategory`] collapses all of them into the small set of outcomes a
//! caller (for example the CLI's exit code mapping) needs to distinguish.

mod category;

pub use category::ErrorCategory;

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by a remote store backend.
///
/// The core only distinguishes not-found, access-denied and transient
/// failures; backends fold their richer error codes into these variants.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The key or prefix does not exist.
    #[error("Object not found: {key}")]
    NotFound { key: String },

    /// The backend refused the request.
    #[error("Access denied: {key}")]
    AccessDenied { key: String },

    /// Throttling, connection resets, timeouts and similar retryable failures.
    #[error("Transient store failure: {message}")]
    Transient { message: String },

    /// The key cannot be addressed by this backend.
    #[error("Invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    /// A request argument was out of range.
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// The backend does not implement this operation.
    #[error("Operation not supported by this store: {operation}")]
    Unsupported { operation: &'static str },

    /// Local I/O failed while serving the request.
    #[error("I/O error while {context}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    /// Convert an I/O error for `key`, mapping the kinds the core cares about.
    pub fn from_io(key: &str, context: impl Into<String>, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound => StoreError::NotFound {
                key: key.to_string(),
            },
            io::ErrorKind::PermissionDenied => StoreError::AccessDenied {
                key: key.to_string(),
            },
            _ => StoreError::Io {
                context: context.into(),
                source,
            },
        }
    }

    /// Shorthand for a transient failure.
    pub fn transient(message: impl Into<String>) -> Self {
        StoreError::Transient {
            message: message.into(),
        }
    }

    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Transient { .. } => true,
            StoreError::Io { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::TimedOut
                    | io::ErrorKind::Interrupted
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }

    /// Whether this error means the key does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Malformed path input.
///
/// Path resolution itself never fails; these errors come from the checks
/// callers layer on top of it (empty keys, keys escaping a local root,
/// existence checks against a listing).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    /// The path resolved to the root where an object key was required.
    #[error("Path resolves to the root, an object key is required")]
    Empty,

    /// The key cannot be mapped under a local destination directory.
    #[error("Key '{key}' cannot be mapped to a local path")]
    EscapesRoot { key: String },

    /// Expected an object but the path names a directory.
    #[error("Not a file: {path}")]
    NotAFile { path: String },

    /// Expected a directory but none exists at the path.
    #[error("Directory not found: {path}")]
    NotADirectory { path: String },

    /// A shell pattern could not be compiled.
    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Failures loading or saving the persisted namespace cache.
///
/// These never abort the process: callers degrade to an empty cache.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache file I/O failed: {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Cache file is corrupt: {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unsupported cache format version {found} (expected {expected})")]
    VersionMismatch { found: u32, expected: u32 },

    #[error("Cache file belongs to backend '{found}', expected '{expected}'")]
    BackendMismatch { found: String, expected: String },
}

/// Failures reading the configuration file.
///
/// Callers fall back to the default configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid config file {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// A single failed item inside a parallel transfer.
#[derive(Error, Debug)]
pub enum TransferError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Path(#[from] PathError),

    #[error("Local I/O failed for {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Errors from the [`Session`](crate::session::Session) facade.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// An object is larger than the caller allowed.
    #[error("{key} is {size} bytes, above the {limit} byte limit")]
    TooLarge { key: String, size: u64, limit: u64 },

    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("Local I/O failed for {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
