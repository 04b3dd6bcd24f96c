//! Error category mapping.
//!
//! Different callers need different error representations: the CLI wants a
//! process exit code, the crawler wants to know whether a failure is worth
//! logging as transient. [`ErrorCategory`] is the intermediate
//! representation both are derived from.

use super::{PathError, SessionError, StoreError, TransferError};
use std::io;

/// Semantic category for bucketfs errors.
///
/// # Example
///
/// ```
/// use bucketfs_core::error::{ErrorCategory, StoreError};
///
/// let err = StoreError::NotFound { key: "a/b.txt".to_string() };
/// assert_eq!(ErrorCategory::from(&err), ErrorCategory::NotFound);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Key, prefix or local file does not exist
    NotFound,
    /// Backend or local filesystem refused access
    PermissionDenied,
    /// Retryable network or throttling failure
    Transient,
    /// Malformed path, pattern or argument
    InvalidArgument,
    /// Any other I/O failure
    IoError,
    /// Operation not implemented by the backend
    NotSupported,
}

impl ErrorCategory {
    /// Returns a human-readable name for this error category.
    pub fn name(&self) -> &'static str {
        match self {
            Self::NotFound => "NotFound",
            Self::PermissionDenied => "PermissionDenied",
            Self::Transient => "Transient",
            Self::InvalidArgument => "InvalidArgument",
            Self::IoError => "IoError",
            Self::NotSupported => "NotSupported",
        }
    }
}

impl From<&StoreError> for ErrorCategory {
    fn from(e: &StoreError) -> Self {
        match e {
            StoreError::NotFound { .. } => Self::NotFound,
            StoreError::AccessDenied { .. } => Self::PermissionDenied,
            StoreError::Transient { .. } => Self::Transient,
            StoreError::InvalidKey { .. } | StoreError::InvalidArgument { .. } => {
                Self::InvalidArgument
            }
            StoreError::Unsupported { .. } => Self::NotSupported,
            StoreError::Io { source, .. } => {
                if e.is_transient() {
                    Self::Transient
                } else {
                    io_error_category(source)
                }
            }
        }
    }
}

impl From<&PathError> for ErrorCategory {
    fn from(e: &PathError) -> Self {
        match e {
            PathError::NotADirectory { .. } => Self::NotFound,
            PathError::Empty
            | PathError::EscapesRoot { .. }
            | PathError::NotAFile { .. }
            | PathError::InvalidPattern { .. } => Self::InvalidArgument,
        }
    }
}

impl From<&TransferError> for ErrorCategory {
    fn from(e: &TransferError) -> Self {
        match e {
            TransferError::Store(inner) => Self::from(inner),
            TransferError::Path(inner) => Self::from(inner),
            TransferError::Io { source, .. } => io_error_category(source),
        }
    }
}

impl From<&SessionError> for ErrorCategory {
    fn from(e: &SessionError) -> Self {
        match e {
            SessionError::Store(inner) => Self::from(inner),
            SessionError::Path(inner) => Self::from(inner),
            SessionError::Transfer(inner) => Self::from(inner),
            SessionError::TooLarge { .. } | SessionError::InvalidArgument { .. } => {
                Self::InvalidArgument
            }
            SessionError::Io { source, .. } => io_error_category(source),
        }
    }
}

impl From<&io::Error> for ErrorCategory {
    fn from(e: &io::Error) -> Self {
        io_error_category(e)
    }
}

/// Categorizes an I/O error based on its kind.
fn io_error_category(e: &io::Error) -> ErrorCategory {
    match e.kind() {
        io::ErrorKind::NotFound => ErrorCategory::NotFound,
        io::ErrorKind::PermissionDenied => ErrorCategory::PermissionDenied,
        io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => {
            ErrorCategory::InvalidArgument
        }
        io::ErrorKind::Unsupported => ErrorCategory::NotSupported,
        io::ErrorKind::TimedOut | io::ErrorKind::Interrupted => ErrorCategory::Transient,
        _ => ErrorCategory::IoError,
    }
}
