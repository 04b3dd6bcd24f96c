//! Process exit codes.

use bucketfs_core::ErrorCategory;
use thiserror::Error;

pub const SUCCESS: u8 = 0;
pub const GENERAL_ERROR: u8 = 1;
/// Bad path, pattern or argument (clap also exits with 2 on usage errors).
pub const INVALID_ARGUMENT: u8 = 2;
pub const NOT_FOUND: u8 = 3;
pub const PERMISSION_DENIED: u8 = 4;
pub const TRANSIENT: u8 = 5;
pub const NOT_SUPPORTED: u8 = 6;
/// Some items of a batch failed, the rest succeeded.
pub const PARTIAL_FAILURE: u8 = 7;
pub const CANCELLED: u8 = 130;

pub fn for_category(category: ErrorCategory) -> u8 {
    match category {
        ErrorCategory::NotFound => NOT_FOUND,
        ErrorCategory::PermissionDenied => PERMISSION_DENIED,
        ErrorCategory::Transient => TRANSIENT,
        ErrorCategory::InvalidArgument => INVALID_ARGUMENT,
        ErrorCategory::NotSupported => NOT_SUPPORTED,
        ErrorCategory::IoError => GENERAL_ERROR,
    }
}

/// A command finished but did not fully succeed.
#[derive(Error, Debug)]
pub enum CommandFailure {
    #[error("{failed} of {total} transfers failed")]
    Partial { failed: usize, total: usize },

    #[error("Cancelled")]
    Cancelled,
}

impl CommandFailure {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Partial { .. } => PARTIAL_FAILURE,
            Self::Cancelled => CANCELLED,
        }
    }
}
