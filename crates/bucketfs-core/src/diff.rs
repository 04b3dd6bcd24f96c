//! Comparison of two files, each local or remote.
//!
//! Text files (valid UTF-8 without NUL bytes in their first 8 KiB) get a
//! unified diff. Anything else is compared by size and SHA-256.

use sha2::{Digest, Sha256};
use similar::TextDiff;
use std::path::PathBuf;

/// Bytes inspected when deciding whether a file is text.
const TEXT_SNIFF_BYTES: usize = 8192;

/// Context lines around each hunk.
const CONTEXT_LINES: usize = 3;

/// One side of a comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffSide {
    Local(PathBuf),
    /// Path relative to the session's current directory.
    Remote(String),
}

impl DiffSide {
    /// `./`, `../`, `~/` and absolute paths are local; anything else is a
    /// remote key.
    ///
    /// ```
    /// use bucketfs_core::diff::DiffSide;
    ///
    /// assert_eq!(DiffSide::parse("logs/a.txt"), DiffSide::Remote("logs/a.txt".into()));
    /// assert!(matches!(DiffSide::parse("./a.txt"), DiffSide::Local(_)));
    /// ```
    pub fn parse(input: &str) -> Self {
        if let Some(rest) = input.strip_prefix("~/")
            && let Some(dirs) = directories::BaseDirs::new()
        {
            return Self::Local(dirs.home_dir().join(rest));
        }
        if input.starts_with("./") || input.starts_with("../") || input.starts_with('/') {
            Self::Local(PathBuf::from(input))
        } else {
            Self::Remote(input.to_string())
        }
    }
}

/// Size and hash of one compared file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffFile {
    /// Local path or resolved remote key, as shown to the user.
    pub name: String,
    pub size: u64,
    /// Lowercase hex SHA-256.
    pub sha256: String,
    pub is_text: bool,
}

impl DiffFile {
    fn new(name: String, data: &[u8]) -> Self {
        Self {
            name,
            size: data.len() as u64,
            sha256: hex::encode(Sha256::digest(data)),
            is_text: looks_like_text(data),
        }
    }
}

/// Result of [`compare`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffReport {
    pub left: DiffFile,
    pub right: DiffFile,
    /// Unified diff, present when both sides are text and differ.
    pub unified: Option<String>,
}

impl DiffReport {
    pub fn is_identical(&self) -> bool {
        self.left.sha256 == self.right.sha256
    }

    /// Both sides were compared line by line.
    pub fn is_text(&self) -> bool {
        self.left.is_text && self.right.is_text
    }
}

/// Compare two in-memory files.
pub fn compare(left_name: &str, left: &[u8], right_name: &str, right: &[u8]) -> DiffReport {
    let left_file = DiffFile::new(left_name.to_string(), left);
    let right_file = DiffFile::new(right_name.to_string(), right);

    let unified = (left_file.is_text
        && right_file.is_text
        && left_file.sha256 != right_file.sha256)
        .then(|| {
            let old = String::from_utf8_lossy(left);
            let new = String::from_utf8_lossy(right);
            TextDiff::from_lines(old.as_ref(), new.as_ref())
                .unified_diff()
                .context_radius(CONTEXT_LINES)
                .header(left_name, right_name)
                .to_string()
        });

    DiffReport {
        left: left_file,
        right: right_file,
        unified,
    }
}

/// UTF-8 without NUL in the first [`TEXT_SNIFF_BYTES`], tolerating a
/// sequence cut by the window.
fn looks_like_text(data: &[u8]) -> bool {
    let window = &data[..data.len().min(TEXT_SNIFF_BYTES)];
    if window.contains(&0) {
        return false;
    }
    match std::str::from_utf8(window) {
        Ok(_) => true,
        Err(e) => e.error_len().is_none() && window.len() == TEXT_SNIFF_BYTES,
    }
}
