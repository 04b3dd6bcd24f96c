//! Human-readable byte sizes.

use regex::Regex;
use std::sync::LazyLock;

static SIZE_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(\d+(?:\.\d+)?)\s*(B|KB|MB|GB|TB)$").ok());

const KIB: u64 = 1024;

fn unit_multiplier(unit: &str) -> Option<u64> {
    Some(match unit {
        "B" => 1,
        "KB" => KIB,
        "MB" => KIB.pow(2),
        "GB" => KIB.pow(3),
        "TB" => KIB.pow(4),
        _ => return None,
    })
}

/// Parse sizes like `100MB`, `1.5 gb` or `512B` into bytes.
///
/// Units are binary multiples and case-insensitive; a unit is required.
///
/// ```
/// use bucketfs_core::size::parse_size;
///
/// assert_eq!(parse_size("100MB"), Some(100 * 1024 * 1024));
/// assert_eq!(parse_size("1.5 kb"), Some(1536));
/// assert_eq!(parse_size("lots"), None);
/// ```
pub fn parse_size(input: &str) -> Option<u64> {
    let upper = input.trim().to_ascii_uppercase();
    let caps = SIZE_RE.as_ref()?.captures(&upper)?;
    let value: f64 = caps.get(1)?.as_str().parse().ok()?;
    let multiplier = unit_multiplier(caps.get(2)?.as_str())?;
    let bytes = value * multiplier as f64;
    if !bytes.is_finite() || bytes >= u64::MAX as f64 {
        return None;
    }
    Some(bytes as u64)
}

/// Format a byte count as `512 B`, `1.5 KB`, `3.2 GB`.
pub fn format_size(bytes: u64) -> String {
    if bytes < KIB {
        return format!("{bytes} B");
    }
    let mut size = bytes as f64;
    let mut unit = "B";
    for next in ["KB", "MB", "GB", "TB"] {
        if size < 1024.0 {
            break;
        }
        size /= 1024.0;
        unit = next;
    }
    format!("{size:.1} {unit}")
}
