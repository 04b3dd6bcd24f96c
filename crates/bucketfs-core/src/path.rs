//! Virtual path handling for prefix-delimited namespaces.
//!
//! The remote namespace has no real directories. A *prefix* names a virtual
//! directory: `""` is the root, every other prefix ends in `/`. A *key* names
//! a single object and never ends in `/`.
//!
//! Everything in this module is pure string manipulation. Nothing here checks
//! that a path exists, and resolution behaves the same for every backend.

use crate::error::PathError;
use std::path::{Component, Path, PathBuf};

/// Separator between path segments in keys and prefixes.
pub const SEPARATOR: char = '/';

/// Normalize `input` relative to `current_prefix`.
///
/// - An input starting with `/` is resolved from the root, otherwise the
///   segments of `current_prefix` come first.
/// - `.` and empty segments are dropped; `..` pops the last retained segment
///   and is a no-op at the root.
/// - A non-empty directory result ends in `/`; a file result never does.
///
/// ```
/// use bucketfs_core::path::resolve;
///
/// assert_eq!(resolve("a/", "../../x", false), "x");
/// assert_eq!(resolve("", "/x/y/", true), "x/y/");
/// assert_eq!(resolve("a/b/", "../c", false), "a/c");
/// assert_eq!(resolve("a/", "..", true), "");
/// ```
pub fn resolve(current_prefix: &str, input: &str, is_directory: bool) -> String {
    let base: &str = if input.starts_with(SEPARATOR) {
        ""
    } else {
        current_prefix
    };

    let mut stack: Vec<&str> = Vec::new();
    for segment in base.split(SEPARATOR).chain(input.split(SEPARATOR)) {
        match segment {
            "" | "." => {}
            ".." => {
                stack.pop();
            }
            other => stack.push(other),
        }
    }

    let mut resolved = stack.join("/");
    if is_directory && !resolved.is_empty() {
        resolved.push(SEPARATOR);
    }
    resolved
}

/// Resolve `input` as an object key, rejecting inputs that land on the root.
pub fn resolve_key(current_prefix: &str, input: &str) -> Result<String, PathError> {
    let key = resolve(current_prefix, input, false);
    if key.is_empty() {
        return Err(PathError::Empty);
    }
    Ok(key)
}

/// The prefix containing `key`: everything up to and including the last `/`,
/// or the root when the key has no separator.
///
/// ```
/// use bucketfs_core::path::parent_prefix;
///
/// assert_eq!(parent_prefix("a/b/c.txt"), "a/b/");
/// assert_eq!(parent_prefix("top.txt"), "");
/// ```
pub fn parent_prefix(key: &str) -> &str {
    match key.rfind(SEPARATOR) {
        Some(idx) => &key[..=idx],
        None => "",
    }
}

/// The prefix containing the directory `prefix` (`"a/b/"` -> `"a/"`).
pub fn parent_of_prefix(prefix: &str) -> &str {
    parent_prefix(prefix.trim_end_matches(SEPARATOR))
}

/// Last segment of a key (`"a/b/c.txt"` -> `"c.txt"`).
pub fn basename(key: &str) -> &str {
    match key.rfind(SEPARATOR) {
        Some(idx) => &key[idx + 1..],
        None => key,
    }
}

/// Last segment of a directory prefix (`"a/b/"` -> `"b"`, root -> `""`).
pub fn dir_name(prefix: &str) -> &str {
    basename(prefix.trim_end_matches(SEPARATOR))
}

/// Append a child directory name to a prefix.
pub fn child_prefix(prefix: &str, name: &str) -> String {
    let mut child = String::with_capacity(prefix.len() + name.len() + 1);
    child.push_str(prefix);
    child.push_str(name);
    child.push(SEPARATOR);
    child
}

/// Append an object name to a prefix.
pub fn child_key(prefix: &str, name: &str) -> String {
    let mut key = String::with_capacity(prefix.len() + name.len());
    key.push_str(prefix);
    key.push_str(name);
    key
}

/// Whether a path expression contains shell wildcards.
pub fn has_wildcards(input: &str) -> bool {
    input.contains(['*', '?', '['])
}

/// Map an object key to a path under `root`.
///
/// With `flat`, only the basename is used. Keys whose segments could escape
/// `root` (`..`, absolute components, drive prefixes) are rejected.
pub fn local_path_for(root: &Path, key: &str, flat: bool) -> Result<PathBuf, PathError> {
    let relative = if flat { basename(key) } else { key };

    let mut path = root.to_path_buf();
    let mut pushed = false;
    for segment in relative.split(SEPARATOR).filter(|s| !s.is_empty()) {
        let mut components = Path::new(segment).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(part)), None) => {
                path.push(part);
                pushed = true;
            }
            _ => {
                return Err(PathError::EscapesRoot {
                    key: key.to_string(),
                });
            }
        }
    }

    if !pushed {
        return Err(PathError::Empty);
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_relative_resolution() {
        assert_eq!(resolve("a/b/", "c", false), "a/b/c");
        assert_eq!(resolve("a/b/", "c", true), "a/b/c/");
        assert_eq!(resolve("a/b/", "../c", false), "a/c");
        assert_eq!(resolve("a/", "../../x", false), "x");
    }

    #[test]
    fn test_absolute_resolution() {
        assert_eq!(resolve("a/b/", "/x", false), "x");
        assert_eq!(resolve("", "/x/y/", true), "x/y/");
        assert_eq!(resolve("deep/down/", "/", true), "");
    }

    #[test]
    fn test_dot_and_empty_segments() {
        assert_eq!(resolve("a/", ".", true), "a/");
        assert_eq!(resolve("a/", "./b//c/./", true), "a/b/c/");
        assert_eq!(resolve("a/", "b/", false), "a/b");
    }

    #[test]
    fn test_parent_past_root_is_noop() {
        assert_eq!(resolve("a/", "..", true), "");
        assert_eq!(resolve("", "../../..", true), "");
        assert_eq!(resolve("", "../x", false), "x");
    }

    #[test]
    fn test_resolve_key_rejects_root() {
        assert_eq!(resolve_key("a/", ".."), Err(PathError::Empty));
        assert_eq!(resolve_key("a/", "b.txt").as_deref(), Ok("a/b.txt"));
    }

    #[test]
    fn test_parent_helpers() {
        assert_eq!(parent_prefix("a/b/c.txt"), "a/b/");
        assert_eq!(parent_prefix("c.txt"), "");
        assert_eq!(parent_of_prefix("a/b/"), "a/");
        assert_eq!(parent_of_prefix("a/"), "");
        assert_eq!(parent_of_prefix(""), "");
        assert_eq!(dir_name("a/b/"), "b");
        assert_eq!(dir_name(""), "");
        assert_eq!(basename("a/b/c.txt"), "c.txt");
        assert_eq!(child_prefix("a/", "b"), "a/b/");
        assert_eq!(child_key("a/", "x.txt"), "a/x.txt");
    }

    #[test]
    fn test_local_path_mapping() {
        let root = Path::new("/tmp/dest");
        assert_eq!(
            local_path_for(root, "a/b/c.txt", false).unwrap(),
            root.join("a").join("b").join("c.txt")
        );
        assert_eq!(
            local_path_for(root, "a/b/c.txt", true).unwrap(),
            root.join("c.txt")
        );
        assert!(matches!(
            local_path_for(root, "a/../../etc/passwd", false),
            Err(PathError::EscapesRoot { .. })
        ));
        assert_eq!(local_path_for(root, "", false), Err(PathError::Empty));
    }

    #[test]
    fn test_wildcard_detection() {
        assert!(has_wildcards("logs/*.gz"));
        assert!(has_wildcards("file?.txt"));
        assert!(!has_wildcards("plain/key.txt"));
    }

    fn segment() -> impl Strategy<Value = String> {
        prop_oneof![
            Just(".".to_string()),
            Just("..".to_string()),
            Just(String::new()),
            "[a-z0-9_.-]{1,8}",
        ]
    }

    fn path_expr() -> impl Strategy<Value = String> {
        (any::<bool>(), prop::collection::vec(segment(), 0..8)).prop_map(|(absolute, segs)| {
            let joined = segs.join("/");
            if absolute { format!("/{joined}") } else { joined }
        })
    }

    proptest! {
        #[test]
        fn prop_dot_is_identity_for_directories(expr in path_expr()) {
            let dir = resolve("", &expr, true);
            prop_assert_eq!(resolve(&dir, ".", true), dir);
        }

        #[test]
        fn prop_resolution_is_idempotent(current in path_expr(), expr in path_expr()) {
            let base = resolve("", &current, true);
            let once = resolve(&base, &expr, true);
            let twice = resolve(&once, ".", true);
            prop_assert_eq!(resolve(&twice, ".", true), twice.clone());
            prop_assert_eq!(twice, once);
        }

        #[test]
        fn prop_results_are_normalized(current in path_expr(), expr in path_expr(), dir in any::<bool>()) {
            let base = resolve("", &current, true);
            let out = resolve(&base, &expr, dir);
            prop_assert!(!out.starts_with('/'));
            prop_assert!(!out.contains("//"));
            prop_assert!(out.split('/').all(|s| s != "." && s != ".."));
            if dir {
                prop_assert!(out.is_empty() || out.ends_with('/'));
            } else {
                prop_assert!(!out.ends_with('/'));
            }
        }
    }
}
