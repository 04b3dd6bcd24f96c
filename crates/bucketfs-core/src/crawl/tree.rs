//! Directory tree assembled from a walk, for tree and disk-usage views.

use super::TraversalResult;
use crate::path;
use crate::store::FileEntry;
use std::collections::{BTreeMap, BTreeSet};

/// Contents of one prefix within a [`DirTree`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirNode {
    /// Full prefixes of child directories.
    pub directories: BTreeSet<String>,
    pub files: Vec<FileEntry>,
    /// Whether the prefix itself was listed. Directories beyond the depth
    /// limit (or whose listing failed) are known to exist but not expanded.
    pub listed: bool,
}

/// Prefix -> contents map rooted at the walk's root.
#[derive(Debug, Clone, Default)]
pub struct DirTree {
    root: String,
    nodes: BTreeMap<String, DirNode>,
}

/// File count and byte total of a subtree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub files: u64,
    pub bytes: u64,
}

impl DirTree {
    pub fn from_traversal(root: &str, result: &TraversalResult) -> Self {
        let mut nodes: BTreeMap<String, DirNode> = BTreeMap::new();
        nodes.entry(root.to_string()).or_default();

        for prefix in &result.listed {
            nodes.entry(prefix.clone()).or_default().listed = true;
        }
        for (prefix, _) in &result.all_dirs {
            nodes.entry(prefix.clone()).or_default();
            nodes
                .entry(path::parent_of_prefix(prefix).to_string())
                .or_default()
                .directories
                .insert(prefix.clone());
        }
        for (key, entry) in &result.all_files {
            nodes
                .entry(path::parent_prefix(key).to_string())
                .or_default()
                .files
                .push(entry.clone());
        }
        for node in nodes.values_mut() {
            node.files.sort_by(|a, b| a.name.cmp(&b.name));
        }

        Self {
            root: root.to_string(),
            nodes,
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn node(&self, prefix: &str) -> Option<&DirNode> {
        self.nodes.get(prefix)
    }

    /// Number of prefixes in the tree, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Files and bytes under `prefix`, recursively, as far as it was walked.
    pub fn usage(&self, prefix: &str) -> Usage {
        let mut usage = Usage::default();
        let mut pending = vec![prefix];
        while let Some(current) = pending.pop() {
            let Some(node) = self.nodes.get(current) else {
                continue;
            };
            usage.files += node.files.len() as u64;
            usage.bytes += node.files.iter().map(|f| f.size).sum::<u64>();
            pending.extend(node.directories.iter().map(String::as_str));
        }
        usage
    }
}
