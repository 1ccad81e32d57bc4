//! Hierarchical content-hash tree for cheap change detection.
//!
//! Each file node's hash is a function of its byte content only; each
//! directory node's hash is a function of its sorted `(name, child hash)`
//! pairs, so sibling renames never disturb unrelated hashes and an
//! unchanged subtree compares equal in O(1).

mod builder;

pub use builder::HashTreeBuilder;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Kind of hash-tree node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HashNodeKind {
    /// Source file
    File {
        /// File size in bytes
        size: u64,
        /// Last modified time (Unix timestamp)
        mtime: u64,
    },

    /// Directory with named children
    Directory {
        /// Children keyed by name; BTreeMap keeps iteration sorted
        children: BTreeMap<String, HashNode>,
    },
}

/// A node in the hash tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashNode {
    /// Node name (file or directory basename)
    pub name: String,

    /// Relative path from the tree root
    pub path: PathBuf,

    /// Content hash (hex SHA-256)
    pub hash: String,

    /// Kind of node
    pub kind: HashNodeKind,
}

impl HashNode {
    /// Check if this is a file node.
    pub fn is_file(&self) -> bool {
        matches!(self.kind, HashNodeKind::File { .. })
    }

    /// Check if this is a directory node.
    pub fn is_directory(&self) -> bool {
        matches!(self.kind, HashNodeKind::Directory { .. })
    }

    /// File metadata, if this is a file node.
    pub fn file_meta(&self) -> Option<(u64, u64)> {
        match self.kind {
            HashNodeKind::File { size, mtime } => Some((size, mtime)),
            HashNodeKind::Directory { .. } => None,
        }
    }

    fn collect_files<'a>(&'a self, out: &mut Vec<&'a HashNode>) {
        match &self.kind {
            HashNodeKind::File { .. } => out.push(self),
            HashNodeKind::Directory { children } => {
                for child in children.values() {
                    child.collect_files(out);
                }
            }
        }
    }
}

/// The complete hash tree over a watched file set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashTree {
    /// Tree format version
    pub version: u32,

    /// Absolute root path the tree was built from
    pub root_path: PathBuf,

    /// Root directory node
    pub root: HashNode,

    /// Total file count
    pub file_count: usize,

    /// When this tree was built
    pub built_at: DateTime<Utc>,
}

impl HashTree {
    /// All file nodes, in sorted path order.
    pub fn files(&self) -> Vec<&HashNode> {
        let mut out = Vec::with_capacity(self.file_count);
        self.root.collect_files(&mut out);
        out
    }

    /// Find a node by its relative path.
    pub fn find(&self, path: &Path) -> Option<&HashNode> {
        let mut node = &self.root;
        for component in path.components() {
            let name = component.as_os_str().to_str()?;
            match &node.kind {
                HashNodeKind::Directory { children } => {
                    node = children.get(name)?;
                }
                HashNodeKind::File { .. } => return None,
            }
        }
        Some(node)
    }

    /// Compute the minimal diff between two snapshots.
    ///
    /// Hash-identical subtrees are skipped without descending, so an
    /// unchanged tree diffs in O(1).
    pub fn diff(old: &HashTree, new: &HashTree) -> TreeDiff {
        let mut diff = TreeDiff::default();
        diff_nodes(&old.root, &new.root, &mut diff);
        diff.sort();
        diff
    }
}

/// Added/modified/deleted file paths between two tree snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeDiff {
    /// Files present only in the new snapshot
    pub added: Vec<PathBuf>,
    /// Files present in both with different content hashes
    pub modified: Vec<PathBuf>,
    /// Files present only in the old snapshot
    pub deleted: Vec<PathBuf>,
}

impl TreeDiff {
    /// A diff marking every file of a tree as added (first build).
    pub fn all_added(tree: &HashTree) -> Self {
        Self {
            added: tree.files().iter().map(|n| n.path.clone()).collect(),
            modified: Vec::new(),
            deleted: Vec::new(),
        }
    }

    /// Whether the diff contains no changes.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    /// Total number of changed paths.
    pub fn len(&self) -> usize {
        self.added.len() + self.modified.len() + self.deleted.len()
    }

    fn sort(&mut self) {
        self.added.sort_unstable();
        self.modified.sort_unstable();
        self.deleted.sort_unstable();
    }
}

fn diff_nodes(old: &HashNode, new: &HashNode, diff: &mut TreeDiff) {
    if old.hash == new.hash {
        return;
    }

    match (&old.kind, &new.kind) {
        (
            HashNodeKind::Directory { children: old_children },
            HashNodeKind::Directory { children: new_children },
        ) => {
            for (name, old_child) in old_children {
                match new_children.get(name) {
                    Some(new_child) => diff_nodes(old_child, new_child, diff),
                    None => {
                        let mut files = Vec::new();
                        old_child.collect_files(&mut files);
                        diff.deleted.extend(files.iter().map(|n| n.path.clone()));
                    }
                }
            }
            for (name, new_child) in new_children {
                if !old_children.contains_key(name) {
                    let mut files = Vec::new();
                    new_child.collect_files(&mut files);
                    diff.added.extend(files.iter().map(|n| n.path.clone()));
                }
            }
        }
        (HashNodeKind::File { .. }, HashNodeKind::File { .. }) => {
            diff.modified.push(new.path.clone());
        }
        // A path changed kind: the old entry is gone, the new one is fresh.
        _ => {
            let mut files = Vec::new();
            old.collect_files(&mut files);
            diff.deleted.extend(files.iter().map(|n| n.path.clone()));

            let mut files = Vec::new();
            new.collect_files(&mut files);
            diff.added.extend(files.iter().map(|n| n.path.clone()));
        }
    }
}

/// Hash file content.
pub fn hash_bytes(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

/// Hash a directory from its children's sorted `(name, hash)` pairs.
pub fn hash_children(children: &BTreeMap<String, HashNode>) -> String {
    let mut hasher = Sha256::new();
    for (name, child) in children {
        hasher.update(name.as_bytes());
        hasher.update([0u8]);
        hasher.update(child.hash.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_node(name: &str, path: &str, content: &[u8]) -> HashNode {
        HashNode {
            name: name.to_string(),
            path: PathBuf::from(path),
            hash: hash_bytes(content),
            kind: HashNodeKind::File {
                size: content.len() as u64,
                mtime: 0,
            },
        }
    }

    fn dir_node(name: &str, path: &str, children: Vec<HashNode>) -> HashNode {
        let children: BTreeMap<String, HashNode> =
            children.into_iter().map(|c| (c.name.clone(), c)).collect();
        HashNode {
            name: name.to_string(),
            path: PathBuf::from(path),
            hash: hash_children(&children),
            kind: HashNodeKind::Directory { children },
        }
    }

    fn tree(root: HashNode) -> HashTree {
        let file_count = {
            let mut files = Vec::new();
            root.collect_files(&mut files);
            files.len()
        };
        HashTree {
            version: 1,
            root_path: PathBuf::from("/project"),
            root,
            file_count,
            built_at: Utc::now(),
        }
    }

    #[test]
    fn test_file_hash_depends_on_content_only() {
        let a = file_node("a.ts", "a.ts", b"content");
        let b = file_node("b.ts", "b.ts", b"content");
        assert_eq!(a.hash, b.hash);

        let c = file_node("a.ts", "a.ts", b"different");
        assert_ne!(a.hash, c.hash);
    }

    #[test]
    fn test_directory_hash_order_independent() {
        // Same children inserted in different orders hash identically.
        let d1 = dir_node(
            "src",
            "src",
            vec![
                file_node("a.ts", "src/a.ts", b"aaa"),
                file_node("b.ts", "src/b.ts", b"bbb"),
            ],
        );
        let d2 = dir_node(
            "src",
            "src",
            vec![
                file_node("b.ts", "src/b.ts", b"bbb"),
                file_node("a.ts", "src/a.ts", b"aaa"),
            ],
        );
        assert_eq!(d1.hash, d2.hash);
    }

    #[test]
    fn test_directory_hash_changes_with_child() {
        let d1 = dir_node("src", "src", vec![file_node("a.ts", "src/a.ts", b"aaa")]);
        let d2 = dir_node("src", "src", vec![file_node("a.ts", "src/a.ts", b"bbb")]);
        assert_ne!(d1.hash, d2.hash);
    }

    #[test]
    fn test_identical_trees_empty_diff() {
        let build = || {
            tree(dir_node(
                "project",
                "",
                vec![
                    file_node("a.ts", "a.ts", b"aaa"),
                    file_node("b.ts", "b.ts", b"bbb"),
                ],
            ))
        };

        let diff = HashTree::diff(&build(), &build());
        assert!(diff.is_empty());
    }

    #[test]
    fn test_diff_single_modified_file() {
        let old = tree(dir_node(
            "project",
            "",
            vec![
                file_node("a.ts", "a.ts", b"aaa"),
                file_node("b.ts", "b.ts", b"bbb"),
                file_node("c.ts", "c.ts", b"ccc"),
            ],
        ));
        let new = tree(dir_node(
            "project",
            "",
            vec![
                file_node("a.ts", "a.ts", b"aaa"),
                file_node("b.ts", "b.ts", b"edited"),
                file_node("c.ts", "c.ts", b"ccc"),
            ],
        ));

        let diff = HashTree::diff(&old, &new);
        assert_eq!(diff.added, Vec::<PathBuf>::new());
        assert_eq!(diff.modified, vec![PathBuf::from("b.ts")]);
        assert_eq!(diff.deleted, Vec::<PathBuf>::new());
    }

    #[test]
    fn test_diff_added_subtree() {
        let old = tree(dir_node(
            "project",
            "",
            vec![file_node("a.ts", "a.ts", b"aaa")],
        ));
        let new = tree(dir_node(
            "project",
            "",
            vec![
                file_node("a.ts", "a.ts", b"aaa"),
                dir_node(
                    "sub",
                    "sub",
                    vec![
                        file_node("x.ts", "sub/x.ts", b"xxx"),
                        file_node("y.ts", "sub/y.ts", b"yyy"),
                    ],
                ),
            ],
        ));

        let diff = HashTree::diff(&old, &new);
        assert_eq!(
            diff.added,
            vec![PathBuf::from("sub/x.ts"), PathBuf::from("sub/y.ts")]
        );
        assert!(diff.modified.is_empty());
        assert!(diff.deleted.is_empty());
    }

    #[test]
    fn test_diff_deleted_subtree() {
        let old = tree(dir_node(
            "project",
            "",
            vec![
                file_node("a.ts", "a.ts", b"aaa"),
                dir_node("sub", "sub", vec![file_node("x.ts", "sub/x.ts", b"xxx")]),
            ],
        ));
        let new = tree(dir_node(
            "project",
            "",
            vec![file_node("a.ts", "a.ts", b"aaa")],
        ));

        let diff = HashTree::diff(&old, &new);
        assert!(diff.added.is_empty());
        assert_eq!(diff.deleted, vec![PathBuf::from("sub/x.ts")]);
    }

    #[test]
    fn test_sibling_rename_does_not_touch_others() {
        // Renaming b.ts -> d.ts must not mark a.ts changed.
        let old = tree(dir_node(
            "project",
            "",
            vec![
                file_node("a.ts", "a.ts", b"aaa"),
                file_node("b.ts", "b.ts", b"bbb"),
            ],
        ));
        let new = tree(dir_node(
            "project",
            "",
            vec![
                file_node("a.ts", "a.ts", b"aaa"),
                file_node("d.ts", "d.ts", b"bbb"),
            ],
        ));

        let diff = HashTree::diff(&old, &new);
        assert_eq!(diff.added, vec![PathBuf::from("d.ts")]);
        assert_eq!(diff.deleted, vec![PathBuf::from("b.ts")]);
        assert!(diff.modified.is_empty());
    }

    #[test]
    fn test_find_by_path() {
        let t = tree(dir_node(
            "project",
            "",
            vec![dir_node(
                "src",
                "src",
                vec![file_node("main.rs", "src/main.rs", b"fn main() {}")],
            )],
        ));

        let node = t.find(Path::new("src/main.rs")).unwrap();
        assert!(node.is_file());
        assert!(t.find(Path::new("src/missing.rs")).is_none());
    }

    #[test]
    fn test_tree_serialization() {
        let t = tree(dir_node(
            "project",
            "",
            vec![file_node("a.ts", "a.ts", b"aaa")],
        ));

        let json = serde_json::to_string(&t).unwrap();
        let restored: HashTree = serde_json::from_str(&json).unwrap();

        assert_eq!(t.root.hash, restored.root.hash);
        assert_eq!(t.file_count, restored.file_count);
        assert!(HashTree::diff(&t, &restored).is_empty());
    }
}
