//! Hash tree construction from walked files.

use super::{hash_bytes, hash_children, HashNode, HashNodeKind, HashTree};
use crate::walk::Walker;
use crate::IndexerError;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Builds a [`HashTree`] by walking the file system.
pub struct HashTreeBuilder {
    root: PathBuf,
    patterns: Vec<String>,
    max_file_size: u64,
}

/// Intermediate node used while assembling the tree.
enum Pending {
    File { hash: String, size: u64, mtime: u64 },
    Dir(BTreeMap<String, Pending>),
}

impl HashTreeBuilder {
    /// Create a builder for the given root directory.
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            patterns: Vec::new(),
            max_file_size: 10 * 1024 * 1024,
        }
    }

    /// Restrict the walk to the given glob patterns (empty = all files).
    pub fn with_patterns(mut self, patterns: Vec<String>) -> Self {
        self.patterns = patterns;
        self
    }

    /// Skip files larger than this many bytes.
    pub fn with_max_file_size(mut self, max_file_size: u64) -> Self {
        self.max_file_size = max_file_size;
        self
    }

    /// Build a fresh tree, hashing every matched file.
    pub async fn build(&self) -> Result<HashTree, IndexerError> {
        self.build_with_baseline(None).await
    }

    /// Build a tree, reusing a prior snapshot's file hash whenever a
    /// file's `(size, mtime)` is unchanged, so only edited files are
    /// re-hashed.
    pub async fn build_with_baseline(
        &self,
        baseline: Option<&HashTree>,
    ) -> Result<HashTree, IndexerError> {
        let walker = Walker::new(&self.root, &self.patterns, self.max_file_size)?;
        let entries = walker.walk()?;

        let known: HashMap<&Path, (&str, u64, u64)> = baseline
            .map(|tree| {
                tree.files()
                    .into_iter()
                    .filter_map(|node| {
                        node.file_meta()
                            .map(|(size, mtime)| (node.path.as_path(), (node.hash.as_str(), size, mtime)))
                    })
                    .collect()
            })
            .unwrap_or_default();

        let mut top = BTreeMap::new();
        let mut file_count = 0;
        let mut reused = 0;

        for entry in entries {
            let rel = entry
                .path
                .strip_prefix(&self.root)
                .unwrap_or(&entry.path)
                .to_path_buf();

            let hash = match known.get(rel.as_path()) {
                Some(&(hash, size, mtime)) if size == entry.size && mtime == entry.mtime => {
                    reused += 1;
                    hash.to_string()
                }
                _ => match tokio::fs::read(&entry.path).await {
                    Ok(content) => hash_bytes(&content),
                    Err(e) => {
                        // Permission problems or a race with deletion: skip.
                        debug!(path = ?entry.path, error = %e, "Failed to read file");
                        continue;
                    }
                },
            };

            insert(
                &mut top,
                &rel,
                Pending::File {
                    hash,
                    size: entry.size,
                    mtime: entry.mtime,
                },
            );
            file_count += 1;
        }

        let root_name = self
            .root
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("root")
            .to_string();
        let root = finalize(root_name, PathBuf::new(), Pending::Dir(top));

        debug!(files = file_count, reused = reused, "Hash tree built");

        Ok(HashTree {
            version: 1,
            root_path: self.root.clone(),
            root,
            file_count,
            built_at: Utc::now(),
        })
    }
}

/// Insert a file leaf into the pending structure, creating intermediate
/// directories as needed.
fn insert(dir: &mut BTreeMap<String, Pending>, rel: &Path, leaf: Pending) {
    let mut components = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(name) => name.to_str().map(|s| s.to_string()),
            _ => None,
        })
        .peekable();

    let mut current = dir;
    while let Some(name) = components.next() {
        if components.peek().is_none() {
            current.insert(name, leaf);
            return;
        }

        let next = current
            .entry(name)
            .or_insert_with(|| Pending::Dir(BTreeMap::new()));
        match next {
            Pending::Dir(children) => current = children,
            // A file and a directory share a prefix; keep the file.
            Pending::File { .. } => return,
        }
    }
}

/// Turn pending nodes into hash nodes, computing directory hashes
/// bottom-up.
fn finalize(name: String, path: PathBuf, pending: Pending) -> HashNode {
    match pending {
        Pending::File { hash, size, mtime } => HashNode {
            name,
            path,
            hash,
            kind: HashNodeKind::File { size, mtime },
        },
        Pending::Dir(pending_children) => {
            let mut children = BTreeMap::new();
            for (child_name, child_pending) in pending_children {
                let child_path = path.join(&child_name);
                let child = finalize(child_name.clone(), child_path, child_pending);
                children.insert(child_name, child);
            }
            let hash = hash_children(&children);
            HashNode {
                name,
                path,
                hash,
                kind: HashNodeKind::Directory { children },
            }
        }
    }
}
