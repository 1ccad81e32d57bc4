//! File system walker with gitignore and include-pattern support.

use crate::IndexerError;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::{WalkBuilder, WalkState};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use tracing::debug;

/// A discovered file entry.
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// Absolute path to the file
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Last modified time (Unix timestamp)
    pub mtime: u64,
}

/// File system walker that respects .gitignore rules and filters by
/// include glob patterns.
pub struct Walker {
    root: PathBuf,
    include: Option<GlobSet>,
    max_file_size: u64,
}

impl Walker {
    /// Create a new walker for the given root directory.
    ///
    /// An empty pattern list matches every file.
    pub fn new(root: &Path, patterns: &[String], max_file_size: u64) -> Result<Self, IndexerError> {
        let include = if patterns.is_empty() {
            None
        } else {
            let mut builder = GlobSetBuilder::new();
            for pattern in patterns {
                let glob = Glob::new(pattern).map_err(|e| IndexerError::Pattern {
                    pattern: pattern.clone(),
                    message: e.to_string(),
                })?;
                builder.add(glob);
            }
            Some(builder.build().map_err(|e| IndexerError::Pattern {
                pattern: patterns.join(","),
                message: e.to_string(),
            })?)
        };

        Ok(Self {
            root: root.to_path_buf(),
            include,
            max_file_size,
        })
    }

    /// Walk the directory tree and return all matching files.
    pub fn walk(&self) -> Result<Vec<FileEntry>, IndexerError> {
        let (tx, rx) = mpsc::channel();

        let walker = WalkBuilder::new(&self.root)
            .follow_links(false)
            .hidden(true) // Skip hidden files
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .ignore(true)
            .parents(true)
            .build_parallel();

        let root = self.root.clone();
        let include = self.include.clone();
        let max_file_size = self.max_file_size;

        walker.run(|| {
            let tx = tx.clone();
            let root = root.clone();
            let include = include.clone();
            Box::new(move |result| {
                match result {
                    Ok(entry) => {
                        if entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
                            let rel = entry.path().strip_prefix(&root).unwrap_or(entry.path());

                            if let Some(include) = &include {
                                if !include.is_match(rel) {
                                    return WalkState::Continue;
                                }
                            }

                            if let Ok(metadata) = entry.metadata() {
                                if metadata.len() > max_file_size {
                                    debug!(path = ?entry.path(), size = metadata.len(), "Skipping large file");
                                    return WalkState::Continue;
                                }

                                let mtime = metadata
                                    .modified()
                                    .ok()
                                    .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                                    .map(|d| d.as_secs())
                                    .unwrap_or(0);

                                let _ = tx.send(FileEntry {
                                    path: entry.path().to_path_buf(),
                                    size: metadata.len(),
                                    mtime,
                                });
                            }
                        }
                    }
                    Err(e) => {
                        debug!(error = %e, "Walk error");
                        // Don't fail the entire walk for individual errors
                    }
                }
                WalkState::Continue
            })
        });

        drop(tx);

        let mut entries: Vec<FileEntry> = rx.into_iter().collect();

        // Sort by path for deterministic ordering
        entries.sort_by(|a, b| a.path.cmp(&b.path));

        Ok(entries)
    }
}
