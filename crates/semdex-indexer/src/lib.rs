//! Semdex Indexer
//!
//! This crate provides the incremental indexing engine for Semdex:
//! - Hierarchical content-hash tree for cheap change detection
//! - Gitignore-aware file walking with include-pattern filtering
//! - File watching with debounced incremental updates
//! - Extractor contract plus a built-in tree-sitter extractor
//! - Persistence of hash tree and semantic index

mod error;
pub mod extract;
mod indexer;
mod storage;
pub mod tree;
mod walk;
pub mod watcher;

pub use error::IndexerError;
pub use extract::{detect_language, Extraction, Extractor, ExtractorSet, Language, SourceExtractor};
pub use indexer::{BuildSummary, IncrementalIndexer, IndexerOptions, IntegrityReport};
pub use storage::{Storage, StorageOptions};
pub use tree::{HashNode, HashNodeKind, HashTree, HashTreeBuilder, TreeDiff};
pub use walk::{FileEntry, Walker};
pub use watcher::{ChangeBatcher, ChangeKind, FileChange, FileWatcher, WatcherOptions};
