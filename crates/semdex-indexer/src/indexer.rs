//! Incremental indexing orchestration.
//!
//! Keeps the hash tree and the semantic index mutually consistent under
//! full-build and incremental-update workloads. All mutations serialize on
//! one lock; searches read the shared index concurrently and may observe a
//! partially-updated index during an update (accepted trade-off, no
//! snapshot isolation).

use crate::extract::ExtractorSet;
use crate::storage::Storage;
use crate::tree::{HashTree, HashTreeBuilder, TreeDiff};
use crate::watcher::{ChangeBatcher, FileWatcher, WatcherOptions};
use crate::IndexerError;
use parking_lot::{Mutex, RwLock};
use semdex_search::SemanticIndex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Options for the incremental indexer.
#[derive(Debug, Clone)]
pub struct IndexerOptions {
    /// Glob patterns for files to index (empty = all files)
    pub patterns: Vec<String>,
    /// Maximum file size to index in bytes
    pub max_file_size: u64,
    /// Watcher debounce window
    pub debounce_duration: Duration,
}

impl Default for IndexerOptions {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
            max_file_size: 10 * 1024 * 1024, // 10MB
            debounce_duration: Duration::from_millis(500),
        }
    }
}

/// Result of a completed full build.
#[derive(Debug, Clone)]
pub struct BuildSummary {
    /// Number of files in the hash tree
    pub files: usize,
    /// Number of semantic entries indexed
    pub entries: usize,
    /// Number of cross-references indexed
    pub references: usize,
    /// Build duration in milliseconds
    pub duration_ms: u64,
}

/// Structured result of an integrity check. Reported, never auto-repaired;
/// repair is an explicit [`IncrementalIndexer::force_rebuild`].
#[derive(Debug, Clone)]
pub struct IntegrityReport {
    /// Files tracked by the hash tree
    pub tracked_files: usize,
    /// Files with indexed entries
    pub indexed_files: usize,
    /// Extractable files tracked by the tree but absent from the index
    pub missing_from_index: Vec<PathBuf>,
    /// Files with entries that the tree no longer tracks
    pub orphaned_in_index: Vec<PathBuf>,
}

impl IntegrityReport {
    /// Whether tree and index agree.
    pub fn is_consistent(&self) -> bool {
        self.missing_from_index.is_empty() && self.orphaned_in_index.is_empty()
    }
}

/// Orchestrates hash tree, extractors, semantic index and persistence.
pub struct IncrementalIndexer {
    root: PathBuf,
    options: IndexerOptions,
    extractors: ExtractorSet,
    storage: Storage,
    project_hash: String,

    tree: RwLock<Option<HashTree>>,
    index: Arc<RwLock<SemanticIndex>>,

    /// Serializes every mutation (build, update, rebuild).
    mutate_lock: tokio::sync::Mutex<()>,
    /// Bumped after each completed full build; lets a caller that waited
    /// out another build reuse its result instead of re-entering the
    /// build path.
    generation: AtomicU64,
    last_summary: Mutex<Option<BuildSummary>>,

    watch_shutdown: Notify,
    watch_task: Mutex<Option<JoinHandle<()>>>,
}

impl IncrementalIndexer {
    /// Create an indexer for the given project root.
    pub fn new(root: &Path, options: IndexerOptions, storage: Storage) -> Self {
        let project_hash = storage.project_hash(root);
        Self {
            root: root.to_path_buf(),
            options,
            extractors: ExtractorSet::with_defaults(),
            storage,
            project_hash,
            tree: RwLock::new(None),
            index: Arc::new(RwLock::new(SemanticIndex::new())),
            mutate_lock: tokio::sync::Mutex::new(()),
            generation: AtomicU64::new(0),
            last_summary: Mutex::new(None),
            watch_shutdown: Notify::new(),
            watch_task: Mutex::new(None),
        }
    }

    /// Replace the extractor registry.
    pub fn with_extractors(mut self, extractors: ExtractorSet) -> Self {
        self.extractors = extractors;
        self
    }

    /// The indexed project root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Shared handle to the semantic index for concurrent reads.
    pub fn index(&self) -> Arc<RwLock<SemanticIndex>> {
        Arc::clone(&self.index)
    }

    /// Attempt to load persisted state. Returns whether both artifacts were
    /// restored; absence or corruption just means a full build is needed.
    pub async fn initialize(&self) -> bool {
        let _guard = self.mutate_lock.lock().await;

        let tree = self.storage.load_tree(&self.project_hash).await;
        let index = self.storage.load_index(&self.project_hash).await;

        match (tree, index) {
            (Some(tree), Some(index)) => {
                info!(
                    files = tree.file_count,
                    entries = index.entry_count(),
                    "Loaded persisted index state"
                );
                *self.tree.write() = Some(tree);
                *self.index.write() = index;
                true
            }
            _ => {
                info!("No persisted state; a full build is required");
                false
            }
        }
    }

    /// Full build: walk and hash the tree, extract every file, persist.
    ///
    /// Concurrent calls collapse into the single in-flight build: later
    /// callers wait on the mutation lock and return the completed build's
    /// summary instead of building again.
    pub async fn build_index(&self) -> Result<BuildSummary, IndexerError> {
        let entry_generation = self.generation.load(Ordering::SeqCst);
        let _guard = self.mutate_lock.lock().await;

        if self.generation.load(Ordering::SeqCst) != entry_generation {
            if let Some(summary) = self.last_summary.lock().clone() {
                debug!("Joined a build that completed while waiting");
                return Ok(summary);
            }
        }

        self.run_full_build().await
    }

    /// Apply a tree diff to the index: deleted files are removed, modified
    /// files are removed then re-extracted, added files are extracted.
    /// Both structures are persisted before returning.
    pub async fn update_index(&self, diff: &TreeDiff) -> Result<(), IndexerError> {
        let _guard = self.mutate_lock.lock().await;
        self.apply_update(diff).await
    }

    /// Rebuild the hash tree against the current baseline, diff, and apply
    /// the changes. Returns the diff (empty when nothing changed).
    pub async fn refresh(&self) -> Result<TreeDiff, IndexerError> {
        let _guard = self.mutate_lock.lock().await;

        let baseline = { self.tree.read().clone() };

        let new_tree = self
            .tree_builder()
            .build_with_baseline(baseline.as_ref())
            .await?;

        let diff = match &baseline {
            Some(old) => HashTree::diff(old, &new_tree),
            None => TreeDiff::all_added(&new_tree),
        };

        if baseline.is_some() && diff.is_empty() {
            return Ok(diff);
        }

        *self.tree.write() = Some(new_tree);
        self.apply_update(&diff).await?;

        Ok(diff)
    }

    /// Clear the semantic index and redo a full build.
    pub async fn force_rebuild(&self) -> Result<BuildSummary, IndexerError> {
        let _guard = self.mutate_lock.lock().await;

        info!("Forcing full rebuild");
        {
            self.index.write().clear();
            *self.tree.write() = None;
        }

        self.run_full_build().await
    }

    /// Compare tree-tracked files against index-tracked files.
    pub fn check_integrity(&self) -> IntegrityReport {
        let tree = self.tree.read();
        let index = self.index.read();

        let tracked: HashSet<PathBuf> = tree
            .as_ref()
            .map(|t| t.files().iter().map(|n| n.path.clone()).collect())
            .unwrap_or_default();
        let indexed: HashSet<PathBuf> = index.files().map(|p| p.to_path_buf()).collect();

        // Files no extractor handles are tracked but legitimately unindexed.
        let mut missing_from_index: Vec<PathBuf> = tracked
            .difference(&indexed)
            .filter(|p| self.extractors.can_handle(p))
            .cloned()
            .collect();
        let mut orphaned_in_index: Vec<PathBuf> =
            indexed.difference(&tracked).cloned().collect();

        missing_from_index.sort_unstable();
        orphaned_in_index.sort_unstable();

        IntegrityReport {
            tracked_files: tracked.len(),
            indexed_files: indexed.len(),
            missing_from_index,
            orphaned_in_index,
        }
    }

    /// Start the watch loop: debounced change batches trigger sequential
    /// incremental updates. No-op when already watching.
    pub fn start_watching(self: &Arc<Self>) -> Result<(), IndexerError> {
        let mut task_slot = self.watch_task.lock();
        if task_slot.is_some() {
            return Ok(());
        }

        let mut watcher = FileWatcher::new(WatcherOptions {
            debounce_duration: self.options.debounce_duration,
            recursive: true,
        });
        watcher.watch(&self.root)?;

        let indexer = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = indexer.watch_shutdown.notified() => break,
                    change = watcher.next() => {
                        let Some(first) = change else { break };

                        // Drain the rest of the settled batch.
                        let mut batcher = ChangeBatcher::new();
                        batcher.add(first);
                        while let Some(next) = watcher.try_next() {
                            batcher.add(next);
                        }

                        let batch = batcher.take();
                        debug!(changes = batch.len(), "Processing change batch");

                        if let Err(e) = indexer.refresh().await {
                            warn!(error = %e, "Incremental update failed");
                        }
                    }
                }
            }
            debug!("Watch task stopped");
        });

        *task_slot = Some(handle);
        Ok(())
    }

    /// Stop scheduling new diffs. An update already in flight completes.
    pub fn stop_watching(&self) {
        if self.watch_task.lock().take().is_some() {
            self.watch_shutdown.notify_one();
            info!("Stopped watching");
        }
    }

    /// Whether the watch loop is running.
    pub fn is_watching(&self) -> bool {
        self.watch_task.lock().is_some()
    }

    fn tree_builder(&self) -> HashTreeBuilder {
        HashTreeBuilder::new(&self.root)
            .with_patterns(self.options.patterns.clone())
            .with_max_file_size(self.options.max_file_size)
    }

    /// Full build body. Caller must hold the mutation lock.
    async fn run_full_build(&self) -> Result<BuildSummary, IndexerError> {
        let start = Instant::now();

        let tree = self.tree_builder().build().await?;
        let files: Vec<PathBuf> = tree.files().iter().map(|n| n.path.clone()).collect();

        let mut index = SemanticIndex::new();
        let mut entry_count = 0;
        let mut reference_count = 0;

        for path in &files {
            let absolute = self.root.join(path);
            let content = match tokio::fs::read_to_string(&absolute).await {
                Ok(content) => content,
                Err(e) => {
                    debug!(path = ?path, error = %e, "Skipping unreadable file");
                    continue;
                }
            };

            if let Some(extraction) = self.extractors.extract(&content, path) {
                entry_count += extraction.definitions.len();
                reference_count += extraction.references.len();
                for definition in extraction.definitions {
                    index.add(definition);
                }
                for reference in extraction.references {
                    index.add_reference(reference);
                }
            }
        }

        {
            *self.tree.write() = Some(tree);
            *self.index.write() = index;
        }

        self.persist().await?;

        let summary = BuildSummary {
            files: files.len(),
            entries: entry_count,
            references: reference_count,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        self.generation.fetch_add(1, Ordering::SeqCst);
        *self.last_summary.lock() = Some(summary.clone());

        info!(
            files = summary.files,
            entries = summary.entries,
            references = summary.references,
            duration_ms = summary.duration_ms,
            "Index built"
        );

        Ok(summary)
    }

    /// Update body. Caller must hold the mutation lock.
    async fn apply_update(&self, diff: &TreeDiff) -> Result<(), IndexerError> {
        {
            let mut index = self.index.write();
            for path in &diff.deleted {
                index.remove_file(path);
            }
            // Modified files are re-extracted below; drop stale entries first.
            for path in &diff.modified {
                index.remove_file(path);
            }
        }

        for path in diff.modified.iter().chain(diff.added.iter()) {
            let absolute = self.root.join(path);
            let content = match tokio::fs::read_to_string(&absolute).await {
                Ok(content) => content,
                Err(e) => {
                    debug!(path = ?path, error = %e, "Skipping unreadable file");
                    continue;
                }
            };

            if let Some(extraction) = self.extractors.extract(&content, path) {
                let mut index = self.index.write();
                for definition in extraction.definitions {
                    index.add(definition);
                }
                for reference in extraction.references {
                    index.add_reference(reference);
                }
            }
        }

        self.persist().await?;

        info!(
            added = diff.added.len(),
            modified = diff.modified.len(),
            deleted = diff.deleted.len(),
            "Index updated"
        );

        Ok(())
    }

    /// Persist both structures; callers hold the mutation lock, so a
    /// restart never observes state older than the last completed update.
    async fn persist(&self) -> Result<(), IndexerError> {
        let tree_snapshot = { self.tree.read().clone() };
        let index_snapshot = { self.index.read().clone() };

        if let Some(tree) = &tree_snapshot {
            self.storage.save_tree(tree, &self.project_hash).await?;
        }
        self.storage.save_index(&index_snapshot, &self.project_hash).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use semdex_search::SearchOptions;
    use std::fs;
    use tempfile::tempdir;

    fn write_project(root: &Path) {
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(
            root.join("src/auth.rs"),
            "fn login() {}\nfn logout() {}\n",
        )
        .unwrap();
        fs::write(
            root.join("src/user.rs"),
            "fn get_user_name() -> String { login(); String::new() }\n",
        )
        .unwrap();
    }

    fn indexer_for(root: &Path, data_dir: &Path) -> IncrementalIndexer {
        IncrementalIndexer::new(
            root,
            IndexerOptions::default(),
            Storage::new(data_dir.to_path_buf()),
        )
    }

    #[tokio::test]
    async fn test_full_build_indexes_project() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path().join("project");
        write_project(&root);

        let indexer = indexer_for(&root, &temp_dir.path().join("data"));
        let summary = indexer.build_index().await.unwrap();

        assert_eq!(summary.files, 2);
        assert!(summary.entries > 0);

        let index = indexer.index();
        let results = index.read().search("login", &SearchOptions::default());
        assert!(!results.is_empty());
    }

    #[tokio::test]
    async fn test_initialize_without_state() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path().join("project");
        write_project(&root);

        let indexer = indexer_for(&root, &temp_dir.path().join("data"));
        assert!(!indexer.initialize().await);
    }

    #[tokio::test]
    async fn test_initialize_restores_persisted_state() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path().join("project");
        let data = temp_dir.path().join("data");
        write_project(&root);

        let first = indexer_for(&root, &data);
        first.build_index().await.unwrap();

        let second = indexer_for(&root, &data);
        assert!(second.initialize().await);

        let index = second.index();
        let results = index.read().search("login", &SearchOptions::default());
        assert!(!results.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_picks_up_edit() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path().join("project");
        write_project(&root);

        let indexer = indexer_for(&root, &temp_dir.path().join("data"));
        indexer.build_index().await.unwrap();

        fs::write(root.join("src/auth.rs"), "fn login_redesigned() {}\n").unwrap();

        let diff = indexer.refresh().await.unwrap();
        assert_eq!(diff.modified, vec![PathBuf::from("src/auth.rs")]);
        assert!(diff.added.is_empty());
        assert!(diff.deleted.is_empty());

        let index = indexer.index();
        let guard = index.read();
        let stale = guard.search("logout", &SearchOptions::default());
        assert!(stale.is_empty(), "stale entry survived the update");
        let fresh = guard.search("redesigned", &SearchOptions::default());
        assert!(!fresh.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_handles_deletion() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path().join("project");
        write_project(&root);

        let indexer = indexer_for(&root, &temp_dir.path().join("data"));
        indexer.build_index().await.unwrap();

        fs::remove_file(root.join("src/user.rs")).unwrap();

        let diff = indexer.refresh().await.unwrap();
        assert_eq!(diff.deleted, vec![PathBuf::from("src/user.rs")]);

        let index = indexer.index();
        let results = index.read().search("", &SearchOptions::default());
        assert!(results
            .iter()
            .all(|r| r.entry.location.file != Path::new("src/user.rs")));
    }

    #[tokio::test]
    async fn test_update_index_applies_diff() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path().join("project");
        write_project(&root);

        let indexer = indexer_for(&root, &temp_dir.path().join("data"));
        indexer.build_index().await.unwrap();

        let diff = TreeDiff {
            added: Vec::new(),
            modified: Vec::new(),
            deleted: vec![PathBuf::from("src/auth.rs")],
        };
        indexer.update_index(&diff).await.unwrap();

        let index = indexer.index();
        let results = index.read().search("login", &SearchOptions::default());
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_without_changes_is_empty() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path().join("project");
        write_project(&root);

        let indexer = indexer_for(&root, &temp_dir.path().join("data"));
        indexer.build_index().await.unwrap();

        let diff = indexer.refresh().await.unwrap();
        assert!(diff.is_empty());
    }

    #[tokio::test]
    async fn test_rebuild_is_idempotent() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path().join("project");
        write_project(&root);

        let indexer = indexer_for(&root, &temp_dir.path().join("data"));
        let first = indexer.build_index().await.unwrap();
        let second = indexer.force_rebuild().await.unwrap();

        assert_eq!(first.files, second.files);
        assert_eq!(first.entries, second.entries);

        let index = indexer.index();
        let everything = index.read().search(
            "",
            &SearchOptions {
                max_results: usize::MAX,
                ..Default::default()
            },
        );
        assert_eq!(everything.len(), second.entries);
    }

    #[tokio::test]
    async fn test_concurrent_builds_collapse() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path().join("project");
        write_project(&root);

        let indexer = Arc::new(indexer_for(&root, &temp_dir.path().join("data")));

        let a = {
            let indexer = Arc::clone(&indexer);
            tokio::spawn(async move { indexer.build_index().await.unwrap() })
        };
        let b = {
            let indexer = Arc::clone(&indexer);
            tokio::spawn(async move { indexer.build_index().await.unwrap() })
        };

        let (a, b) = (a.await.unwrap(), b.await.unwrap());
        assert_eq!(a.files, b.files);
        assert_eq!(a.entries, b.entries);
    }

    #[tokio::test]
    async fn test_check_integrity_consistent_after_build() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path().join("project");
        write_project(&root);

        let indexer = indexer_for(&root, &temp_dir.path().join("data"));
        indexer.build_index().await.unwrap();

        let report = indexer.check_integrity();
        assert!(report.is_consistent(), "report: {:?}", report);
        assert_eq!(report.tracked_files, 2);
    }

    #[tokio::test]
    async fn test_check_integrity_detects_orphans() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path().join("project");
        write_project(&root);

        let indexer = indexer_for(&root, &temp_dir.path().join("data"));
        indexer.build_index().await.unwrap();

        // Simulate drift: the tree forgets a file the index still has.
        fs::remove_file(root.join("src/user.rs")).unwrap();
        {
            let baseline = indexer.tree.read().clone().unwrap();
            let rebuilt = indexer
                .tree_builder()
                .build_with_baseline(Some(&baseline))
                .await
                .unwrap();
            *indexer.tree.write() = Some(rebuilt);
        }

        let report = indexer.check_integrity();
        assert!(!report.is_consistent());
        assert_eq!(
            report.orphaned_in_index,
            vec![PathBuf::from("src/user.rs")]
        );
    }
}
