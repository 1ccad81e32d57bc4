//! File system watcher for detecting changes.
//!
//! Raw events are debounced into coalesced batches on a fixed window; the
//! indexer consumes one settled batch at a time, never one raw event.

use crate::IndexerError;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{new_debouncer, DebouncedEvent, Debouncer, RecommendedCache};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// File change type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// File was created
    Created,
    /// File was modified
    Modified,
    /// File was deleted
    Deleted,
}

/// A file system change event.
#[derive(Debug, Clone)]
pub struct FileChange {
    /// Path to the changed file
    pub path: PathBuf,
    /// Kind of change
    pub kind: ChangeKind,
}

/// Options for the file watcher.
#[derive(Debug, Clone)]
pub struct WatcherOptions {
    /// Debounce duration
    pub debounce_duration: Duration,
    /// Whether to watch recursively
    pub recursive: bool,
}

impl Default for WatcherOptions {
    fn default() -> Self {
        Self {
            debounce_duration: Duration::from_millis(500),
            recursive: true,
        }
    }
}

/// File system watcher with debouncing.
pub struct FileWatcher {
    options: WatcherOptions,
    tx: mpsc::Sender<FileChange>,
    rx: mpsc::Receiver<FileChange>,
    _debouncer: Option<Debouncer<RecommendedWatcher, RecommendedCache>>,
}

impl FileWatcher {
    /// Create a new file watcher.
    pub fn new(options: WatcherOptions) -> Self {
        let (tx, rx) = mpsc::channel(1000);
        Self {
            options,
            tx,
            rx,
            _debouncer: None,
        }
    }

    /// Start watching a directory.
    pub fn watch(&mut self, path: &Path) -> Result<(), IndexerError> {
        let path = path
            .canonicalize()
            .map_err(|_| IndexerError::NotFound(path.to_path_buf()))?;

        let tx = self.tx.clone();

        let mut debouncer = new_debouncer(
            self.options.debounce_duration,
            None,
            move |result: Result<Vec<DebouncedEvent>, Vec<notify::Error>>| match result {
                Ok(events) => {
                    for event in events {
                        if let Some(change) = convert_event(&event.event) {
                            if let Err(e) = tx.blocking_send(change) {
                                error!(error = %e, "Failed to send change event");
                            }
                        }
                    }
                }
                Err(errors) => {
                    for e in errors {
                        warn!(error = %e, "Watcher error");
                    }
                }
            },
        )
        .map_err(|e| IndexerError::Watcher(e.to_string()))?;

        let mode = if self.options.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };

        debouncer
            .watch(&path, mode)
            .map_err(|e: notify::Error| IndexerError::Watcher(e.to_string()))?;

        info!(path = ?path, recursive = self.options.recursive, "Started watching");

        self._debouncer = Some(debouncer);

        Ok(())
    }

    /// Receive the next change event.
    pub async fn next(&mut self) -> Option<FileChange> {
        self.rx.recv().await
    }

    /// Try to receive a change event without blocking.
    pub fn try_next(&mut self) -> Option<FileChange> {
        self.rx.try_recv().ok()
    }

    /// Check if there are pending events.
    pub fn has_pending(&self) -> bool {
        !self.rx.is_empty()
    }
}

/// Convert a notify Event to our FileChange.
fn convert_event(event: &Event) -> Option<FileChange> {
    let path = event.paths.first()?.clone();

    // Only care about files, not directories
    if path.is_dir() {
        return None;
    }

    let kind = match &event.kind {
        EventKind::Create(_) => ChangeKind::Created,
        EventKind::Modify(_) => ChangeKind::Modified,
        EventKind::Remove(_) => ChangeKind::Deleted,
        EventKind::Any => return None,
        EventKind::Access(_) => return None, // Ignore access events
        EventKind::Other => return None,
    };

    debug!(path = ?path, kind = ?kind, "File change detected");

    Some(FileChange { path, kind })
}

/// Collects the changes of one settled debounce window.
#[derive(Debug, Default)]
pub struct ChangeBatcher {
    changes: Vec<FileChange>,
}

impl ChangeBatcher {
    /// Create a new change batcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a change to the batch, deduplicating by path.
    pub fn add(&mut self, change: FileChange) {
        if let Some(existing) = self.changes.iter_mut().find(|c| c.path == change.path) {
            // Delete always wins over modify/create
            if change.kind == ChangeKind::Deleted {
                existing.kind = ChangeKind::Deleted;
            } else if existing.kind != ChangeKind::Deleted {
                existing.kind = change.kind;
            }
        } else {
            self.changes.push(change);
        }
    }

    /// Take the current batch and reset.
    pub fn take(&mut self) -> Vec<FileChange> {
        std::mem::take(&mut self.changes)
    }

    /// Get the number of pending changes.
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_watcher_options_default() {
        let options = WatcherOptions::default();
        assert_eq!(options.debounce_duration, Duration::from_millis(500));
        assert!(options.recursive);
    }

    #[tokio::test]
    async fn test_watcher_create() {
        let temp_dir = tempdir().unwrap();
        let mut watcher = FileWatcher::new(WatcherOptions::default());

        let result = watcher.watch(temp_dir.path());
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_watcher_missing_path() {
        let mut watcher = FileWatcher::new(WatcherOptions::default());
        let result = watcher.watch(Path::new("/nonexistent/semdex/path"));
        assert!(matches!(result, Err(IndexerError::NotFound(_))));
    }

    #[test]
    fn test_change_batcher_deduplication() {
        let mut batcher = ChangeBatcher::new();

        batcher.add(FileChange {
            path: PathBuf::from("test.rs"),
            kind: ChangeKind::Modified,
        });
        batcher.add(FileChange {
            path: PathBuf::from("test.rs"),
            kind: ChangeKind::Modified,
        });

        assert_eq!(batcher.len(), 1);
    }

    #[test]
    fn test_change_batcher_delete_wins() {
        let mut batcher = ChangeBatcher::new();

        batcher.add(FileChange {
            path: PathBuf::from("test.rs"),
            kind: ChangeKind::Modified,
        });
        batcher.add(FileChange {
            path: PathBuf::from("test.rs"),
            kind: ChangeKind::Deleted,
        });

        let batch = batcher.take();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].kind, ChangeKind::Deleted);
    }

    #[test]
    fn test_change_batcher_take_resets() {
        let mut batcher = ChangeBatcher::new();

        batcher.add(FileChange {
            path: PathBuf::from("a.rs"),
            kind: ChangeKind::Created,
        });
        batcher.add(FileChange {
            path: PathBuf::from("b.rs"),
            kind: ChangeKind::Modified,
        });

        let batch = batcher.take();
        assert_eq!(batch.len(), 2);
        assert!(batcher.is_empty());
    }

    #[test]
    fn test_convert_event_kinds() {
        let event = |kind| Event {
            kind,
            paths: vec![PathBuf::from("test.rs")],
            attrs: Default::default(),
        };

        let change = convert_event(&event(EventKind::Create(
            notify::event::CreateKind::File,
        )));
        assert_eq!(change.unwrap().kind, ChangeKind::Created);

        let change = convert_event(&event(EventKind::Modify(notify::event::ModifyKind::Data(
            notify::event::DataChange::Content,
        ))));
        assert_eq!(change.unwrap().kind, ChangeKind::Modified);

        let change = convert_event(&event(EventKind::Remove(
            notify::event::RemoveKind::File,
        )));
        assert_eq!(change.unwrap().kind, ChangeKind::Deleted);

        let change = convert_event(&event(EventKind::Access(
            notify::event::AccessKind::Read,
        )));
        assert!(change.is_none());
    }
}
