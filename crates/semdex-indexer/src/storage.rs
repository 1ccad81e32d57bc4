//! Persistence layer for indexer state.
//!
//! Two independently-loadable artifacts per project: the serialized hash
//! tree and the serialized semantic index. A missing or corrupt artifact
//! degrades to "no state" so startup can fall back to a rebuild.

use crate::tree::HashTree;
use crate::IndexerError;
use semdex_search::SemanticIndex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const TREE_ARTIFACT: &str = "hashtree";
const INDEX_ARTIFACT: &str = "index";

/// Storage options.
#[derive(Debug, Clone)]
pub struct StorageOptions {
    /// Base directory for storage
    pub base_dir: PathBuf,
    /// Whether to use MessagePack (JSON otherwise)
    pub use_msgpack: bool,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            base_dir: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("semdex")
                .join("projects"),
            use_msgpack: true,
        }
    }
}

/// Manages persisted state for indexed projects.
pub struct Storage {
    options: StorageOptions,
}

impl Storage {
    /// Create a new storage manager with default options.
    pub fn new(base_dir: PathBuf) -> Self {
        Self {
            options: StorageOptions {
                base_dir,
                ..Default::default()
            },
        }
    }

    /// Create a storage manager with custom options.
    pub fn with_options(options: StorageOptions) -> Self {
        Self { options }
    }

    /// Compute a hash for a project path.
    pub fn project_hash(&self, project_path: &Path) -> String {
        let mut hasher = Sha256::new();
        hasher.update(project_path.to_string_lossy().as_bytes());
        let result = hasher.finalize();
        format!("{:x}", result)[..16].to_string()
    }

    /// Get the storage directory for a project hash.
    pub fn project_dir(&self, hash: &str) -> PathBuf {
        self.options.base_dir.join(hash)
    }

    /// Persist a hash tree.
    pub async fn save_tree(&self, tree: &HashTree, hash: &str) -> Result<(), IndexerError> {
        self.save_artifact(TREE_ARTIFACT, tree, hash).await
    }

    /// Load a persisted hash tree. Missing or corrupt data yields `None`.
    pub async fn load_tree(&self, hash: &str) -> Option<HashTree> {
        self.load_artifact(TREE_ARTIFACT, hash).await
    }

    /// Persist a semantic index.
    pub async fn save_index(&self, index: &SemanticIndex, hash: &str) -> Result<(), IndexerError> {
        self.save_artifact(INDEX_ARTIFACT, index, hash).await
    }

    /// Load a persisted semantic index. Missing or corrupt data yields `None`.
    pub async fn load_index(&self, hash: &str) -> Option<SemanticIndex> {
        self.load_artifact(INDEX_ARTIFACT, hash).await
    }

    /// Check if a project has stored data.
    pub async fn exists(&self, hash: &str) -> bool {
        let dir = self.project_dir(hash);
        dir.join(format!("{}.msgpack", TREE_ARTIFACT)).exists()
            || dir.join(format!("{}.json", TREE_ARTIFACT)).exists()
    }

    /// Delete all stored data for a project.
    pub async fn delete(&self, hash: &str) -> Result<(), IndexerError> {
        let dir = self.project_dir(hash);
        if dir.exists() {
            tokio::fs::remove_dir_all(&dir).await?;
        }
        Ok(())
    }

    async fn save_artifact<T: Serialize>(
        &self,
        name: &str,
        value: &T,
        hash: &str,
    ) -> Result<(), IndexerError> {
        let dir = self.project_dir(hash);
        tokio::fs::create_dir_all(&dir).await?;

        let (path, data) = if self.options.use_msgpack {
            (dir.join(format!("{}.msgpack", name)), rmp_serde::to_vec(value)?)
        } else {
            (
                dir.join(format!("{}.json", name)),
                serde_json::to_vec_pretty(value)?,
            )
        };

        // Atomic write: write to temp file, then rename
        let temp_path = dir.join(format!(".{}.tmp", name));
        tokio::fs::write(&temp_path, &data).await?;
        tokio::fs::rename(&temp_path, &path).await?;

        info!(path = ?path, size = data.len(), "Saved {}", name);

        Ok(())
    }

    async fn load_artifact<T: DeserializeOwned>(&self, name: &str, hash: &str) -> Option<T> {
        let dir = self.project_dir(hash);

        // Try MessagePack first, then JSON
        let msgpack_path = dir.join(format!("{}.msgpack", name));
        if msgpack_path.exists() {
            match tokio::fs::read(&msgpack_path).await {
                Ok(data) => match rmp_serde::from_slice(&data) {
                    Ok(value) => {
                        debug!(path = ?msgpack_path, "Loaded {} (msgpack)", name);
                        return Some(value);
                    }
                    Err(e) => {
                        warn!(path = ?msgpack_path, error = %e, "Corrupt artifact, treating as empty");
                        return None;
                    }
                },
                Err(e) => {
                    warn!(path = ?msgpack_path, error = %e, "Failed to read artifact");
                    return None;
                }
            }
        }

        let json_path = dir.join(format!("{}.json", name));
        if json_path.exists() {
            match tokio::fs::read_to_string(&json_path).await {
                Ok(data) => match serde_json::from_str(&data) {
                    Ok(value) => {
                        debug!(path = ?json_path, "Loaded {} (json)", name);
                        return Some(value);
                    }
                    Err(e) => {
                        warn!(path = ?json_path, error = %e, "Corrupt artifact, treating as empty");
                        return None;
                    }
                },
                Err(e) => {
                    warn!(path = ?json_path, error = %e, "Failed to read artifact");
                    return None;
                }
            }
        }

        None
    }
}

impl Default for Storage {
    fn default() -> Self {
        Self::with_options(StorageOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::HashTreeBuilder;
    use semdex_search::{EntryType, Location, SearchOptions, SemanticEntry};
    use std::fs;
    use tempfile::tempdir;

    fn test_storage(base: &Path) -> Storage {
        Storage::new(base.to_path_buf())
    }

    async fn sample_tree(dir: &Path) -> HashTree {
        fs::write(dir.join("a.rs"), "fn a() {}").unwrap();
        HashTreeBuilder::new(dir).build().await.unwrap()
    }

    fn sample_index() -> SemanticIndex {
        let mut index = SemanticIndex::new();
        index.add(SemanticEntry {
            term: "login".to_string(),
            entry_type: EntryType::Function,
            location: Location::new("auth.rs", 1, 0),
            context: "fn login() {}".to_string(),
            surrounding_lines: Vec::new(),
            related_terms: Vec::new(),
            language: "rust".to_string(),
            metadata: None,
        });
        index
    }

    #[tokio::test]
    async fn test_save_and_load_tree() {
        let temp_dir = tempdir().unwrap();
        let project = temp_dir.path().join("project");
        fs::create_dir_all(&project).unwrap();

        let storage = test_storage(&temp_dir.path().join("data"));
        let tree = sample_tree(&project).await;
        let hash = storage.project_hash(&project);

        storage.save_tree(&tree, &hash).await.unwrap();

        let loaded = storage.load_tree(&hash).await.unwrap();
        assert_eq!(tree.root.hash, loaded.root.hash);
        assert_eq!(tree.file_count, loaded.file_count);
    }

    #[tokio::test]
    async fn test_save_and_load_index() {
        let temp_dir = tempdir().unwrap();
        let storage = test_storage(temp_dir.path());
        let index = sample_index();

        storage.save_index(&index, "abc123").await.unwrap();

        let loaded = storage.load_index("abc123").await.unwrap();
        let results = loaded.search("login", &SearchOptions::default());
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_load_missing_returns_none() {
        let temp_dir = tempdir().unwrap();
        let storage = test_storage(temp_dir.path());

        assert!(storage.load_tree("nonexistent").await.is_none());
        assert!(storage.load_index("nonexistent").await.is_none());
    }

    #[tokio::test]
    async fn test_load_corrupt_returns_none() {
        let temp_dir = tempdir().unwrap();
        let storage = test_storage(temp_dir.path());

        let dir = storage.project_dir("bad");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("index.msgpack"), b"not msgpack at all").unwrap();

        assert!(storage.load_index("bad").await.is_none());
    }

    #[tokio::test]
    async fn test_exists_and_delete() {
        let temp_dir = tempdir().unwrap();
        let project = temp_dir.path().join("project");
        fs::create_dir_all(&project).unwrap();

        let storage = test_storage(&temp_dir.path().join("data"));
        let tree = sample_tree(&project).await;
        let hash = storage.project_hash(&project);

        assert!(!storage.exists(&hash).await);

        storage.save_tree(&tree, &hash).await.unwrap();
        assert!(storage.exists(&hash).await);

        storage.delete(&hash).await.unwrap();
        assert!(!storage.exists(&hash).await);
    }

    #[test]
    fn test_project_hash_is_stable() {
        let storage = Storage::default();
        let h1 = storage.project_hash(Path::new("/some/project"));
        let h2 = storage.project_hash(Path::new("/some/project"));
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 16);
    }
}
