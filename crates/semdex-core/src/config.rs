//! Configuration for the Semdex engine.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Data directory for persisted index state
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Glob patterns for files to index
    #[serde(default = "default_patterns")]
    pub patterns: Vec<String>,

    /// Maximum file size to index in bytes (larger files are skipped)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Watcher debounce window in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Default maximum number of search results
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// User-defined concept groups, merged over the built-in table
    #[serde(default)]
    pub groups: HashMap<String, Vec<String>>,
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("semdex")
        .join("projects")
}

fn default_patterns() -> Vec<String> {
    vec![
        "**/*.rs".to_string(),
        "**/*.ts".to_string(),
        "**/*.tsx".to_string(),
        "**/*.js".to_string(),
        "**/*.jsx".to_string(),
        "**/*.py".to_string(),
        "**/*.go".to_string(),
    ]
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024 // 10MB
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_max_results() -> usize {
    100
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            patterns: default_patterns(),
            max_file_size: default_max_file_size(),
            debounce_ms: default_debounce_ms(),
            max_results: default_max_results(),
            groups: HashMap::new(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from the default location, falling back to defaults
    pub fn load() -> Self {
        let config_path = default_data_dir()
            .parent()
            .map(|p| p.join("config.yaml"))
            .unwrap_or_else(|| PathBuf::from("config.yaml"));

        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match serde_yaml::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config file: {}", e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config file: {}", e);
                }
            }
        }

        Self::default()
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Ensure the data directory exists
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)
    }
}
