//! Semantic entry and cross-reference types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Maximum number of sample usages attached to a search result.
pub const MAX_SAMPLE_USAGES: usize = 3;

/// Default maximum number of search results.
pub const DEFAULT_MAX_RESULTS: usize = 100;

/// Kind of indexed entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    Function,
    Class,
    Variable,
    Constant,
    String,
    Comment,
    Import,
    File,
}

impl EntryType {
    /// Get the display name for this entry type.
    pub fn name(&self) -> &'static str {
        match self {
            EntryType::Function => "function",
            EntryType::Class => "class",
            EntryType::Variable => "variable",
            EntryType::Constant => "constant",
            EntryType::String => "string",
            EntryType::Comment => "comment",
            EntryType::Import => "import",
            EntryType::File => "file",
        }
    }

    /// Parse an entry type from its display name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "function" => Some(EntryType::Function),
            "class" => Some(EntryType::Class),
            "variable" => Some(EntryType::Variable),
            "constant" => Some(EntryType::Constant),
            "string" => Some(EntryType::String),
            "comment" => Some(EntryType::Comment),
            "import" => Some(EntryType::Import),
            "file" => Some(EntryType::File),
            _ => None,
        }
    }
}

/// How a usage site refers to a definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReferenceKind {
    Call,
    Import,
    Extends,
    Implements,
    Instantiation,
    TypeReference,
}

/// A source location.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    /// File path, relative to the indexed root
    pub file: PathBuf,
    /// Line number (1-indexed)
    pub line: usize,
    /// Column number (0-indexed)
    pub column: usize,
}

impl Location {
    /// Create a new location.
    pub fn new(file: impl Into<PathBuf>, line: usize, column: usize) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }
}

/// A semantic entry produced by an extractor and owned by the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticEntry {
    /// The indexed term (identifier, string or comment text)
    pub term: String,
    /// Kind of entity
    pub entry_type: EntryType,
    /// Where the entity is defined
    pub location: Location,
    /// The source line containing the entity
    pub context: String,
    /// Surrounding source lines, in order, for display
    #[serde(default)]
    pub surrounding_lines: Vec<String>,
    /// Nearby identifiers on the same line
    #[serde(default)]
    pub related_terms: Vec<String>,
    /// Source language name (e.g. "rust")
    #[serde(default)]
    pub language: String,
    /// Extractor-specific metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
}

/// A recorded usage site pointing back at a defined term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossReference {
    /// The term being referenced
    pub target_term: String,
    /// How the site refers to the term
    pub kind: ReferenceKind,
    /// Where the reference occurs
    pub from: Location,
    /// The source line containing the reference
    pub context: String,
}

/// A ranked search hit. Computed at query time, never persisted.
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// The matched entry
    pub entry: SemanticEntry,
    /// Relevance score in [0.0, 1.0]
    pub relevance: f32,
    /// Number of recorded usages of the matched term
    pub usage_count: Option<usize>,
    /// Up to [`MAX_SAMPLE_USAGES`] usage sites for display
    pub sample_usages: Vec<CrossReference>,
}

/// Options controlling a search.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Entry-type allow-list (empty = all types)
    pub entry_types: Vec<EntryType>,
    /// File-path substring allow-list (empty = all files)
    pub files: Vec<String>,
    /// Maximum number of results to return
    pub max_results: usize,
    /// Only match the exact (lowercased) term
    pub exact: bool,
    /// Treat the query as a regular expression
    pub regex: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            entry_types: Vec::new(),
            files: Vec::new(),
            max_results: DEFAULT_MAX_RESULTS,
            exact: false,
            regex: false,
        }
    }
}

/// Aggregated cross-reference statistics for a term.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpactAnalysis {
    /// The analyzed term
    pub term: String,
    /// Total number of recorded references
    pub total_references: usize,
    /// Number of distinct files referencing the term
    pub referencing_files: usize,
    /// Reference counts grouped by kind
    pub by_kind: HashMap<ReferenceKind, usize>,
    /// Up to [`MAX_SAMPLE_USAGES`] sample references
    pub samples: Vec<CrossReference>,
}
