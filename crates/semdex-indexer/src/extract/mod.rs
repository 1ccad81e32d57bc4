//! Extraction of semantic entries and cross-references from file content.
//!
//! The indexing core only depends on the [`Extractor`] contract; the
//! built-in [`SourceExtractor`] is one implementation of it. Multiple
//! extractors may be registered and the first whose `can_handle` returns
//! true is used per file.

mod language;
mod source;

pub use language::{detect_language, Language};
pub use source::SourceExtractor;

use semdex_search::{CrossReference, SemanticEntry};
use std::path::Path;

/// Output of extracting one file.
#[derive(Debug, Default)]
pub struct Extraction {
    /// Defined entities found in the file
    pub definitions: Vec<SemanticEntry>,
    /// Usage sites found in the file
    pub references: Vec<CrossReference>,
}

/// A pluggable, language-specific extractor.
pub trait Extractor: Send + Sync {
    /// Whether this extractor understands the given file.
    fn can_handle(&self, path: &Path) -> bool;

    /// Extract definitions and references from file content.
    ///
    /// `path` is the file's path relative to the indexed root; all emitted
    /// locations must use it.
    fn extract(&self, content: &str, path: &Path) -> Extraction;
}

/// Ordered extractor registry; the first matching extractor wins.
pub struct ExtractorSet {
    extractors: Vec<Box<dyn Extractor>>,
}

impl ExtractorSet {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            extractors: Vec::new(),
        }
    }

    /// Registry holding the built-in source extractor.
    pub fn with_defaults() -> Self {
        let mut set = Self::new();
        set.register(Box::new(SourceExtractor::new()));
        set
    }

    /// Register an extractor. Earlier registrations take precedence.
    pub fn register(&mut self, extractor: Box<dyn Extractor>) {
        self.extractors.push(extractor);
    }

    /// Extract a file with the first extractor that can handle it.
    pub fn extract(&self, content: &str, path: &Path) -> Option<Extraction> {
        self.extractors
            .iter()
            .find(|e| e.can_handle(path))
            .map(|e| e.extract(content, path))
    }

    /// Whether any registered extractor can handle the file.
    pub fn can_handle(&self, path: &Path) -> bool {
        self.extractors.iter().any(|e| e.can_handle(path))
    }
}

impl Default for ExtractorSet {
    fn default() -> Self {
        Self::with_defaults()
    }
}
