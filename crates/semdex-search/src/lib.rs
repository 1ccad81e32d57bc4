//! Semdex Search
//!
//! This crate provides the semantic term index and query engine:
//! - Exact and sub-token (fuzzy) term lookup with legacy relevance scoring
//! - Cross-reference tracking and impact analysis
//! - Query pattern parsing (AND/OR/NOT/regex/concept groups) and evaluation
//!
//! Pure data structures and query primitives; persistence is serde-only and
//! handled by the indexer's storage layer.

mod error;
mod index;
mod query;
mod tokenize;
mod types;

pub use error::QueryError;
pub use index::{EntryId, SemanticIndex};
pub use query::{ConceptGroups, Pattern, QueryEngine};
pub use tokenize::{sub_tokens, MIN_TOKEN_LEN};
pub use types::{
    CrossReference, EntryType, ImpactAnalysis, Location, ReferenceKind, SearchOptions,
    SearchResult, SemanticEntry, DEFAULT_MAX_RESULTS, MAX_SAMPLE_USAGES,
};
