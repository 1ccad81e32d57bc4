//! The in-memory semantic term index.
//!
//! Stores entries under their exact lowercased term and under every
//! sub-token decomposition, tracks cross-references by target term, and
//! keeps per-file bookkeeping so a file's contribution can be removed
//! without leaking stale entries.

use crate::tokenize::sub_tokens;
use crate::types::{
    CrossReference, ImpactAnalysis, SearchOptions, SearchResult, SemanticEntry, MAX_SAMPLE_USAGES,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Unique identifier for an indexed entry.
pub type EntryId = u64;

/// Relevance assigned to every hit of an empty query.
const EMPTY_QUERY_RELEVANCE: f32 = 0.5;

/// Dedup key for search hits.
type HitKey = (PathBuf, usize, String);

/// The semantic index. Pure data structure; persistence is handled by the
/// storage layer through serde.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticIndex {
    /// Index format version
    version: u32,

    /// Next entry id to allocate
    next_id: EntryId,

    /// All entries, keyed by id
    entries: HashMap<EntryId, SemanticEntry>,

    /// Exact lowercased term -> entry ids
    term_index: HashMap<String, Vec<EntryId>>,

    /// Sub-token -> entry ids
    token_index: HashMap<String, Vec<EntryId>>,

    /// Source file -> entry ids (required for removal)
    file_entries: HashMap<PathBuf, Vec<EntryId>>,

    /// Lowercased target term -> references to it
    references: HashMap<String, Vec<CrossReference>>,

    /// Source file -> target-term buckets it references (required for removal)
    file_refs: HashMap<PathBuf, HashSet<String>>,
}

impl SemanticIndex {
    /// Create a new empty index.
    pub fn new() -> Self {
        Self {
            version: 1,
            next_id: 0,
            entries: HashMap::new(),
            term_index: HashMap::new(),
            token_index: HashMap::new(),
            file_entries: HashMap::new(),
            references: HashMap::new(),
            file_refs: HashMap::new(),
        }
    }

    /// Register an entry under its exact term, every sub-token, and its file.
    pub fn add(&mut self, entry: SemanticEntry) -> EntryId {
        let id = self.next_id;
        self.next_id += 1;

        let term_key = entry.term.to_lowercase();
        self.term_index.entry(term_key).or_default().push(id);

        for token in sub_tokens(&entry.term) {
            self.token_index.entry(token).or_default().push(id);
        }

        self.file_entries
            .entry(entry.location.file.clone())
            .or_default()
            .push(id);

        self.entries.insert(id, entry);
        id
    }

    /// Record a usage site for a term.
    pub fn add_reference(&mut self, reference: CrossReference) {
        let key = reference.target_term.to_lowercase();

        self.file_refs
            .entry(reference.from.file.clone())
            .or_default()
            .insert(key.clone());

        self.references.entry(key).or_default().push(reference);
    }

    /// Search the index.
    ///
    /// An empty query returns everything passing the filters at relevance
    /// 0.5. Exact mode consults only the exact-term bucket at relevance 1.0.
    /// Fuzzy mode (the default) unions the exact bucket (1.0), the matching
    /// sub-token bucket, and every indexed term containing the query as a
    /// substring, scored `query length / term length`.
    pub fn search(&self, query: &str, options: &SearchOptions) -> Vec<SearchResult> {
        let query = query.trim().to_lowercase();
        let query_len = query.chars().count();

        // (file, line, term) -> (id, best relevance)
        let mut hits: HashMap<HitKey, (EntryId, f32)> = HashMap::new();

        if query.is_empty() {
            let all: Vec<EntryId> = self.entries.keys().copied().collect();
            self.collect_hits(&all, options, &|_| EMPTY_QUERY_RELEVANCE, &mut hits);
        } else if options.exact {
            if let Some(ids) = self.term_index.get(&query) {
                self.collect_hits(ids, options, &|_| 1.0, &mut hits);
            }
        } else {
            // Exact bucket first, at full relevance.
            if let Some(ids) = self.term_index.get(&query) {
                self.collect_hits(ids, options, &|_| 1.0, &mut hits);
            }

            // Sub-token bucket: the query is one of the term's decompositions.
            if let Some(ids) = self.token_index.get(&query) {
                self.collect_hits(
                    ids,
                    options,
                    &|entry| ratio(query_len, entry.term.chars().count()),
                    &mut hits,
                );
            }

            // Every indexed term containing the query as a substring.
            for (term, ids) in &self.term_index {
                if term != &query && term.contains(query.as_str()) {
                    let relevance = ratio(query_len, term.chars().count());
                    self.collect_hits(ids, options, &|_| relevance, &mut hits);
                }
            }
        }

        let mut results: Vec<SearchResult> = hits
            .into_values()
            .filter_map(|(id, relevance)| {
                self.entries
                    .get(&id)
                    .map(|entry| self.make_result(entry.clone(), relevance))
            })
            .collect();

        sort_results(&mut results);
        results.truncate(options.max_results);
        results
    }

    /// Deduplicated union of per-term searches. This is the primitive
    /// concept groups and OR-queries are built on.
    pub fn search_group(&self, terms: &[String], options: &SearchOptions) -> Vec<SearchResult> {
        let mut seen: HashSet<HitKey> = HashSet::new();
        let mut results = Vec::new();

        for term in terms {
            for result in self.search(term, options) {
                let key = (
                    result.entry.location.file.clone(),
                    result.entry.location.line,
                    result.entry.term.clone(),
                );
                if seen.insert(key) {
                    results.push(result);
                }
            }
        }

        sort_results(&mut results);
        results.truncate(options.max_results);
        results
    }

    /// All recorded references targeting a term.
    pub fn references(&self, term: &str) -> Vec<CrossReference> {
        self.references
            .get(&term.to_lowercase())
            .cloned()
            .unwrap_or_default()
    }

    /// Derived cross-reference statistics for a term.
    pub fn impact(&self, term: &str) -> ImpactAnalysis {
        let refs = self.references(term);

        let referencing_files: HashSet<&Path> =
            refs.iter().map(|r| r.from.file.as_path()).collect();

        let mut by_kind = HashMap::new();
        for r in &refs {
            *by_kind.entry(r.kind).or_insert(0) += 1;
        }

        ImpactAnalysis {
            term: term.to_string(),
            total_references: refs.len(),
            referencing_files: referencing_files.len(),
            by_kind,
            samples: refs.iter().take(MAX_SAMPLE_USAGES).cloned().collect(),
        }
    }

    /// Remove every entry and cross-reference sourced from a file, from
    /// every structure they were inserted into.
    pub fn remove_file(&mut self, path: &Path) {
        if let Some(ids) = self.file_entries.remove(path) {
            for id in ids {
                let Some(entry) = self.entries.remove(&id) else {
                    continue;
                };

                let term_key = entry.term.to_lowercase();
                if let Some(bucket) = self.term_index.get_mut(&term_key) {
                    bucket.retain(|&e| e != id);
                    if bucket.is_empty() {
                        self.term_index.remove(&term_key);
                    }
                }

                for token in sub_tokens(&entry.term) {
                    if let Some(bucket) = self.token_index.get_mut(&token) {
                        bucket.retain(|&e| e != id);
                        if bucket.is_empty() {
                            self.token_index.remove(&token);
                        }
                    }
                }
            }
        }

        if let Some(targets) = self.file_refs.remove(path) {
            for target in targets {
                if let Some(refs) = self.references.get_mut(&target) {
                    refs.retain(|r| r.from.file != path);
                    if refs.is_empty() {
                        self.references.remove(&target);
                    }
                }
            }
        }

        debug!(path = ?path, "Removed file from index");
    }

    /// Discard all entries and references.
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Iterate over the files with indexed entries.
    pub fn files(&self) -> impl Iterator<Item = &Path> {
        self.file_entries.keys().map(|p| p.as_path())
    }

    /// Number of files with indexed entries.
    pub fn file_count(&self) -> usize {
        self.file_entries.len()
    }

    /// Total number of entries.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fold a bucket's entries into the hit map, keeping the best
    /// relevance per `(file, line, term)` key.
    fn collect_hits(
        &self,
        ids: &[EntryId],
        options: &SearchOptions,
        relevance_of: &dyn Fn(&SemanticEntry) -> f32,
        hits: &mut HashMap<HitKey, (EntryId, f32)>,
    ) {
        for &id in ids {
            let Some(entry) = self.entries.get(&id) else {
                continue;
            };
            if !self.passes_filters(entry, options) {
                continue;
            }
            let relevance = relevance_of(entry);
            let key = (
                entry.location.file.clone(),
                entry.location.line,
                entry.term.clone(),
            );
            let slot = hits.entry(key).or_insert((id, relevance));
            if relevance > slot.1 {
                *slot = (id, relevance);
            }
        }
    }

    fn passes_filters(&self, entry: &SemanticEntry, options: &SearchOptions) -> bool {
        if !options.entry_types.is_empty() && !options.entry_types.contains(&entry.entry_type) {
            return false;
        }

        if !options.files.is_empty() {
            let path = entry.location.file.to_string_lossy();
            if !options.files.iter().any(|f| path.contains(f.as_str())) {
                return false;
            }
        }

        true
    }

    fn make_result(&self, entry: SemanticEntry, relevance: f32) -> SearchResult {
        let refs = self.references.get(&entry.term.to_lowercase());
        let usage_count = refs.map(|r| r.len()).filter(|&n| n > 0);
        let sample_usages = refs
            .map(|r| r.iter().take(MAX_SAMPLE_USAGES).cloned().collect())
            .unwrap_or_default();

        SearchResult {
            entry,
            relevance,
            usage_count,
            sample_usages,
        }
    }
}

impl Default for SemanticIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// Legacy relevance heuristic: query length over containing-term length.
fn ratio(query_len: usize, term_len: usize) -> f32 {
    if term_len == 0 {
        0.0
    } else {
        query_len as f32 / term_len as f32
    }
}

/// Sort by relevance descending with a deterministic (file, line) tie-break.
fn sort_results(results: &mut [SearchResult]) {
    results.sort_by(|a, b| {
        b.relevance
            .partial_cmp(&a.relevance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.entry.location.file.cmp(&b.entry.location.file))
            .then_with(|| a.entry.location.line.cmp(&b.entry.location.line))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EntryType, Location, ReferenceKind};

    fn entry(term: &str, entry_type: EntryType, file: &str, line: usize) -> SemanticEntry {
        SemanticEntry {
            term: term.to_string(),
            entry_type,
            location: Location::new(file, line, 0),
            context: format!("fn {}()", term),
            surrounding_lines: Vec::new(),
            related_terms: Vec::new(),
            language: "rust".to_string(),
            metadata: None,
        }
    }

    fn reference(target: &str, file: &str, line: usize, kind: ReferenceKind) -> CrossReference {
        CrossReference {
            target_term: target.to_string(),
            kind,
            from: Location::new(file, line, 4),
            context: format!("{}()", target),
        }
    }

    #[test]
    fn test_fuzzy_scoring_example() {
        let mut index = SemanticIndex::new();
        index.add(entry("login", EntryType::Function, "auth.ts", 1));
        index.add(entry("loginUser", EntryType::Function, "auth.ts", 10));

        let results = index.search("login", &SearchOptions::default());
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].entry.term, "login");
        assert_eq!(results[0].relevance, 1.0);
        assert_eq!(results[1].entry.term, "loginUser");
        assert!((results[1].relevance - 5.0 / 9.0).abs() < 1e-6);
    }

    #[test]
    fn test_sub_token_lookup() {
        let mut index = SemanticIndex::new();
        index.add(entry("getUserName", EntryType::Function, "user.ts", 5));

        let results = index.search("user", &SearchOptions::default());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].entry.term, "getUserName");

        let results = index.search("name", &SearchOptions::default());
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_exact_mode() {
        let mut index = SemanticIndex::new();
        index.add(entry("login", EntryType::Function, "auth.ts", 1));
        index.add(entry("loginUser", EntryType::Function, "auth.ts", 10));

        let options = SearchOptions {
            exact: true,
            ..Default::default()
        };
        let results = index.search("login", &options);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].entry.term, "login");
        assert_eq!(results[0].relevance, 1.0);
    }

    #[test]
    fn test_empty_query_returns_everything() {
        let mut index = SemanticIndex::new();
        index.add(entry("alpha", EntryType::Function, "a.ts", 1));
        index.add(entry("beta", EntryType::Variable, "b.ts", 2));

        let results = index.search("", &SearchOptions::default());
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.relevance == 0.5));
    }

    #[test]
    fn test_type_filter() {
        let mut index = SemanticIndex::new();
        index.add(entry("handler", EntryType::Function, "a.ts", 1));
        index.add(entry("handler", EntryType::Variable, "b.ts", 2));

        let options = SearchOptions {
            entry_types: vec![EntryType::Function],
            ..Default::default()
        };
        let results = index.search("handler", &options);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].entry.entry_type, EntryType::Function);
    }

    #[test]
    fn test_file_filter() {
        let mut index = SemanticIndex::new();
        index.add(entry("handler", EntryType::Function, "src/api.ts", 1));
        index.add(entry("handler", EntryType::Function, "test/api_test.ts", 2));

        let options = SearchOptions {
            files: vec!["src/".to_string()],
            ..Default::default()
        };
        let results = index.search("handler", &options);
        assert_eq!(results.len(), 1);
        assert!(results[0].entry.location.file.starts_with("src"));
    }

    #[test]
    fn test_max_results_truncation() {
        let mut index = SemanticIndex::new();
        for i in 0..20 {
            index.add(entry("worker", EntryType::Function, "pool.ts", i + 1));
        }

        let options = SearchOptions {
            max_results: 5,
            ..Default::default()
        };
        let results = index.search("worker", &options);
        assert_eq!(results.len(), 5);
    }

    #[test]
    fn test_dedup_by_file_line_term() {
        let mut index = SemanticIndex::new();
        // Same (file, line, term) registered twice must yield one hit.
        index.add(entry("login", EntryType::Function, "auth.ts", 1));
        index.add(entry("login", EntryType::Function, "auth.ts", 1));

        let results = index.search("login", &SearchOptions::default());
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_search_group_union() {
        let mut index = SemanticIndex::new();
        index.add(entry("login", EntryType::Function, "auth.ts", 1));
        index.add(entry("tokenStore", EntryType::Class, "token.ts", 3));
        index.add(entry("unrelated", EntryType::Variable, "misc.ts", 9));

        let results = index.search_group(
            &["login".to_string(), "token".to_string()],
            &SearchOptions::default(),
        );
        let terms: Vec<&str> = results.iter().map(|r| r.entry.term.as_str()).collect();
        assert!(terms.contains(&"login"));
        assert!(terms.contains(&"tokenStore"));
        assert!(!terms.contains(&"unrelated"));
    }

    #[test]
    fn test_references_and_impact() {
        let mut index = SemanticIndex::new();
        index.add(entry("login", EntryType::Function, "auth.ts", 1));
        index.add_reference(reference("login", "app.ts", 14, ReferenceKind::Call));
        index.add_reference(reference("login", "app.ts", 30, ReferenceKind::Call));
        index.add_reference(reference("login", "main.ts", 2, ReferenceKind::Import));

        let refs = index.references("login");
        assert_eq!(refs.len(), 3);

        let impact = index.impact("login");
        assert_eq!(impact.total_references, 3);
        assert_eq!(impact.referencing_files, 2);
        assert_eq!(impact.by_kind[&ReferenceKind::Call], 2);
        assert_eq!(impact.by_kind[&ReferenceKind::Import], 1);
        assert!(impact.samples.len() <= MAX_SAMPLE_USAGES);
    }

    #[test]
    fn test_search_results_carry_usage_info() {
        let mut index = SemanticIndex::new();
        index.add(entry("login", EntryType::Function, "auth.ts", 1));
        index.add_reference(reference("login", "app.ts", 14, ReferenceKind::Call));

        let results = index.search("login", &SearchOptions::default());
        assert_eq!(results[0].usage_count, Some(1));
        assert_eq!(results[0].sample_usages.len(), 1);
    }

    #[test]
    fn test_remove_file_completeness() {
        let mut index = SemanticIndex::new();
        index.add(entry("login", EntryType::Function, "a.ts", 1));
        index.add(entry("loginUser", EntryType::Function, "b.ts", 2));
        index.add_reference(reference("login", "b.ts", 5, ReferenceKind::Call));
        index.add_reference(reference("login", "c.ts", 7, ReferenceKind::Call));

        index.remove_file(Path::new("b.ts"));

        // No entry from b.ts survives via any search path.
        for query in ["", "login", "user", "loginuser"] {
            let results = index.search(query, &SearchOptions::default());
            assert!(
                results
                    .iter()
                    .all(|r| r.entry.location.file != Path::new("b.ts")),
                "stale entry for query {:?}",
                query
            );
        }

        // No reference from b.ts survives either.
        let refs = index.references("login");
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].from.file, Path::new("c.ts"));

        assert_eq!(index.file_count(), 1);
    }

    #[test]
    fn test_remove_only_targets_named_file() {
        let mut index = SemanticIndex::new();
        index.add(entry("alpha", EntryType::Function, "a.ts", 1));
        index.add(entry("beta", EntryType::Function, "b.ts", 1));

        index.remove_file(Path::new("a.ts"));

        let results = index.search("beta", &SearchOptions::default());
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_serde_round_trip() {
        let mut index = SemanticIndex::new();
        index.add(entry("login", EntryType::Function, "auth.ts", 1));
        index.add(entry("getUserName", EntryType::Function, "user.ts", 5));
        index.add_reference(reference("login", "app.ts", 14, ReferenceKind::Call));

        let bytes = serde_json::to_vec(&index).unwrap();
        let restored: SemanticIndex = serde_json::from_slice(&bytes).unwrap();

        for query in ["login", "user", ""] {
            let before = index.search(query, &SearchOptions::default());
            let after = restored.search(query, &SearchOptions::default());
            assert_eq!(before.len(), after.len(), "query {:?}", query);
            for (b, a) in before.iter().zip(after.iter()) {
                assert_eq!(b.entry.term, a.entry.term);
                assert_eq!(b.relevance, a.relevance);
            }
        }
    }
}
