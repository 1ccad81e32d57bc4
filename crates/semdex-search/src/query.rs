//! Query pattern parsing and evaluation.
//!
//! Supports plain multi-word text, OR (`a|b|c`), AND (`a&b`), NOT (`!a`),
//! regex (`/pattern/`), and named concept groups.

use crate::error::QueryError;
use crate::index::SemanticIndex;
use crate::types::{SearchOptions, SearchResult};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use tracing::debug;

/// A named, curated table of related search terms.
///
/// Built-in groups are merged with user-defined overrides; an override with
/// an existing name replaces the built-in term list.
#[derive(Debug, Clone)]
pub struct ConceptGroups {
    groups: HashMap<String, Vec<String>>,
}

impl ConceptGroups {
    /// The built-in group table.
    pub fn builtin() -> Self {
        let mut groups = HashMap::new();
        let table: &[(&str, &[&str])] = &[
            (
                "auth",
                &["login", "logout", "auth", "token", "password", "credential", "session", "jwt", "oauth"],
            ),
            (
                "database",
                &["database", "query", "sql", "repository", "model", "schema", "migration", "transaction"],
            ),
            (
                "api",
                &["endpoint", "route", "controller", "handler", "request", "response", "middleware"],
            ),
            (
                "error",
                &["error", "exception", "fail", "catch", "throw", "panic", "retry"],
            ),
            ("user", &["user", "account", "profile", "member", "role"]),
            (
                "config",
                &["config", "setting", "option", "environment", "preference", "flag"],
            ),
            ("test", &["test", "spec", "mock", "fixture", "assert", "expect"]),
            ("cache", &["cache", "memo", "store", "buffer", "evict"]),
            (
                "payment",
                &["payment", "billing", "invoice", "charge", "subscription", "refund"],
            ),
        ];

        for (name, terms) in table {
            groups.insert(
                name.to_string(),
                terms.iter().map(|t| t.to_string()).collect(),
            );
        }

        Self { groups }
    }

    /// Built-in table merged with user overrides.
    pub fn with_overrides(overrides: &HashMap<String, Vec<String>>) -> Self {
        let mut base = Self::builtin();
        for (name, terms) in overrides {
            base.groups.insert(name.clone(), terms.clone());
        }
        base
    }

    /// Look up a group's term list by name.
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.groups.get(&name.to_lowercase()).map(|v| v.as_slice())
    }

    /// All group names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.groups.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl Default for ConceptGroups {
    fn default() -> Self {
        Self::builtin()
    }
}

/// A parsed query pattern.
#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    /// Space-separated words: AND first, fall back to OR on zero hits
    Words(Vec<String>),
    /// `a|b|c`
    Or(Vec<String>),
    /// `a&b`
    And(Vec<String>),
    /// `!a`
    Not(String),
    /// `/regex/` or the regex option
    Regex(String),
    /// A known concept-group name
    Group(String),
    /// Anything else
    Plain(String),
}

/// Parses the search-pattern syntax and evaluates it against a
/// [`SemanticIndex`]. Reads the index, never mutates it.
pub struct QueryEngine {
    groups: ConceptGroups,
}

impl QueryEngine {
    /// Create an engine with the given concept-group table.
    pub fn new(groups: ConceptGroups) -> Self {
        Self { groups }
    }

    /// Parse a raw query string into a pattern.
    ///
    /// Forms are checked in a fixed priority order and the first match wins:
    /// multi-word text, `|`, `&`, `!`, `/regex/`, concept group, plain term.
    /// A string mixing operators (e.g. `a&b|c`) resolves by that same order,
    /// so `|` splits first and `a&b` survives as a literal term.
    pub fn parse(&self, raw: &str) -> Pattern {
        let raw = raw.trim();

        let has_operator = raw.contains('|')
            || raw.contains('&')
            || raw.starts_with('!')
            || is_regex_form(raw);

        if raw.split_whitespace().nth(1).is_some() && !has_operator {
            return Pattern::Words(raw.split_whitespace().map(|w| w.to_string()).collect());
        }

        if raw.contains('|') {
            return Pattern::Or(split_terms(raw, '|'));
        }

        if raw.contains('&') {
            return Pattern::And(split_terms(raw, '&'));
        }

        if let Some(term) = raw.strip_prefix('!') {
            return Pattern::Not(term.trim().to_string());
        }

        if is_regex_form(raw) {
            return Pattern::Regex(raw[1..raw.len() - 1].to_string());
        }

        if self.groups.get(raw).is_some() {
            return Pattern::Group(raw.to_lowercase());
        }

        Pattern::Plain(raw.to_string())
    }

    /// Evaluate a raw query against the index and return ranked results.
    pub fn evaluate(
        &self,
        index: &SemanticIndex,
        raw: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SearchResult>, QueryError> {
        let pattern = if options.regex {
            Pattern::Regex(raw.trim().to_string())
        } else {
            self.parse(raw)
        };

        debug!(query = raw, pattern = ?pattern, "Evaluating query");

        match pattern {
            Pattern::Words(words) => {
                let results = self.eval_and(index, &words, options);
                if results.is_empty() {
                    Ok(index.search_group(&words, options))
                } else {
                    Ok(results)
                }
            }
            Pattern::Or(terms) => Ok(index.search_group(&terms, options)),
            Pattern::And(terms) => Ok(self.eval_and(index, &terms, options)),
            Pattern::Not(term) => Ok(self.eval_not(index, &term, options)),
            Pattern::Regex(pattern) => self.eval_regex(index, &pattern, options),
            Pattern::Group(name) => {
                let terms = self
                    .groups
                    .get(&name)
                    .map(|t| t.to_vec())
                    .unwrap_or_default();
                Ok(index.search_group(&terms, options))
            }
            Pattern::Plain(term) => Ok(index.search(&term, options)),
        }
    }

    /// Per-location intersection: keep results of the first term whose
    /// `(file, line)` also appears in every subsequent term's results.
    fn eval_and(
        &self,
        index: &SemanticIndex,
        terms: &[String],
        options: &SearchOptions,
    ) -> Vec<SearchResult> {
        let Some((first, rest)) = terms.split_first() else {
            return Vec::new();
        };

        let unbounded = unbounded(options);
        let mut results = index.search(first, &unbounded);

        for term in rest {
            let locations: HashSet<(PathBuf, usize)> = index
                .search(term, &unbounded)
                .into_iter()
                .map(|r| (r.entry.location.file, r.entry.location.line))
                .collect();

            results.retain(|r| {
                locations.contains(&(r.entry.location.file.clone(), r.entry.location.line))
            });

            if results.is_empty() {
                break;
            }
        }

        results.truncate(options.max_results);
        results
    }

    /// Everything passing the filters, minus fuzzy matches of the excluded
    /// term by `(file, line, term)` key. Because exclusion is fuzzy, `!test`
    /// also drops `testUser`.
    fn eval_not(
        &self,
        index: &SemanticIndex,
        term: &str,
        options: &SearchOptions,
    ) -> Vec<SearchResult> {
        let unbounded = unbounded(options);

        let excluded: HashSet<(PathBuf, usize, String)> = index
            .search(term, &unbounded)
            .into_iter()
            .map(|r| {
                (
                    r.entry.location.file,
                    r.entry.location.line,
                    r.entry.term,
                )
            })
            .collect();

        let mut results = index.search("", &unbounded);
        results.retain(|r| {
            !excluded.contains(&(
                r.entry.location.file.clone(),
                r.entry.location.line,
                r.entry.term.clone(),
            ))
        });

        results.truncate(options.max_results);
        results
    }

    fn eval_regex(
        &self,
        index: &SemanticIndex,
        pattern: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SearchResult>, QueryError> {
        let re = Regex::new(pattern).map_err(|e| QueryError::InvalidRegex {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;

        let mut results = index.search("", &unbounded(options));
        results.retain(|r| re.is_match(&r.entry.term));
        results.truncate(options.max_results);
        Ok(results)
    }
}

/// Intermediate evaluation steps must not truncate, or intersection and
/// exclusion would drop valid hits; the final result set is truncated.
fn unbounded(options: &SearchOptions) -> SearchOptions {
    SearchOptions {
        max_results: usize::MAX,
        ..options.clone()
    }
}

fn is_regex_form(raw: &str) -> bool {
    raw.len() > 2 && raw.starts_with('/') && raw.ends_with('/')
}

fn split_terms(raw: &str, separator: char) -> Vec<String> {
    raw.split(separator)
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}
