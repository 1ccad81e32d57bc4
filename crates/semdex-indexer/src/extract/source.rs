//! Built-in tree-sitter extractor.
//!
//! Walks the syntax tree of a source file and emits definitions
//! (functions, classes, variables, constants, strings, comments, imports)
//! plus references (calls, imports, instantiations, inheritance).

use super::language::{detect_language, Language};
use super::{Extraction, Extractor};
use once_cell::sync::Lazy;
use regex::Regex;
use semdex_search::{CrossReference, EntryType, Location, ReferenceKind, SemanticEntry};
use std::path::Path;
use tracing::warn;

/// Identifiers worth reporting as related terms.
static IDENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]{2,}").expect("identifier pattern is valid"));

/// Maximum number of related terms attached to an entry.
const MAX_RELATED_TERMS: usize = 8;

/// Minimum length for indexed comment/string text.
const MIN_TEXT_LEN: usize = 4;

/// Tree-sitter based extractor for the supported languages.
pub struct SourceExtractor;

impl SourceExtractor {
    /// Create a new extractor.
    pub fn new() -> Self {
        Self
    }
}

impl Default for SourceExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor for SourceExtractor {
    fn can_handle(&self, path: &Path) -> bool {
        detect_language(path).is_some()
    }

    fn extract(&self, content: &str, path: &Path) -> Extraction {
        let Some(language) = detect_language(path) else {
            return Extraction::default();
        };

        let Some(tree) = parse(content, language) else {
            warn!(path = ?path, "Failed to parse content");
            return Extraction::default();
        };

        let mut ctx = Ctx {
            path,
            language,
            content,
            lines: content.lines().collect(),
            out: Extraction::default(),
        };

        // One file entry per extracted file, so files are findable by name.
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            let entry = ctx.make_entry(stem.to_string(), EntryType::File, 0, 0);
            ctx.out.definitions.push(entry);
        }

        visit(tree.root_node(), &mut ctx);

        ctx.out
    }
}

struct Ctx<'a> {
    path: &'a Path,
    language: Language,
    content: &'a str,
    lines: Vec<&'a str>,
    out: Extraction,
}

impl Ctx<'_> {
    fn make_entry(
        &self,
        term: String,
        entry_type: EntryType,
        line0: usize,
        column: usize,
    ) -> SemanticEntry {
        let context = self
            .lines
            .get(line0)
            .map(|l| l.trim_end().to_string())
            .unwrap_or_default();

        let surrounding_lines = if self.lines.is_empty() {
            Vec::new()
        } else {
            let start = line0.saturating_sub(2);
            let end = (line0 + 2).min(self.lines.len() - 1);
            self.lines[start..=end]
                .iter()
                .map(|l| l.trim_end().to_string())
                .collect()
        };

        let related_terms = related_terms(&context, &term);

        SemanticEntry {
            term,
            entry_type,
            location: Location::new(self.path, line0 + 1, column),
            context,
            surrounding_lines,
            related_terms,
            language: self.language.name().to_string(),
            metadata: None,
        }
    }

    fn make_reference(
        &self,
        target_term: String,
        kind: ReferenceKind,
        line0: usize,
        column: usize,
    ) -> CrossReference {
        let context = self
            .lines
            .get(line0)
            .map(|l| l.trim_end().to_string())
            .unwrap_or_default();

        CrossReference {
            target_term,
            kind,
            from: Location::new(self.path, line0 + 1, column),
            context,
        }
    }
}

fn visit(node: tree_sitter::Node, ctx: &mut Ctx) {
    let kind = node.kind();
    let row = node.start_position().row;
    let column = node.start_position().column;

    if is_comment(kind) {
        if let Some(text) = node_text(node, ctx.content) {
            let cleaned = clean_comment(text);
            if cleaned.len() >= MIN_TEXT_LEN {
                let entry = ctx.make_entry(cleaned, EntryType::Comment, row, column);
                ctx.out.definitions.push(entry);
            }
        }
        return;
    }

    if is_string(ctx.language, kind) {
        if let Some(text) = node_text(node, ctx.content) {
            let cleaned = clean_string(text);
            if cleaned.len() >= MIN_TEXT_LEN && !cleaned.contains('\n') {
                let entry = ctx.make_entry(cleaned, EntryType::String, row, column);
                ctx.out.definitions.push(entry);
            }
        }
        return;
    }

    if is_import(ctx.language, kind) {
        if let Some(name) = import_name(node, ctx.language, ctx.content) {
            let entry = ctx.make_entry(name.clone(), EntryType::Import, row, column);
            ctx.out.definitions.push(entry);
            let reference = ctx.make_reference(name, ReferenceKind::Import, row, column);
            ctx.out.references.push(reference);
        }
        return;
    }

    if let Some(entry_type) = definition_kind(ctx.language, kind) {
        if let Some(name) = node_name(node, ctx.content) {
            let entry = ctx.make_entry(name, entry_type, row, column);
            ctx.out.definitions.push(entry);
        }
    } else if is_call(ctx.language, kind) {
        if let Some(name) = callee_name(node, ctx.content) {
            let reference = ctx.make_reference(name, ReferenceKind::Call, row, column);
            ctx.out.references.push(reference);
        }
    } else if kind == "new_expression" {
        if let Some(name) = field_name_text(node, "constructor", ctx.content) {
            let reference =
                ctx.make_reference(name, ReferenceKind::Instantiation, row, column);
            ctx.out.references.push(reference);
        }
    } else if kind == "extends_clause" || kind == "implements_clause" {
        let ref_kind = if kind == "extends_clause" {
            ReferenceKind::Extends
        } else {
            ReferenceKind::Implements
        };
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if matches!(child.kind(), "identifier" | "type_identifier") {
                if let Some(name) = node_text(child, ctx.content) {
                    let reference =
                        ctx.make_reference(name.to_string(), ref_kind, row, column);
                    ctx.out.references.push(reference);
                }
            }
        }
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        visit(child, ctx);
    }
}

/// Map tree-sitter node kinds to entry types, per language.
fn definition_kind(language: Language, kind: &str) -> Option<EntryType> {
    match (language, kind) {
        // Rust
        (Language::Rust, "function_item") => Some(EntryType::Function),
        (Language::Rust, "struct_item") => Some(EntryType::Class),
        (Language::Rust, "enum_item") => Some(EntryType::Class),
        (Language::Rust, "trait_item") => Some(EntryType::Class),
        (Language::Rust, "const_item") => Some(EntryType::Constant),
        (Language::Rust, "static_item") => Some(EntryType::Constant),
        (Language::Rust, "let_declaration") => Some(EntryType::Variable),

        // TypeScript/JavaScript
        (Language::TypeScript | Language::JavaScript, "function_declaration") => {
            Some(EntryType::Function)
        }
        (Language::TypeScript | Language::JavaScript, "method_definition") => {
            Some(EntryType::Function)
        }
        (Language::TypeScript | Language::JavaScript, "class_declaration") => {
            Some(EntryType::Class)
        }
        (Language::TypeScript | Language::JavaScript, "interface_declaration") => {
            Some(EntryType::Class)
        }
        (Language::TypeScript | Language::JavaScript, "type_alias_declaration") => {
            Some(EntryType::Class)
        }
        (Language::TypeScript | Language::JavaScript, "enum_declaration") => {
            Some(EntryType::Class)
        }
        (Language::TypeScript | Language::JavaScript, "variable_declarator") => {
            Some(EntryType::Variable)
        }

        // Python
        (Language::Python, "function_definition") => Some(EntryType::Function),
        (Language::Python, "class_definition") => Some(EntryType::Class),

        // Go
        (Language::Go, "function_declaration") => Some(EntryType::Function),
        (Language::Go, "method_declaration") => Some(EntryType::Function),
        (Language::Go, "type_spec") => Some(EntryType::Class),
        (Language::Go, "const_spec") => Some(EntryType::Constant),
        (Language::Go, "var_spec") => Some(EntryType::Variable),

        _ => None,
    }
}

fn is_comment(kind: &str) -> bool {
    matches!(kind, "comment" | "line_comment" | "block_comment")
}

fn is_string(language: Language, kind: &str) -> bool {
    match language {
        Language::Rust => matches!(kind, "string_literal" | "raw_string_literal"),
        Language::TypeScript | Language::JavaScript => {
            matches!(kind, "string" | "template_string")
        }
        Language::Python => kind == "string",
        Language::Go => matches!(kind, "interpreted_string_literal" | "raw_string_literal"),
    }
}

fn is_import(language: Language, kind: &str) -> bool {
    match language {
        Language::Rust => kind == "use_declaration",
        Language::TypeScript | Language::JavaScript => kind == "import_statement",
        Language::Python => matches!(kind, "import_statement" | "import_from_statement"),
        Language::Go => kind == "import_spec",
    }
}

fn is_call(language: Language, kind: &str) -> bool {
    match language {
        Language::Python => kind == "call",
        _ => kind == "call_expression",
    }
}

/// Extract the name of a definition node.
fn node_name(node: tree_sitter::Node, content: &str) -> Option<String> {
    if let Some(name) = node.child_by_field_name("name") {
        return node_text(name, content).map(|s| s.to_string());
    }

    // Rust let bindings name via a pattern field.
    if let Some(pattern) = node.child_by_field_name("pattern") {
        if pattern.kind() == "identifier" {
            return node_text(pattern, content).map(|s| s.to_string());
        }
        return None;
    }

    // Fallback: first identifier-like child.
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if matches!(
            child.kind(),
            "identifier" | "type_identifier" | "property_identifier" | "field_identifier"
        ) {
            return node_text(child, content).map(|s| s.to_string());
        }
    }
    None
}

/// Resolve the called name of a call node, taking the rightmost segment of
/// a method or path expression.
fn callee_name(node: tree_sitter::Node, content: &str) -> Option<String> {
    let function = node.child_by_field_name("function")?;
    let text = node_text(function, content)?;
    let name = text
        .rsplit(|c| c == '.' || c == ':')
        .next()?
        .trim()
        .trim_end_matches(['!', '?']);

    if is_identifier(name) {
        Some(name.to_string())
    } else {
        None
    }
}

/// Resolve the imported name of an import node.
fn import_name(node: tree_sitter::Node, language: Language, content: &str) -> Option<String> {
    let raw = match language {
        Language::Rust => field_name_text(node, "argument", content)?,
        Language::TypeScript | Language::JavaScript => {
            clean_string(&field_name_text(node, "source", content)?)
        }
        Language::Python => field_name_text(node, "module_name", content)
            .or_else(|| field_name_text(node, "name", content))?,
        Language::Go => clean_string(&field_name_text(node, "path", content)?),
    };

    // Last path segment, dropping any brace group or alias.
    let raw = raw.trim_end_matches(';').trim();
    let raw = raw.split('{').next()?.trim().trim_end_matches("::");
    let segment = raw
        .rsplit(|c: char| c == ':' || c == '/' || c == '.')
        .next()?
        .trim();

    if segment.is_empty() {
        None
    } else {
        Some(segment.to_string())
    }
}

fn field_name_text(node: tree_sitter::Node, field: &str, content: &str) -> Option<String> {
    node.child_by_field_name(field)
        .and_then(|n| node_text(n, content))
        .map(|s| s.to_string())
}

fn node_text<'a>(node: tree_sitter::Node, content: &'a str) -> Option<&'a str> {
    content.get(node.start_byte()..node.end_byte())
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// Identifiers on the context line, excluding the entry's own term.
fn related_terms(context: &str, term: &str) -> Vec<String> {
    let mut terms = Vec::new();
    for m in IDENT.find_iter(context) {
        let ident = m.as_str();
        if ident != term && !terms.iter().any(|t| t == ident) {
            terms.push(ident.to_string());
        }
        if terms.len() >= MAX_RELATED_TERMS {
            break;
        }
    }
    terms
}

/// Strip comment markers and collapse to one line.
fn clean_comment(text: &str) -> String {
    text.lines()
        .map(|l| {
            l.trim()
                .trim_start_matches("///")
                .trim_start_matches("//!")
                .trim_start_matches("//")
                .trim_start_matches("/*")
                .trim_end_matches("*/")
                .trim_start_matches('*')
                .trim_start_matches('#')
                .trim()
        })
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Strip surrounding quotes from a string literal.
fn clean_string(text: &str) -> String {
    text.trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .to_string()
}

fn parse(content: &str, language: Language) -> Option<tree_sitter::Tree> {
    let mut parser = tree_sitter::Parser::new();

    let ts_language = match language {
        Language::Rust => tree_sitter_rust::LANGUAGE,
        Language::TypeScript | Language::JavaScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT,
        Language::Python => tree_sitter_python::LANGUAGE,
        Language::Go => tree_sitter_go::LANGUAGE,
    };

    parser.set_language(&ts_language.into()).ok()?;
    parser.parse(content, None)
}
