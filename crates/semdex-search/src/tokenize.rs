//! Sub-token decomposition of identifiers.
//!
//! Splitting on camelCase boundaries, underscores and hyphens is what makes
//! `getUserName` discoverable via "user" or "name".

/// Sub-tokens at or below this length are not indexed.
pub const MIN_TOKEN_LEN: usize = 3;

/// Split a term into lowercased sub-tokens.
///
/// Boundaries are underscores, hyphens, and camelCase transitions
/// (including acronym runs: `HTTPServer` splits into `http` + `server`).
/// Tokens of length `MIN_TOKEN_LEN` or shorter are dropped.
pub fn sub_tokens(term: &str) -> Vec<String> {
    let chars: Vec<char> = term.chars().collect();
    let mut tokens = Vec::new();
    let mut current = String::new();

    for i in 0..chars.len() {
        let c = chars[i];

        if c == '_' || c == '-' {
            flush(&mut current, &mut tokens);
            continue;
        }

        if c.is_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            // Boundary: aB, 1B, or the last capital of an acronym run (ABc)
            if prev.is_lowercase() || prev.is_numeric() || (prev.is_uppercase() && next_is_lower) {
                flush(&mut current, &mut tokens);
            }
        }

        current.extend(c.to_lowercase());
    }
    flush(&mut current, &mut tokens);

    tokens.retain(|t| t.chars().count() > MIN_TOKEN_LEN);
    tokens.dedup();
    tokens
}

fn flush(current: &mut String, tokens: &mut Vec<String>) {
    if !current.is_empty() {
        tokens.push(std::mem::take(current));
    }
}
