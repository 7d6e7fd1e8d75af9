//! C1 — Lexer / Literal Extractor (§4.1).
//!
//! Masks out every string literal in a raw query string so the downstream
//! regex-based clause scanners (§4.2-§4.4) never have to worry about
//! delimiter characters or keywords hiding inside a quoted string. Grounded
//! on `separate_string_literals` / `combine_string_literals` in the original
//! engine: a single regex finds `'...'` and `"..."` runs (with `\`-escaped
//! quotes honored), replaces each with an ordered placeholder, and a
//! symmetric `restore` undoes it before a masked fragment is handed to the
//! host expression compiler.

use regex::Regex;
use std::sync::OnceLock;

const PLACEHOLDER_PREFIX: &str = "___RBQL_STRING_LITERAL";

fn literal_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)("""|'''|"|')((?:\\.|(?!\1).)*)\1"#).expect("static literal regex")
    })
}

fn placeholder(index: usize) -> String {
    format!("{PLACEHOLDER_PREFIX}{index}___")
}

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"{PLACEHOLDER_PREFIX}([0-9]+)___")).expect("static placeholder regex")
    })
}

/// The result of masking a raw query: the text with every string literal
/// replaced by a numbered placeholder, and the literals themselves (each
/// including its original quote characters) in the order they occurred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskedQuery {
    pub text: String,
    pub literals: Vec<String>,
}

/// Replaces every string literal in `query` (tabs are also normalized to a
/// single space, matching the original engine's handling of pasted
/// spreadsheet queries) with `___RBQL_STRING_LITERAL{n}___`, returning the
/// masked text alongside the extracted literals in order.
pub fn mask_string_literals(query: &str) -> MaskedQuery {
    let query = query.replace('\t', " ");
    let mut literals = Vec::new();
    let text = literal_re()
        .replace_all(&query, |caps: &regex::Captures| {
            let idx = literals.len();
            literals.push(caps[0].to_string());
            placeholder(idx)
        })
        .into_owned();
    MaskedQuery { text, literals }
}

/// Puts literals back into a fragment of previously-masked text, for the
/// pieces (host expressions) that must be handed to the expression compiler
/// verbatim. Fragments with no placeholders are returned unchanged.
pub fn restore_string_literals(fragment: &str, literals: &[String]) -> String {
    placeholder_re()
        .replace_all(fragment, |caps: &regex::Captures| {
            let idx: usize = caps[1].parse().expect("placeholder index is always numeric");
            literals
                .get(idx)
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}
