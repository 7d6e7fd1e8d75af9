//! C4 — Clause Translators (§4.4).
//!
//! The original engine's `translate_select_expression` /
//! `translate_update_expression` / `translate_except_expression` /
//! `replace_star_vars` each stitch a Python source-code string together.
//! Since this engine precompiles a plan of closures instead of generating
//! source text (see design notes), translation here means something
//! narrower: splitting a clause body into its independent top-level
//! expressions (respecting nested brackets, so a function call's own
//! commas aren't mistaken for separators), and expanding `*` / `a.*` stars
//! into the explicit column list they stand for once the column count is
//! known.

use crate::error::Error;
use regex::Regex;
use std::sync::OnceLock;

fn count_star_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)COUNT\(\*\)").expect("static count-star regex"))
}

/// Splits `text` on commas that are not nested inside `()`, `[]` or `{}`,
/// trimming whitespace from each piece. Used for `SELECT` expression lists,
/// `EXCEPT` column lists and `UPDATE SET` assignment lists alike.
pub fn split_top_level_commas(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth: i32 = 0;
    let mut start = 0;
    let chars: Vec<char> = text.chars().collect();
    for (i, &c) in chars.iter().enumerate() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            ',' if depth == 0 => {
                let piece: String = chars[start..i].iter().collect();
                parts.push(piece.trim().to_string());
                start = i + 1;
            }
            _ => {}
        }
    }
    let tail: String = chars[start..].iter().collect();
    let tail = tail.trim();
    if !tail.is_empty() || !parts.is_empty() {
        parts.push(tail.to_string());
    }
    parts
}

/// `COUNT(*)` is a SQL-ism for "count every row regardless of nulls"; since
/// RBQL's `COUNT` aggregator only ever counts invocations, `*` and a
/// constant are equivalent and the original engine normalizes the former
/// to the latter before parsing (`replace_star_count`, §4.7).
pub fn normalize_count_star(expr: &str) -> String {
    count_star_re().replace_all(expr, "COUNT(1)").into_owned()
}

/// One `UPDATE ... SET` assignment: the raw target variable text (e.g.
/// `a1`, `a.age`) and the raw expression text to assign it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub target: String,
    pub expr: String,
}

/// Splits an `UPDATE ... SET x = e1, y = e2` body (with the leading `SET`
/// keyword already stripped) into its assignments. Each piece must contain
/// exactly one top-level `=` that is not part of `==`, `!=`, `<=` or `>=`
/// (`translate_update_expression`).
pub fn parse_update_assignments(set_body: &str) -> Result<Vec<Assignment>, Error> {
    split_top_level_commas(set_body)
        .into_iter()
        .map(|piece| split_assignment(&piece))
        .collect()
}

fn split_assignment(piece: &str) -> Result<Assignment, Error> {
    let bytes: Vec<char> = piece.chars().collect();
    for i in 0..bytes.len() {
        if bytes[i] != '=' {
            continue;
        }
        let prev = i.checked_sub(1).map(|j| bytes[j]);
        let next = bytes.get(i + 1).copied();
        if matches!(prev, Some('=') | Some('!') | Some('<') | Some('>')) || next == Some('=') {
            continue;
        }
        let target: String = bytes[..i].iter().collect();
        let expr: String = bytes[i + 1..].iter().collect();
        return Ok(Assignment {
            target: target.trim().to_string(),
            expr: expr.trim().to_string(),
        });
    }
    Err(Error::syntax(format!(
        "UPDATE assignment '{piece}' is missing a top-level '='"
    )))
}

/// Splits a single `SELECT` item into its expression text and an optional
/// trailing ` AS alias` (§4.4: "`AS name` aliases are stripped from the
/// executable form; a parallel AST-style parse retains them for header
/// inference"). Only a top-level `AS` (outside any bracket nesting) counts,
/// and the rightmost one wins, since an alias can only ever trail the whole
/// expression.
pub fn strip_as_alias(item: &str) -> (String, Option<String>) {
    let chars: Vec<char> = item.chars().collect();
    let mut depth: i32 = 0;
    let mut as_at: Option<usize> = None;
    for (i, &c) in chars.iter().enumerate() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            _ => {}
        }
        if depth == 0 && is_as_keyword_at(&chars, i) {
            as_at = Some(i);
        }
    }
    match as_at {
        Some(pos) => {
            let expr: String = chars[..pos].iter().collect();
            let alias: String = chars[pos + 2..].iter().collect();
            (expr.trim().to_string(), Some(alias.trim().to_string()))
        }
        None => (item.trim().to_string(), None),
    }
}

fn is_as_keyword_at(chars: &[char], i: usize) -> bool {
    if i + 1 >= chars.len() || !chars[i].eq_ignore_ascii_case(&'a') || !chars[i + 1].eq_ignore_ascii_case(&'s') {
        return false;
    }
    let before_ok = i == 0 || !(chars[i - 1].is_alphanumeric() || chars[i - 1] == '_');
    let after_ok = i + 2 >= chars.len() || !(chars[i + 2].is_alphanumeric() || chars[i + 2] == '_');
    before_ok && after_ok
}

/// Expands a single `*` expression item into `a1, a2, ..., aN`
/// (`replace_star_vars`), and `a.*`/`b.*` into the same but scoped to that
/// table's own column count. Any item other than a bare star passes
/// through unchanged.
pub fn expand_star(item: &str, num_a_columns: usize, num_b_columns: Option<usize>) -> Vec<String> {
    let trimmed = item.trim();
    match trimmed {
        "*" => {
            let mut out: Vec<String> = (1..=num_a_columns).map(|i| format!("a{i}")).collect();
            if let Some(n) = num_b_columns {
                out.extend((1..=n).map(|i| format!("b{i}")));
            }
            out
        }
        "a.*" => (1..=num_a_columns).map(|i| format!("a{i}")).collect(),
        "b.*" => (1..=num_b_columns.unwrap_or(0)).map(|i| format!("b{i}")).collect(),
        other => vec![other.to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_commas_outside_brackets() {
        let parts = split_top_level_commas("a1, foo(a2, a3), [a4, a5]");
        assert_eq!(parts, vec!["a1", "foo(a2, a3)", "[a4, a5]"]);
    }

    #[test]
    fn normalizes_count_star() {
        assert_eq!(normalize_count_star("COUNT(*)"), "COUNT(1)");
        assert_eq!(normalize_count_star("count(*) + 1"), "COUNT(1) + 1");
    }

    #[test]
    fn parses_update_assignments_ignoring_comparison_operators() {
        let assignments = parse_update_assignments("a1 = a2 + 1, a3 = a1 if a2 == 3 else a3").unwrap();
        assert_eq!(assignments.len(), 2);
        assert_eq!(assignments[0].target, "a1");
        assert_eq!(assignments[0].expr, "a2 + 1");
        assert_eq!(assignments[1].expr, "a1 if a2 == 3 else a3");
    }

    #[test]
    fn rejects_assignment_missing_equals() {
        assert!(parse_update_assignments("a1 + 1").is_err());
    }

    #[test]
    fn expands_bare_star() {
        assert_eq!(expand_star("*", 2, Some(1)), vec!["a1", "a2", "b1"]);
        assert_eq!(expand_star("a.*", 3, None), vec!["a1", "a2", "a3"]);
        assert_eq!(expand_star("a1", 3, None), vec!["a1"]);
    }

    #[test]
    fn strips_trailing_alias() {
        assert_eq!(
            strip_as_alias("a1 AS name"),
            ("a1".to_string(), Some("name".to_string()))
        );
        assert_eq!(
            strip_as_alias("a1 + a2 as total"),
            ("a1 + a2".to_string(), Some("total".to_string()))
        );
    }

    #[test]
    fn leaves_item_without_alias_unchanged() {
        assert_eq!(strip_as_alias("a1 + a2"), ("a1 + a2".to_string(), None));
    }

    #[test]
    fn does_not_split_on_as_inside_nested_call() {
        assert_eq!(
            strip_as_alias("CAST(a1 AS foo)"),
            ("CAST(a1 AS foo)".to_string(), None)
        );
    }

    #[test]
    fn does_not_split_on_as_substring_inside_identifier() {
        assert_eq!(strip_as_alias("CASE"), ("CASE".to_string(), None));
    }
}
