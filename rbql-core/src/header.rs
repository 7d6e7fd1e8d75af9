//! C5 — Header Inference (§4.5).
//!
//! A `SELECT` that names a column verbatim (`a.name`, `a["name"]`) should
//! produce an output header with that same name, not a generic `col1`; an
//! explicit `AS alias` (stripped from the executable form by
//! [`crate::translate::strip_as_alias`] but retained here) wins over both;
//! any other expression (an arithmetic expression, a function call) falls
//! back to a synthetic `colN` named after its 1-based output position
//! (§4.5 rules 3-6). Grounded on `select_output_header` / `QueryColumnInfo`,
//! simplified from the original's full AST walk since this engine works
//! over the same finitely-shaped select-item strings [`crate::translate`]
//! already split out, rather than a general Python `ast` tree.

use crate::record::Header;
use crate::variables::resolve_variables;

/// Infers one output column name per `SELECT` item. `items[i]` is matched
/// whole against the variable syntaxes C3 understands; `aliases[i]`, if
/// present, takes priority over everything else (rule 4). A bare `a.name`
/// or `a["name"]` item takes that column's own name (when a header is
/// known, rule 3), a bare positional item (`a1`) takes the header's name at
/// that index or a default `aI` name (rule 5), and anything else gets a
/// synthetic `colN` (rule 6).
pub fn infer_select_header(
    items: &[String],
    aliases: &[Option<String>],
    input_header: Option<&Header>,
    join_header: Option<&Header>,
) -> Header {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            if let Some(Some(alias)) = aliases.get(i) {
                return alias.clone();
            }
            infer_one(item, i, input_header, join_header)
        })
        .collect()
}

fn infer_one(item: &str, position: usize, input_header: Option<&Header>, join_header: Option<&Header>) -> String {
    if let Ok(vars) = resolve_variables(item, &[], input_header, join_header) {
        if vars.len() == 1 && vars[0].source_text == item.trim() {
            let v = &vars[0];
            let header = if v.prefix == 'a' { input_header } else { join_header };
            if let Some(name) = header.and_then(|h| h.get(v.index)) {
                return name.clone();
            }
            return format!("{}{}", v.prefix, v.index + 1);
        }
    }
    format!("col{}", position + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_aliases(n: usize) -> Vec<Option<String>> {
        vec![None; n]
    }

    #[test]
    fn bare_column_reference_takes_header_name() {
        let header = vec!["name".to_string(), "age".to_string()];
        let items = ["a1".to_string(), "a.age".to_string()];
        let out = infer_select_header(&items, &no_aliases(2), Some(&header), None);
        assert_eq!(out, vec!["name", "age"]);
    }

    #[test]
    fn positional_reference_without_header_gets_default_name() {
        let items = ["a1".to_string(), "a2".to_string()];
        let out = infer_select_header(&items, &no_aliases(2), None, None);
        assert_eq!(out, vec!["a1", "a2"]);
    }

    #[test]
    fn computed_expression_falls_back_to_synthetic_coln() {
        let items = ["a1 + a2".to_string()];
        let out = infer_select_header(&items, &no_aliases(1), None, None);
        assert_eq!(out, vec!["col1"]);
    }

    #[test]
    fn explicit_alias_wins_over_everything_else() {
        let header = vec!["name".to_string()];
        let items = ["a1".to_string(), "a1 + 1".to_string()];
        let aliases = vec![Some("renamed".to_string()), Some("total".to_string())];
        let out = infer_select_header(&items, &aliases, Some(&header), None);
        assert_eq!(out, vec!["renamed", "total"]);
    }
}
