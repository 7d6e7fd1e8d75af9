//! Debug view of a parsed query (§4.2), serializable for `rbql-cli`'s
//! `--parse-only` / `rbql parse` subcommand. Mirrors prqlc's `Debug`
//! subcommands (`ExpandPL`/`Ast`), which serialize an intermediate
//! representation to JSON/YAML for inspection instead of running it: this
//! runs the query only through C1/C2 (masking and clause separation), never
//! resolving variables or compiling host expressions, so a query can be
//! explained even if its expressions wouldn't compile against any
//! particular engine.

use crate::action_separator::{
    ensure_no_duplicate_clauses, extract_query_modifier, locate_statements, query_form,
    strip_order_direction, strip_select_modifiers, QueryForm, SortDirection,
};
use crate::error::Error;
use crate::lexer::{mask_string_literals, restore_string_literals};
use serde::Serialize;

/// One top-level clause, with its modifiers already stripped off into
/// [`ParsedQuery`]'s own fields rather than left in `body`.
#[derive(Debug, Clone, Serialize)]
pub struct ParsedClause {
    pub keyword: String,
    pub body: String,
}

/// A snapshot of a query's shape, without resolving variables or compiling
/// any host expression.
#[derive(Debug, Clone, Serialize)]
pub struct ParsedQuery {
    pub form: String,
    pub clauses: Vec<ParsedClause>,
    pub modifier: Option<String>,
    pub top: Option<usize>,
    pub distinct: bool,
    pub distinct_count: bool,
    /// `Some(true)` for `ORDER BY ... DESC`, `Some(false)` for ascending
    /// (explicit or default), `None` when there's no `ORDER BY` clause.
    pub order_desc: Option<bool>,
}

/// Runs `query_text` through C1 (masking) and C2 (clause separation) and
/// returns a serializable snapshot of what was found.
pub fn explain(query_text: &str) -> Result<ParsedQuery, Error> {
    let masked = mask_string_literals(query_text);
    let statements = locate_statements(&masked.text);
    if statements.is_empty() {
        return Err(Error::syntax("empty query"));
    }
    ensure_no_duplicate_clauses(&statements)?;
    let (statements, modifier) = extract_query_modifier(statements)?;
    let form = query_form(&statements)?;

    let mut top = None;
    let mut distinct = false;
    let mut distinct_count = false;
    let mut order_desc = None;
    let mut clauses = Vec::with_capacity(statements.len());
    for stmt in &statements {
        let body = restore_string_literals(&stmt.body, &masked.literals);
        let body = match stmt.keyword.as_str() {
            "SELECT" => {
                let (modifiers, rest) = strip_select_modifiers(&body);
                top = modifiers.top;
                distinct = modifiers.distinct;
                distinct_count = modifiers.distinct_count;
                rest
            }
            "ORDER BY" => {
                let (dir, rest) = strip_order_direction(&body);
                order_desc = Some(matches!(dir, SortDirection::Desc));
                rest
            }
            _ => body,
        };
        clauses.push(ParsedClause { keyword: stmt.keyword.clone(), body });
    }

    Ok(ParsedQuery {
        form: match form {
            QueryForm::Select => "SELECT".to_string(),
            QueryForm::Update => "UPDATE".to_string(),
        },
        clauses,
        modifier,
        top,
        distinct,
        distinct_count,
        order_desc,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explains_select_with_modifiers_and_order_by() {
        let parsed = explain("SELECT TOP 2 DISTINCT a1 WHERE a1 > 1 ORDER BY a1 DESC").unwrap();
        assert_eq!(parsed.form, "SELECT");
        assert_eq!(parsed.top, Some(2));
        assert!(parsed.distinct);
        assert!(!parsed.distinct_count);
        assert_eq!(parsed.order_desc, Some(true));
        let keywords: Vec<_> = parsed.clauses.iter().map(|c| c.keyword.clone()).collect();
        assert_eq!(keywords, vec!["SELECT", "WHERE", "ORDER BY"]);
        assert_eq!(parsed.clauses[0].body, "a1");
    }

    #[test]
    fn explains_update_with_with_modifier() {
        let parsed = explain("UPDATE SET a1 = 1 WITH (noheader)").unwrap();
        assert_eq!(parsed.form, "UPDATE");
        assert_eq!(parsed.modifier.as_deref(), Some("noheader"));
    }

    #[test]
    fn rejects_empty_query() {
        assert!(explain("   ").is_err());
    }

    #[test]
    fn preserves_string_literals_in_clause_bodies() {
        let parsed = explain(r#"SELECT a1 WHERE a2 == "needle""#).unwrap();
        assert_eq!(parsed.clauses[1].body, r#"a2 == "needle""#);
    }
}
