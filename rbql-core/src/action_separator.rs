//! C2 — Action Separator (§4.2).
//!
//! Splits a masked query (output of [`crate::lexer`]) into its top-level
//! clauses (`SELECT`/`UPDATE`, `WHERE`, `ORDER BY`, `EXCEPT`, `GROUP BY`,
//! `LIMIT`, the join clause) and strips clause-local modifiers (`TOP n`,
//! `DISTINCT`, `DISTINCT COUNT`, trailing `ASC`/`DESC`). Grounded on
//! `locate_statements` / `separate_actions` / `find_top` /
//! `translate_except_expression`'s modifier stripping in the original
//! engine, including its rule that `UPDATE` may only open a query (offset
//! 0) and can never coexist with `SELECT`.

use crate::error::Error;
use regex::Regex;
use std::sync::OnceLock;

/// The clause keywords recognized at the top level, in the order the
/// original engine scans for them. `UPDATE` and `SELECT` are mutually
/// exclusive query openers; the rest are optional trailing clauses.
const STATEMTENT_TOKENS: &[&str] = &[
    "STRICT LEFT JOIN",
    "LEFT OUTER JOIN",
    "LEFT JOIN",
    "INNER JOIN",
    "JOIN",
    "SELECT",
    "UPDATE",
    "WHERE",
    "ORDER BY",
    "EXCEPT",
    "GROUP BY",
    "LIMIT",
    "FROM",
    "WITH",
];

/// The join-variant keywords collapse to a single clause slot (§4.2): at
/// most one of them may appear in a query, same as any other clause.
const JOIN_KEYWORDS: &[&str] = &[
    "JOIN",
    "INNER JOIN",
    "LEFT JOIN",
    "LEFT OUTER JOIN",
    "STRICT LEFT JOIN",
];

fn statement_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let alts = STATEMTENT_TOKENS
            .iter()
            .map(|kw| kw.replace(' ', r"\s+"))
            .collect::<Vec<_>>()
            .join("|");
        Regex::new(&format!(r"(?i)(?:^|\s)({alts})(?:\s|$)")).expect("static statement regex")
    })
}

fn top_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^\s*TOP\s+([0-9]+)\s+").expect("static top regex"))
}

fn distinct_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^\s*DISTINCT(\s+COUNT)?\s+").expect("static distinct regex"))
}

fn order_direction_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\s+(ASC|DESC)\s*$").expect("static order direction regex"))
}

/// One located top-level clause: its keyword (normalized to uppercase) and
/// the raw text that follows it, up to the next clause or end of query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub keyword: String,
    pub body: String,
}

/// Scans `masked_query` left to right for clause keywords outside of string
/// literals (already masked out by [`crate::lexer`]), splitting the query
/// into an ordered list of `(keyword, body)` statements.
pub fn locate_statements(masked_query: &str) -> Vec<Statement> {
    let re = statement_re();
    let mut matches: Vec<(usize, usize, String)> = Vec::new();
    let mut search_from = 0;
    while let Some(m) = re.captures(&masked_query[search_from..]) {
        let kw = m.get(1).unwrap();
        let start = search_from + kw.start();
        let end = search_from + kw.end();
        matches.push((start, end, kw.as_str().to_uppercase()));
        search_from = end;
    }
    if matches.is_empty() {
        return Vec::new();
    }
    let mut statements = Vec::with_capacity(matches.len());
    for (i, (_, end, keyword)) in matches.iter().enumerate() {
        let body_end = matches.get(i + 1).map(|(s, _, _)| *s).unwrap_or(masked_query.len());
        let body = masked_query[*end..body_end].trim().to_string();
        statements.push(Statement {
            keyword: normalize_keyword(keyword),
            body,
        });
    }
    statements
}

fn normalize_keyword(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `TOP n` / `DISTINCT` / `DISTINCT COUNT` stripped from the front of a
/// `SELECT` body (§4.5's row-limiting and dedup writer decorators are
/// configured from this, not from parsing the expression list itself).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectModifiers {
    pub top: Option<usize>,
    pub distinct: bool,
    pub distinct_count: bool,
}

pub fn strip_select_modifiers(body: &str) -> (SelectModifiers, String) {
    let mut modifiers = SelectModifiers::default();
    let mut rest = body.to_string();
    if let Some(caps) = top_re().captures(&rest) {
        modifiers.top = caps[1].parse().ok();
        let end = caps.get(0).unwrap().end();
        rest = rest[end..].to_string();
    }
    if let Some(caps) = distinct_re().captures(&rest) {
        modifiers.distinct = true;
        modifiers.distinct_count = caps.get(1).is_some();
        let end = caps.get(0).unwrap().end();
        rest = rest[end..].to_string();
    }
    (modifiers, rest)
}

/// Trailing `ASC`/`DESC` stripped from an `ORDER BY` body; absence means
/// ascending (§4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

pub fn strip_order_direction(body: &str) -> (SortDirection, String) {
    match order_direction_re().captures(body) {
        Some(caps) => {
            let dir = if caps[1].eq_ignore_ascii_case("DESC") {
                SortDirection::Desc
            } else {
                SortDirection::Asc
            };
            let end = caps.get(0).unwrap().start();
            (dir, body[..end].trim().to_string())
        }
        None => (SortDirection::Asc, body.trim().to_string()),
    }
}

/// The two mutually-exclusive query openers. `UPDATE` must be the very
/// first clause (offset 0); a `SELECT` that doesn't open the query, or a
/// query that opens with neither, is a parsing error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryForm {
    Select,
    Update,
}

pub fn query_form(statements: &[Statement]) -> Result<QueryForm, Error> {
    match statements.first().map(|s| s.keyword.as_str()) {
        Some("SELECT") => Ok(QueryForm::Select),
        Some("UPDATE") => Ok(QueryForm::Update),
        _ => Err(Error::syntax(
            "query must start with SELECT or UPDATE",
        )),
    }
}

/// §4.2: "at most one clause keyword may match" per precedence group; the
/// five `JOIN` variants share a single slot. Called right after
/// [`locate_statements`], before anything downstream trusts there's only
/// one of each clause.
pub fn ensure_no_duplicate_clauses(statements: &[Statement]) -> Result<(), Error> {
    let mut join_seen = false;
    let mut others_seen: std::collections::HashSet<&str> = std::collections::HashSet::new();
    for stmt in statements {
        let keyword = stmt.keyword.as_str();
        if JOIN_KEYWORDS.contains(&keyword) {
            if join_seen {
                return Err(Error::parsing("query has more than one JOIN clause"));
            }
            join_seen = true;
            continue;
        }
        if !others_seen.insert(keyword) {
            return Err(Error::parsing(format!("query has more than one {keyword} clause")));
        }
    }
    Ok(())
}

/// The query-level names recognized inside `WITH (name)` (§4.2).
const RECOGNIZED_MODIFIERS: &[&str] = &["header", "headers", "noheader", "noheaders"];

/// Pulls the trailing `WITH (name)` modifier, if any, out of the statement
/// list, validating the name against [`RECOGNIZED_MODIFIERS`]. Duplicate
/// `WITH` clauses are already rejected by
/// [`ensure_no_duplicate_clauses`] before this ever sees more than one.
pub fn extract_query_modifier(statements: Vec<Statement>) -> Result<(Vec<Statement>, Option<String>), Error> {
    let mut modifier = None;
    let mut rest = Vec::with_capacity(statements.len());
    for stmt in statements {
        if stmt.keyword != "WITH" {
            rest.push(stmt);
            continue;
        }
        let body = stmt.body.trim();
        let name = body
            .strip_prefix('(')
            .and_then(|s| s.strip_suffix(')'))
            .map(str::trim)
            .ok_or_else(|| Error::syntax("WITH modifier must be written as WITH (name)"))?;
        if !RECOGNIZED_MODIFIERS.iter().any(|m| m.eq_ignore_ascii_case(name)) {
            return Err(Error::parsing(format!("unrecognized query modifier '{name}'")));
        }
        modifier = Some(name.to_lowercase());
    }
    Ok((rest, modifier))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_select_where_order_by() {
        let stmts = locate_statements("SELECT a1, a2 WHERE a1 > 10 ORDER BY a2 DESC");
        let keywords: Vec<_> = stmts.iter().map(|s| s.keyword.clone()).collect();
        assert_eq!(keywords, vec!["SELECT", "WHERE", "ORDER BY"]);
        assert_eq!(stmts[1].body, "a1 > 10");
        assert_eq!(stmts[2].body, "a2 DESC");
    }

    #[test]
    fn recognizes_join_variants_and_update() {
        let stmts = locate_statements("UPDATE SET a1 = a2 STRICT LEFT JOIN b.csv ON a1 == b1");
        let keywords: Vec<_> = stmts.iter().map(|s| s.keyword.clone()).collect();
        assert_eq!(keywords, vec!["UPDATE", "STRICT LEFT JOIN"]);
    }

    #[test]
    fn strips_top_and_distinct() {
        let (modifiers, rest) = strip_select_modifiers("TOP 10 DISTINCT a1, a2");
        assert_eq!(modifiers.top, Some(10));
        assert!(modifiers.distinct);
        assert!(!modifiers.distinct_count);
        assert_eq!(rest, "a1, a2");
    }

    #[test]
    fn strips_distinct_count() {
        let (modifiers, rest) = strip_select_modifiers("DISTINCT COUNT a1");
        assert!(modifiers.distinct_count);
        assert_eq!(rest, "a1");
    }

    #[test]
    fn strips_trailing_sort_direction() {
        let (dir, rest) = strip_order_direction("a2 DESC");
        assert_eq!(dir, SortDirection::Desc);
        assert_eq!(rest, "a2");

        let (dir, rest) = strip_order_direction("a2");
        assert_eq!(dir, SortDirection::Asc);
        assert_eq!(rest, "a2");
    }

    #[test]
    fn update_must_open_the_query() {
        let stmts = locate_statements("WHERE a1 > 1 UPDATE SET a1 = 2");
        assert!(query_form(&stmts).is_err());
    }

    #[test]
    fn select_must_open_the_query() {
        let stmts = locate_statements("SELECT a1");
        assert_eq!(query_form(&stmts).unwrap(), QueryForm::Select);
    }

    #[test]
    fn rejects_duplicate_select() {
        let stmts = locate_statements("SELECT a1 SELECT a2");
        assert!(ensure_no_duplicate_clauses(&stmts).is_err());
    }

    #[test]
    fn rejects_two_join_variants_as_one_duplicate_group() {
        let stmts = locate_statements("SELECT a1 JOIN t ON a1 == b1 LEFT JOIN u ON a1 == b1");
        assert!(ensure_no_duplicate_clauses(&stmts).is_err());
    }

    #[test]
    fn single_join_clause_is_fine() {
        let stmts = locate_statements("SELECT a1 LEFT JOIN u ON a1 == b1 WHERE a1 > 1");
        assert!(ensure_no_duplicate_clauses(&stmts).is_ok());
    }

    #[test]
    fn extracts_recognized_with_modifier() {
        let stmts = locate_statements("SELECT a1 WITH (noheader)");
        let (rest, modifier) = extract_query_modifier(stmts).unwrap();
        assert_eq!(modifier.as_deref(), Some("noheader"));
        assert!(rest.iter().all(|s| s.keyword != "WITH"));
    }

    #[test]
    fn rejects_unrecognized_with_modifier() {
        let stmts = locate_statements("SELECT a1 WITH (banana)");
        assert!(extract_query_modifier(stmts).is_err());
    }

    #[test]
    fn recognizes_left_outer_join_as_left_join_variant() {
        let stmts = locate_statements("SELECT a1 LEFT OUTER JOIN t ON a1 == b1");
        let keywords: Vec<_> = stmts.iter().map(|s| s.keyword.clone()).collect();
        assert_eq!(keywords, vec!["SELECT", "LEFT OUTER JOIN"]);
    }
}
