//! C3 — Variable Resolver (§4.3).
//!
//! Finds every reference to an input column inside a masked clause body and
//! resolves it to a zero-based column index, in one of four syntaxes the
//! original engine supports side by side: positional (`a1`, `b2`),
//! bracketed positional (`a[1]`), bracketed by name (`a["some column"]`,
//! resolved against a header) and dotted attribute (`a.some_column`).
//! Grounded on `parse_basic_variables` / `parse_array_variables` /
//! `parse_dictionary_variables` / `parse_attribute_variables` /
//! `resolve_join_variables` / `ensure_no_ambiguous_variables`.

use crate::error::Error;
use crate::record::Header;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

/// One resolved reference to an input column: the exact text it was spelled
/// as in the query (so C4 can substitute it), which table it names (`a` for
/// the main/left input, `b` for the join input) and the zero-based column
/// index it resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableInfo {
    pub source_text: String,
    pub prefix: char,
    pub index: usize,
}

fn basic_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b([ab])([0-9]+)\b").expect("static basic var regex"))
}

fn array_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b([ab])\[([0-9]+)\]").expect("static array var regex"))
}

fn attribute_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b([ab])\.([A-Za-z_][A-Za-z0-9_]*)\b").expect("static attribute var regex")
    })
}

fn dict_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\b([ab])\[___RBQL_STRING_LITERAL([0-9]+)___\]"#)
            .expect("static dict var regex")
    })
}

fn column_index(header: Option<&Header>, name: &str, prefix: char) -> Result<usize, Error> {
    let header = header.ok_or_else(|| {
        Error::parsing(format!(
            "column name '{name}' used for table '{prefix}' but it has no header"
        ))
    })?;
    header
        .iter()
        .position(|h| h == name)
        .ok_or_else(|| Error::bad_key(name.to_string()))
}

/// Strips a literal's surrounding quotes, matching how the original engine
/// reads a dictionary-style column reference.
fn unquote(literal: &str) -> &str {
    let literal = literal.trim();
    for q in ["\"\"\"", "'''", "\"", "'"] {
        if literal.len() >= 2 * q.len() && literal.starts_with(q) && literal.ends_with(q) {
            return &literal[q.len()..literal.len() - q.len()];
        }
    }
    literal
}

/// Scans `text` (a masked clause body) for every column reference in any of
/// the four syntaxes, resolving bracketed-by-name references against
/// `header`/`join_header` (`a`/`b` respectively) and `literals` (the
/// extraction C1 produced). Positional references never need a header.
pub fn resolve_variables(
    text: &str,
    literals: &[String],
    header: Option<&Header>,
    join_header: Option<&Header>,
) -> Result<Vec<VariableInfo>, Error> {
    let mut found = Vec::new();

    for caps in basic_re().captures_iter(text) {
        let prefix = caps[1].chars().next().unwrap();
        let one_based: usize = caps[2].parse().expect("digits matched by regex");
        if one_based == 0 {
            return Err(Error::syntax(format!(
                "column reference '{}' is not valid: columns are 1-based",
                &caps[0]
            )));
        }
        found.push(VariableInfo {
            source_text: caps[0].to_string(),
            prefix,
            index: one_based - 1,
        });
    }

    for caps in array_re().captures_iter(text) {
        let prefix = caps[1].chars().next().unwrap();
        let zero_based: usize = caps[2].parse().expect("digits matched by regex");
        found.push(VariableInfo {
            source_text: caps[0].to_string(),
            prefix,
            index: zero_based,
        });
    }

    for caps in dict_re().captures_iter(text) {
        let prefix = caps[1].chars().next().unwrap();
        let literal_idx: usize = caps[2].parse().expect("digits matched by regex");
        let literal = literals
            .get(literal_idx)
            .ok_or_else(|| Error::parsing("dangling string literal placeholder"))?;
        let name = unquote(literal);
        let h = if prefix == 'a' { header } else { join_header };
        found.push(VariableInfo {
            source_text: caps[0].to_string(),
            prefix,
            index: column_index(h, name, prefix)?,
        });
    }

    for caps in attribute_re().captures_iter(text) {
        let prefix = caps[1].chars().next().unwrap();
        let name = &caps[2];
        let h = if prefix == 'a' { header } else { join_header };
        found.push(VariableInfo {
            source_text: caps[0].to_string(),
            prefix,
            index: column_index(h, name, prefix)?,
        });
    }

    Ok(found)
}

/// `b`-prefixed variables are only meaningful once a join clause is present;
/// using one in a query with no join is a parsing error (`resolve_join_variables`).
pub fn ensure_join_variables_allowed(vars: &[VariableInfo], join_present: bool) -> Result<(), Error> {
    if join_present {
        return Ok(());
    }
    if vars.iter().any(|v| v.prefix == 'b') {
        return Err(Error::syntax(
            "variables prefixed with 'b' can only be used after a JOIN clause",
        ));
    }
    Ok(())
}

/// A header column whose name collides with a positional variable's own
/// spelling (e.g. a column literally named `a1`) makes `a1` ambiguous
/// between "first column" and "the column named a1"; the original engine
/// refuses to guess and raises a parsing error (`ensure_no_ambiguous_variables`).
pub fn ensure_no_ambiguous_variables(header: &Header, prefix: char) -> Result<(), Error> {
    let mut seen: HashMap<&str, ()> = HashMap::new();
    for name in header {
        if seen.insert(name.as_str(), ()).is_some() {
            return Err(Error::parsing(format!("duplicate column name '{name}'")));
        }
        if basic_re().is_match(name) && basic_re().find(name).map(|m| m.as_str()) == Some(name.as_str())
        {
            return Err(Error::parsing(format!(
                "column name '{name}' is ambiguous with positional variable '{prefix}N' syntax"
            )));
        }
    }
    Ok(())
}

/// §4.3: "a variable name present in both input and join maps raises a
/// parsing error if it occurs in the query text." The original engine
/// binds `a.name`/`b.name` references to identically-named local
/// variables in its generated source, so a column name shared by both
/// headers can't be told apart once the `a`/`b` prefix is dropped from the
/// generated binding; this engine never drops the prefix, but keeps the
/// check so a query that names the ambiguous column (by either prefix)
/// fails the same way the original does, rather than silently resolving
/// to "whichever side happened first".
pub fn ensure_no_cross_table_ambiguity(
    text: &str,
    header: Option<&Header>,
    join_header: Option<&Header>,
) -> Result<(), Error> {
    let (Some(header), Some(join_header)) = (header, join_header) else {
        return Ok(());
    };
    let shared: HashMap<&str, ()> = header
        .iter()
        .filter(|name| join_header.contains(name))
        .map(|name| (name.as_str(), ()))
        .collect();
    if shared.is_empty() {
        return Ok(());
    }
    for name in shared.keys() {
        let used_as_attribute = Regex::new(&format!(r"\b[ab]\.{}\b", regex::escape(name)))
            .map(|re| re.is_match(text))
            .unwrap_or(false);
        if used_as_attribute {
            return Err(Error::parsing(format!(
                "column name '{name}' exists in both the main and join headers, \
                 so 'a.{name}' and 'b.{name}' can't be told apart"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_basic_positional_variables() {
        let vars = resolve_variables("a1 + a2 * b3", &[], None, None).unwrap();
        assert_eq!(vars.len(), 3);
        assert_eq!(vars[0], VariableInfo { source_text: "a1".into(), prefix: 'a', index: 0 });
        assert_eq!(vars[2], VariableInfo { source_text: "b3".into(), prefix: 'b', index: 2 });
    }

    #[test]
    fn resolves_array_style_variables() {
        let vars = resolve_variables("a[0] + b[2]", &[], None, None).unwrap();
        assert_eq!(vars[0].index, 0);
        assert_eq!(vars[1].index, 2);
    }

    #[test]
    fn resolves_dictionary_style_against_header() {
        let header = vec!["name".to_string(), "age".to_string()];
        let literals = vec!["\"age\"".to_string()];
        let vars = resolve_variables(
            "a[___RBQL_STRING_LITERAL0___]",
            &literals,
            Some(&header),
            None,
        )
        .unwrap();
        assert_eq!(vars[0].index, 1);
    }

    #[test]
    fn resolves_attribute_style_against_header() {
        let header = vec!["name".to_string(), "age".to_string()];
        let vars = resolve_variables("a.age > 10", &[], Some(&header), None).unwrap();
        assert_eq!(vars[0].index, 1);
    }

    #[test]
    fn rejects_join_variable_without_join() {
        let vars = resolve_variables("b1", &[], None, None).unwrap();
        assert!(ensure_join_variables_allowed(&vars, false).is_err());
        assert!(ensure_join_variables_allowed(&vars, true).is_ok());
    }

    #[test]
    fn rejects_ambiguous_header_column() {
        let header = vec!["a1".to_string()];
        assert!(ensure_no_ambiguous_variables(&header, 'a').is_err());
    }

    #[test]
    fn rejects_column_name_shared_by_both_headers() {
        let header = vec!["name".to_string(), "age".to_string()];
        let join_header = vec!["name".to_string()];
        assert!(ensure_no_cross_table_ambiguity("a.name > 1", Some(&header), Some(&join_header)).is_err());
        assert!(ensure_no_cross_table_ambiguity("a.age > 1", Some(&header), Some(&join_header)).is_ok());
    }
}
