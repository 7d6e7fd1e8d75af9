//! SQL `LIKE` pattern translation (§4.10's `LIKE(value, pattern)` host
//! function), grounded on `like_to_regex`: `%` becomes `.*`, `_` becomes
//! `.`, every other regex metacharacter is escaped, and the whole pattern
//! is anchored, then cached so a pattern used across every row of a query
//! is compiled once.

use regex::Regex;
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

fn cache() -> &'static Mutex<HashMap<String, Regex>> {
    static CACHE: OnceLock<Mutex<HashMap<String, Regex>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Translates a SQL `LIKE` pattern into an anchored regex string.
pub fn like_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 2);
    out.push('^');
    for c in pattern.chars() {
        match c {
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            c => out.push_str(&regex::escape(&c.to_string())),
        }
    }
    out.push('$');
    out
}

/// Evaluates `value LIKE pattern`, compiling (and caching) the pattern's
/// regex on first use.
pub fn like_match(value: &str, pattern: &str) -> bool {
    let mut guard = cache().lock().expect("like cache lock");
    let regex = guard.entry(pattern.to_string()).or_insert_with(|| {
        Regex::new(&like_to_regex(pattern)).expect("like_to_regex always produces valid regex")
    });
    regex.is_match(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_matches_any_run() {
        assert!(like_match("hello world", "hello%"));
        assert!(!like_match("goodbye", "hello%"));
    }

    #[test]
    fn underscore_matches_single_char() {
        assert!(like_match("cat", "c_t"));
        assert!(!like_match("ct", "c_t"));
    }

    #[test]
    fn literal_regex_metacharacters_are_escaped() {
        assert!(like_match("3.14", "3.14"));
        assert!(!like_match("3x14", "3.14"));
    }
}
