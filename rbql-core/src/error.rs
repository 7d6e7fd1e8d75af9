//! Unified error/warning taxonomy (C10, §7).
//!
//! Modeled directly on `prqlc_parser::error::Error` (`kind`, `span`,
//! `reason`, `hints`, `code`): a small struct carrying a machine-matchable
//! `kind`, a human `Reason`, and a list of actionable hints, rather than a
//! tree of `thiserror` variants per failure site.

use std::fmt;

/// The five-way taxonomy from §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum ErrorKind {
    #[strum(serialize = "parsing error")]
    Parsing,
    #[strum(serialize = "IO handling error")]
    IoHandling,
    #[strum(serialize = "runtime error")]
    Runtime,
    #[strum(serialize = "syntax error")]
    Syntax,
    #[strum(serialize = "unexpected error")]
    Unexpected,
}

#[derive(Debug, Clone)]
pub enum Reason {
    Simple(String),
    /// §4.9: `No 'name' field at record N`.
    BadKey { name: String },
    /// §4.9: `No 'aI' field at record N`.
    BadField { prefix: char, index: usize },
    NotFound { name: String, namespace: String },
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::Simple(s) => f.write_str(s),
            Reason::BadKey { name } => write!(f, "No '{name}' field"),
            Reason::BadField { prefix, index } => write!(f, "No '{prefix}{}' field", index + 1),
            Reason::NotFound { name, namespace } => {
                write!(f, "{namespace} `{name}` not found")
            }
        }
    }
}

/// A single RBQL error: the kind (for programmatic dispatch), a reason (for
/// the message body) and a list of hints (§7: syntax errors get
/// `HAVING`/`LIKE`/`FROM` hints).
#[derive(Debug, Clone)]
pub struct Error {
    pub kind: ErrorKind,
    pub reason: Reason,
    pub hints: Vec<String>,
    /// Set when the error was raised while processing a specific input
    /// record (§4.9 error translation: `"At record N, Details: ..."`).
    pub record_number: Option<u64>,
}

impl Error {
    pub fn new(kind: ErrorKind, reason: Reason) -> Self {
        Error {
            kind,
            reason,
            hints: Vec::new(),
            record_number: None,
        }
    }

    pub fn parsing<S: Into<String>>(reason: S) -> Self {
        Error::new(ErrorKind::Parsing, Reason::Simple(reason.into()))
    }

    pub fn io_handling<S: Into<String>>(reason: S) -> Self {
        Error::new(ErrorKind::IoHandling, Reason::Simple(reason.into()))
    }

    pub fn runtime<S: Into<String>>(reason: S) -> Self {
        Error::new(ErrorKind::Runtime, Reason::Simple(reason.into()))
    }

    pub fn syntax<S: Into<String>>(reason: S) -> Self {
        Error::new(ErrorKind::Syntax, Reason::Simple(reason.into())).with_hint(
            "host expressions use ordinary comparisons and function calls; \
             SQL-only constructs like HAVING are not supported, LIKE is a \
             function call LIKE(value, pattern), and FROM only names a table",
        )
    }

    pub fn bad_key<S: Into<String>>(name: S) -> Self {
        Error::new(
            ErrorKind::Runtime,
            Reason::BadKey { name: name.into() },
        )
    }

    pub fn bad_field(prefix: char, index: usize) -> Self {
        Error::new(ErrorKind::Runtime, Reason::BadField { prefix, index })
    }

    pub fn with_hint<S: Into<String>>(mut self, hint: S) -> Self {
        self.hints.push(hint.into());
        self
    }

    pub fn with_record_number(mut self, nr: u64) -> Self {
        self.record_number = Some(nr);
        self
    }

    /// §4.9 error translation: wraps any error encountered mid-record with
    /// `"At record N, Details: ..."`, except parsing errors, which are
    /// re-raised as-is since they're static and not tied to a record.
    pub fn wrap_at_record(self, nr: u64) -> Self {
        if matches!(self.kind, ErrorKind::Parsing) {
            return self;
        }
        if self.record_number.is_some() {
            return self;
        }
        let reason = Reason::Simple(format!("At record {nr}, Details: {}", self.reason));
        Error {
            kind: self.kind,
            reason,
            hints: self.hints,
            record_number: Some(nr),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error [{}]: {}", self.kind, self.reason)?;
        for hint in &self.hints {
            write!(f, "\n  hint: {hint}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_at_record_skips_parsing_errors() {
        let e = Error::parsing("duplicate SELECT").wrap_at_record(3);
        assert!(matches!(e.reason, Reason::Simple(ref s) if s == "duplicate SELECT"));
    }

    #[test]
    fn wrap_at_record_wraps_runtime_errors() {
        let e = Error::runtime("bad key").wrap_at_record(7);
        let msg = e.to_string();
        assert!(msg.contains("At record 7"));
    }

    #[test]
    fn display_includes_kind_prefix() {
        let e = Error::bad_field('a', 2);
        assert_eq!(e.to_string(), "Error [runtime error]: No 'a3' field");
    }
}
