//! CSV-backed [`InputIterator`]/[`OutputWriter`] (§6.1, §6.3).
//!
//! `rbql-core` never reads or writes bytes itself (`collaborators.rs`); this
//! module is the collaborator the spec describes as "explicitly out of
//! scope" for the core engine. The whole input is decoded up front (§6.3's
//! `--encoding`) into one `String`, then split into records according to
//! `--policy`: four of the five policies (`simple`/`quoted`/`whitespace`/
//! `monocolumn`) are line-oriented and handled by hand, while `quoted_rfc`
//! — the only policy whose fields may contain an embedded newline — is
//! delegated to the `csv` crate, the same crate the original test harness
//! uses for CSV fixtures (`dbs/runner.rs`).

use crate::policy::{Encoding, Policy};
use itertools::Itertools;
use rbql_core::{Error, Header, InputIterator, OutputWriter, Record, Value};
use std::io::Cursor;

/// Splits one line into fields under a line-oriented policy. Not used for
/// [`Policy::QuotedRfc`], which never sees individual lines.
fn split_line(line: &str, delim: char, policy: Policy) -> (Vec<String>, bool) {
    match policy {
        Policy::Simple => (line.split(delim).map(str::to_string).collect(), false),
        Policy::Quoted => split_quoted(line, delim),
        Policy::Whitespace => (line.split_whitespace().map(str::to_string).collect(), false),
        Policy::Monocolumn => (vec![line.to_string()], false),
        Policy::QuotedRfc => unreachable!("quoted_rfc is handled by the csv crate"),
    }
}

/// The original engine's "quoted" policy: more forgiving than RFC 4180 — a
/// field opening with `"` runs until its closing `"` (a doubled `""` inside
/// is a literal quote), absorbing any delimiter in between; everything
/// after the closing quote up to the next delimiter is discarded, which is
/// the "defective double-quote escaping" the second return value flags
/// (§7's warning, deduplicated by the caller to the first offending line).
fn split_quoted(line: &str, delim: char) -> (Vec<String>, bool) {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut was_quoted = false;
    let mut defective = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    field.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(c);
            }
        } else if c == '"' && field.is_empty() && !was_quoted {
            in_quotes = true;
            was_quoted = true;
        } else if c == delim {
            fields.push(std::mem::take(&mut field));
            was_quoted = false;
        } else {
            if was_quoted {
                defective = true;
            }
            field.push(c);
        }
    }
    fields.push(field);
    (fields, defective)
}

fn quote_if_needed(text: &str, delim: char) -> String {
    if text.contains(delim) || text.contains('"') || text.contains('\n') {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text.to_string()
    }
}

/// Renders one record as a proper RFC 4180 line via the `csv` crate's own
/// writer, so a field with an embedded newline round-trips the way
/// `Policy::QuotedRfc` reads it back (unlike [`quote_if_needed`]'s
/// line-oriented quoting, which only ever produces a single physical line).
fn quoted_rfc_line(fields: &[String], delim: char) -> Result<String, Error> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delim as u8)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer
        .write_record(fields)
        .map_err(|e| Error::io_handling(format!("failed encoding CSV record: {e}")))?;
    let bytes = writer
        .into_inner()
        .map_err(|e| Error::io_handling(format!("failed flushing CSV encoder: {e}")))?;
    let mut line = String::from_utf8(bytes)
        .map_err(|e| Error::io_handling(format!("CSV encoder produced invalid UTF-8: {e}")))?;
    if line.ends_with('\n') {
        line.pop();
    }
    Ok(line)
}

enum InputBackend {
    Lines { lines: Vec<String>, next: usize },
    Rfc(csv::Reader<Cursor<Vec<u8>>>),
}

/// Reads CSV-ish records from an already-decoded in-memory buffer. Built
/// once per query invocation; the whole file is read and decoded up front
/// (`--encoding`) rather than streamed, trading memory for a front end
/// simple enough to share between the main input and `JOIN` tables alike.
pub struct CsvInput {
    policy: Policy,
    delim: char,
    with_headers: bool,
    comment_prefix: Option<String>,
    backend: InputBackend,
    header: Option<Header>,
    header_consumed: bool,
    first_record_len: Option<usize>,
    line_number: u64,
    ragged_warned: bool,
    defective_quote_warned: bool,
    warnings: Vec<String>,
}

impl CsvInput {
    pub fn new(
        bytes: &[u8],
        encoding: Encoding,
        policy: Policy,
        delim: char,
        with_headers: bool,
        comment_prefix: Option<String>,
    ) -> Result<Self, Error> {
        let text = encoding.decode(bytes);
        let mut warnings = Vec::new();
        if text.starts_with('\u{feff}') {
            warnings.push("UTF-8 BOM detected and stripped".to_string());
        }
        let text = text.strip_prefix('\u{feff}').unwrap_or(&text).to_string();

        let backend = if policy == Policy::QuotedRfc {
            let mut builder = csv::ReaderBuilder::new();
            builder.has_headers(false).delimiter(delim as u8).flexible(true);
            if let Some(prefix) = &comment_prefix {
                if let Some(&byte) = prefix.as_bytes().first() {
                    builder.comment(Some(byte));
                }
            }
            InputBackend::Rfc(builder.from_reader(Cursor::new(text.into_bytes())))
        } else {
            let lines: Vec<String> = text
                .lines()
                .filter(|line| match &comment_prefix {
                    Some(prefix) => !line.starts_with(prefix.as_str()),
                    None => true,
                })
                .map(str::to_string)
                .collect();
            InputBackend::Lines { lines, next: 0 }
        };

        Ok(CsvInput {
            policy,
            delim,
            with_headers,
            comment_prefix,
            backend,
            header: None,
            header_consumed: false,
            first_record_len: None,
            line_number: 0,
            ragged_warned: false,
            defective_quote_warned: false,
            warnings,
        })
    }

    fn pull_raw(&mut self) -> Result<Option<Vec<String>>, Error> {
        match &mut self.backend {
            InputBackend::Lines { lines, next } => {
                if *next >= lines.len() {
                    return Ok(None);
                }
                let (fields, defective) = split_line(&lines[*next], self.delim, self.policy);
                self.line_number += 1;
                *next += 1;
                if defective && !self.defective_quote_warned {
                    self.defective_quote_warned = true;
                    self.warnings.push(format!(
                        "defective double-quote escaping at line {}",
                        self.line_number
                    ));
                }
                Ok(Some(fields))
            }
            InputBackend::Rfc(reader) => match reader.records().next() {
                Some(Ok(record)) => {
                    self.line_number += 1;
                    Ok(Some(record.iter().map(str::to_string).collect()))
                }
                Some(Err(e)) => Err(Error::io_handling(format!("malformed CSV record: {e}"))),
                None => Ok(None),
            },
        }
    }

    fn ensure_header_consumed(&mut self) -> Result<(), Error> {
        if self.header_consumed {
            return Ok(());
        }
        self.header_consumed = true;
        if self.with_headers {
            self.header = self.pull_raw()?.map(|fields| fields);
        }
        Ok(())
    }
}

impl InputIterator for CsvInput {
    fn header(&mut self) -> Result<Option<Header>, Error> {
        self.ensure_header_consumed()?;
        Ok(self.header.clone())
    }

    fn next_record(&mut self) -> Result<Option<Record>, Error> {
        self.ensure_header_consumed()?;
        let Some(fields) = self.pull_raw()? else {
            return Ok(None);
        };
        let len = fields.len();
        match self.first_record_len {
            None => self.first_record_len = Some(len),
            Some(expected) if expected != len && !self.ragged_warned => {
                self.ragged_warned = true;
                self.warnings.push(format!(
                    "inconsistent number of fields at line {}: expected {expected}, found {len}",
                    self.line_number
                ));
            }
            _ => {}
        }
        Ok(Some(fields.into_iter().map(Value::Str).collect()))
    }

    fn num_fields_in_first_record(&self) -> Option<usize> {
        self.first_record_len
    }

    fn handle_query_modifier(&mut self, name: &str) -> Result<(), Error> {
        match name {
            "header" | "headers" => self.with_headers = true,
            "noheader" | "noheaders" => self.with_headers = false,
            _ => {}
        }
        Ok(())
    }

    fn warnings(&self) -> Vec<String> {
        self.warnings.clone()
    }
}

/// Writes records back out under `--policy`/`--delim`/`--encoding`, mirroring
/// [`CsvInput`]'s read side.
pub struct CsvOutput<W: std::io::Write> {
    writer: W,
    policy: Policy,
    delim: char,
    encoding: Encoding,
    with_headers: bool,
    warnings: Vec<String>,
    warned_null: bool,
}

impl<W: std::io::Write> CsvOutput<W> {
    pub fn new(writer: W, policy: Policy, delim: char, encoding: Encoding, with_headers: bool) -> Self {
        CsvOutput {
            writer,
            policy,
            delim,
            encoding,
            with_headers,
            warnings: Vec::new(),
            warned_null: false,
        }
    }

    fn row_text(&mut self, fields: &[String]) -> Result<String, Error> {
        match self.policy {
            Policy::Simple => {
                for field in fields {
                    if field.contains(self.delim) {
                        self.warnings.push(format!(
                            "simple policy output field contains the delimiter '{}'",
                            self.delim
                        ));
                        break;
                    }
                }
                Ok(fields.join(&self.delim.to_string()))
            }
            Policy::Quoted => Ok(fields
                .iter()
                .map(|f| quote_if_needed(f, self.delim))
                .join(&self.delim.to_string())),
            Policy::QuotedRfc => quoted_rfc_line(fields, self.delim),
            Policy::Whitespace => Ok(fields.join(" ")),
            Policy::Monocolumn => {
                if fields.len() > 1 {
                    self.warnings.push(
                        "output switched to CSV because monocolumn couldn't represent a multi-column row"
                            .to_string(),
                    );
                    Ok(fields.iter().map(|f| quote_if_needed(f, ',')).join(","))
                } else {
                    Ok(fields.first().cloned().unwrap_or_default())
                }
            }
        }
    }

    fn write_line(&mut self, fields: &[String]) -> Result<(), Error> {
        let line = self.row_text(fields)?;
        let mut bytes = self.encoding.encode(&line);
        bytes.push(b'\n');
        self.writer
            .write_all(&bytes)
            .map_err(|e| Error::io_handling(format!("failed writing output: {e}")))
    }
}

impl<W: std::io::Write> OutputWriter for CsvOutput<W> {
    fn write_header(&mut self, header: &Header) -> Result<(), Error> {
        if !self.with_headers {
            return Ok(());
        }
        self.write_line(header)
    }

    fn write_record(&mut self, record: &Record) -> Result<bool, Error> {
        if !self.warned_null && record.iter().any(|v| matches!(v, Value::Null)) {
            self.warned_null = true;
            self.warnings.push("null values in output replaced by empty string".to_string());
        }
        let fields: Vec<String> = record.iter().map(Value::to_string).collect();
        self.write_line(&fields)?;
        Ok(true)
    }

    fn finish(&mut self) -> Result<(), Error> {
        self.writer
            .flush()
            .map_err(|e| Error::io_handling(format!("failed flushing output: {e}")))
    }

    fn warnings(&self) -> Vec<String> {
        self.warnings.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_policy_splits_on_delimiter() {
        let mut input = CsvInput::new(b"a,b,c\n1,2,3\n", Encoding::Utf8, Policy::Simple, ',', false, None).unwrap();
        assert_eq!(input.header().unwrap(), None);
        let rec = input.next_record().unwrap().unwrap();
        assert_eq!(rec, vec![Value::Str("a".into()), Value::Str("b".into()), Value::Str("c".into())]);
    }

    #[test]
    fn with_headers_consumes_first_line_as_header() {
        let mut input =
            CsvInput::new(b"name,age\nbob,9\n", Encoding::Utf8, Policy::Simple, ',', true, None).unwrap();
        assert_eq!(input.header().unwrap(), Some(vec!["name".to_string(), "age".to_string()]));
        let rec = input.next_record().unwrap().unwrap();
        assert_eq!(rec, vec![Value::Str("bob".into()), Value::Str("9".into())]);
        assert!(input.next_record().unwrap().is_none());
    }

    #[test]
    fn quoted_policy_keeps_delimiter_inside_quotes() {
        let fields = split_quoted(r#""a,b",c"#, ',');
        assert_eq!(fields, vec!["a,b".to_string(), "c".to_string()]);
    }

    #[test]
    fn quoted_policy_unescapes_doubled_quotes() {
        let fields = split_quoted(r#""he said ""hi""",ok"#, ',');
        assert_eq!(fields, vec![r#"he said "hi""#.to_string(), "ok".to_string()]);
    }

    #[test]
    fn comment_lines_are_skipped() {
        let mut input = CsvInput::new(
            b"# a comment\n1,2\n",
            Encoding::Utf8,
            Policy::Simple,
            ',',
            false,
            Some("#".to_string()),
        )
        .unwrap();
        let rec = input.next_record().unwrap().unwrap();
        assert_eq!(rec, vec![Value::Str("1".into()), Value::Str("2".into())]);
    }

    #[test]
    fn ragged_rows_produce_a_warning() {
        let mut input =
            CsvInput::new(b"1,2,3\n1,2\n", Encoding::Utf8, Policy::Simple, ',', false, None).unwrap();
        input.next_record().unwrap();
        input.next_record().unwrap();
        assert!(input.warnings().iter().any(|w| w.contains("inconsistent number of fields")));
    }

    #[test]
    fn monocolumn_writer_falls_back_to_csv_on_multi_field_row() {
        let mut out = CsvOutput::new(Vec::new(), Policy::Monocolumn, ',', Encoding::Utf8, false);
        out.write_record(&vec![Value::Str("a".into()), Value::Str("b,c".into())]).unwrap();
        assert!(out.warnings().iter().any(|w| w.contains("switched to CSV")));
    }

    #[test]
    fn quoted_rfc_reads_embedded_newline() {
        let mut input = CsvInput::new(
            b"\"multi\nline\",b\n",
            Encoding::Utf8,
            Policy::QuotedRfc,
            ',',
            false,
            None,
        )
        .unwrap();
        let rec = input.next_record().unwrap().unwrap();
        assert_eq!(rec, vec![Value::Str("multi\nline".into()), Value::Str("b".into())]);
    }
}
