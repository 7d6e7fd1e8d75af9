//! C6.1 — I/O collaborator contracts (§6).
//!
//! RBQL itself never reads or writes bytes: it's handed an already-decoded
//! stream of records and a sink to push results into. `rbql-cli`'s CSV
//! reader/writer (and any embedder's own format) only need to implement
//! these two small traits, matching the original engine's
//! `RBQLInputIterator`/`RBQLOutputWriter` interface classes.

use crate::error::Error;
use crate::record::{Header, Record};

/// Supplies records to the execution driver (§4.9), one at a time.
pub trait InputIterator {
    /// The header row, if the input has one. Called once, before the first
    /// `next_record`.
    fn header(&mut self) -> Result<Option<Header>, Error>;

    /// The next record, or `None` at end of input.
    fn next_record(&mut self) -> Result<Option<Record>, Error>;

    /// Number of fields the *first* record had, used to detect and warn
    /// about a ragged input (§7's inconsistent-field-count warning).
    fn num_fields_in_first_record(&self) -> Option<usize> {
        None
    }

    /// A query-level modifier recognized in a trailing `WITH (name)`
    /// clause (§4.2): `header`/`headers` and `noheader`/`noheaders` are
    /// the names the original engine recognizes. The default no-op accepts
    /// any name the driver forwards; a real CSV iterator overrides this to
    /// toggle whether it already consumed a header line.
    fn handle_query_modifier(&mut self, _name: &str) -> Result<(), Error> {
        Ok(())
    }

    /// Non-fatal observations accumulated while reading (§7): ragged
    /// records, a stripped UTF-8 BOM, defective quote escaping. Read once
    /// after the last `next_record` call.
    fn warnings(&self) -> Vec<String> {
        Vec::new()
    }

    /// Released by the caller once the query is done with this input, not
    /// by the driver itself (§3 Lifecycles: "opened by caller, closed by
    /// caller").
    fn finish(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

/// Receives records from the execution driver, in final output order.
pub trait OutputWriter {
    /// Called at most once, before any `write_record`, when the query
    /// produces (or forwards) a header.
    fn write_header(&mut self, header: &Header) -> Result<(), Error>;

    /// Returns `true` if the driver should keep pulling records, `false`
    /// if this stage of the pipeline (or something downstream of it) has
    /// already seen everything it needs (§4.8: `TopWriter` after its limit
    /// is reached). A `false` is not an error; the driver stops its loop
    /// and still calls [`OutputWriter::finish`].
    fn write_record(&mut self, record: &Record) -> Result<bool, Error>;

    /// Called once after the last record, for writers that buffer (e.g. a
    /// `SortedWriter`) or need to flush.
    fn finish(&mut self) -> Result<(), Error> {
        Ok(())
    }

    /// Non-fatal observations accumulated while writing (§7): null values
    /// replaced by empty string, separator characters inside simple-policy
    /// output, a forced fallback from monocolumn to CSV.
    fn warnings(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Resolves the table named in a `JOIN b.csv ON ...` clause to an input
/// iterator, so the execution driver never has to know how a named table
/// maps to a file, URL or in-memory fixture.
pub trait TableRegistry<I: InputIterator> {
    fn resolve(&self, table_name: &str) -> Result<I, Error>;
}

// Lets the execution driver build a chain of writer decorators (§4.8)
// behind a single trait object, wrapping each other without needing a
// distinct generic type per combination of TOP/DISTINCT/ORDER BY.
impl<W: OutputWriter + ?Sized> OutputWriter for &mut W {
    fn write_header(&mut self, header: &Header) -> Result<(), Error> {
        (**self).write_header(header)
    }
    fn write_record(&mut self, record: &Record) -> Result<bool, Error> {
        (**self).write_record(record)
    }
    fn finish(&mut self) -> Result<(), Error> {
        (**self).finish()
    }
    fn warnings(&self) -> Vec<String> {
        (**self).warnings()
    }
}

impl<'a> OutputWriter for Box<dyn OutputWriter + 'a> {
    fn write_header(&mut self, header: &Header) -> Result<(), Error> {
        (**self).write_header(header)
    }
    fn write_record(&mut self, record: &Record) -> Result<bool, Error> {
        (**self).write_record(record)
    }
    fn finish(&mut self) -> Result<(), Error> {
        (**self).finish()
    }
    fn warnings(&self) -> Vec<String> {
        (**self).warnings()
    }
}
