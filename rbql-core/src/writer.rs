//! C8 — Writer Pipeline (§4.8).
//!
//! `SELECT`'s row-shaping clauses (`TOP`, `DISTINCT`, `DISTINCT COUNT`,
//! `ORDER BY`, `GROUP BY`) are implemented as decorators around a terminal
//! [`crate::collaborators::OutputWriter`], each one composing
//! `TopWriter(UniqWriter(SortedWriter(terminal)))`-style, mirroring the
//! original engine's `TopWriter`/`UniqWriter`/`UniqCountWriter`/
//! `SortedWriter`/`AggregateWriter` chain. Every decorator buffers only as
//! much as its own semantics require; only `SortedWriter` and
//! `AggregateWriter` need to see the whole result set before emitting
//! anything. `write_record` returns `false` once a decorator (or anything
//! downstream of it) has seen everything it needs, letting the execution
//! driver stop pulling records early (§5).

use crate::action_separator::SortDirection;
use crate::collaborators::OutputWriter;
use crate::error::Error;
use crate::record::{Header, Record};
use crate::value::Value;
use std::collections::HashMap;

/// Stops forwarding records once `limit` have been written (`TOP n`); does
/// not need to buffer anything.
pub struct TopWriter<W> {
    inner: W,
    limit: usize,
    written: usize,
}

impl<W: OutputWriter> TopWriter<W> {
    pub fn new(inner: W, limit: usize) -> Self {
        TopWriter { inner, limit, written: 0 }
    }
}

impl<W: OutputWriter> OutputWriter for TopWriter<W> {
    fn write_header(&mut self, header: &Header) -> Result<(), Error> {
        self.inner.write_header(header)
    }

    fn write_record(&mut self, record: &Record) -> Result<bool, Error> {
        if self.written >= self.limit {
            return Ok(false);
        }
        self.written += 1;
        self.inner.write_record(record)?;
        Ok(self.written < self.limit)
    }

    fn finish(&mut self) -> Result<(), Error> {
        self.inner.finish()
    }

    fn warnings(&self) -> Vec<String> {
        self.inner.warnings()
    }
}

fn record_repr(record: &Record) -> String {
    record
        .iter()
        .map(|v| format!("{}:{v}", v.type_name()))
        .collect::<Vec<_>>()
        .join("\u{1}")
}

/// Drops records whose full row has already been written (`DISTINCT`).
pub struct UniqWriter<W> {
    inner: W,
    seen: std::collections::HashSet<String>,
}

impl<W: OutputWriter> UniqWriter<W> {
    pub fn new(inner: W) -> Self {
        UniqWriter { inner, seen: Default::default() }
    }
}

impl<W: OutputWriter> OutputWriter for UniqWriter<W> {
    fn write_header(&mut self, header: &Header) -> Result<(), Error> {
        self.inner.write_header(header)
    }

    fn write_record(&mut self, record: &Record) -> Result<bool, Error> {
        if self.seen.insert(record_repr(record)) {
            return self.inner.write_record(record);
        }
        Ok(true)
    }

    fn finish(&mut self) -> Result<(), Error> {
        self.inner.finish()
    }

    fn warnings(&self) -> Vec<String> {
        self.inner.warnings()
    }
}

/// Collapses duplicate rows into one, with the count prepended as the
/// first column (`DISTINCT COUNT`); has to buffer the whole result set
/// since a row's final count isn't known until input is exhausted, and the
/// original engine emits counts in first-seen order, not sorted order (§3
/// invariant 8).
pub struct UniqCountWriter<W> {
    inner: W,
    counts: HashMap<String, u64>,
    order: Vec<Record>,
}

impl<W: OutputWriter> UniqCountWriter<W> {
    pub fn new(inner: W) -> Self {
        UniqCountWriter { inner, counts: HashMap::new(), order: Vec::new() }
    }
}

impl<W: OutputWriter> OutputWriter for UniqCountWriter<W> {
    fn write_header(&mut self, header: &Header) -> Result<(), Error> {
        self.inner.write_header(header)
    }

    fn write_record(&mut self, record: &Record) -> Result<bool, Error> {
        let key = record_repr(record);
        if let Some(count) = self.counts.get_mut(&key) {
            *count += 1;
        } else {
            self.counts.insert(key, 1);
            self.order.push(record.clone());
        }
        Ok(true)
    }

    fn finish(&mut self) -> Result<(), Error> {
        for record in &self.order {
            let count = self.counts[&record_repr(record)];
            let mut out = Vec::with_capacity(record.len() + 1);
            out.push(Value::Int(count as i64));
            out.extend(record.iter().cloned());
            if !self.inner.write_record(&out)? {
                break;
            }
        }
        self.inner.finish()
    }

    fn warnings(&self) -> Vec<String> {
        self.inner.warnings()
    }
}

/// Buffers every record and emits them sorted by `key_of` (`ORDER BY`).
/// The original engine's sort is stable so ties preserve input order,
/// which `Vec::sort_by` already guarantees.
pub struct SortedWriter<W, F> {
    inner: W,
    key_of: F,
    direction: SortDirection,
    buffer: Vec<Record>,
}

impl<W: OutputWriter, F: Fn(&Record) -> Value> SortedWriter<W, F> {
    pub fn new(inner: W, direction: SortDirection, key_of: F) -> Self {
        SortedWriter { inner, key_of, direction, buffer: Vec::new() }
    }
}

impl<W: OutputWriter, F: Fn(&Record) -> Value> OutputWriter for SortedWriter<W, F> {
    fn write_header(&mut self, header: &Header) -> Result<(), Error> {
        self.inner.write_header(header)
    }

    fn write_record(&mut self, record: &Record) -> Result<bool, Error> {
        self.buffer.push(record.clone());
        Ok(true)
    }

    fn finish(&mut self) -> Result<(), Error> {
        self.buffer.sort_by(|a, b| {
            let cmp = (self.key_of)(a)
                .partial_cmp(&(self.key_of)(b))
                .unwrap_or(std::cmp::Ordering::Equal);
            match self.direction {
                SortDirection::Asc => cmp,
                SortDirection::Desc => cmp.reverse(),
            }
        });
        for record in std::mem::take(&mut self.buffer) {
            if !self.inner.write_record(&record)? {
                break;
            }
        }
        self.inner.finish()
    }

    fn warnings(&self) -> Vec<String> {
        self.inner.warnings()
    }
}

/// Emits the finalized rows of a [`crate::aggregate::GroupTable`]
/// (`GROUP BY`), sorted by group key (§4.7, §5: "output rows emitted in
/// ascending order of the compiled aggregation-key tuple"); the group
/// table itself is filled by the execution driver as records stream
/// through, so this writer's only job is to hold the already-aggregated,
/// already-sorted rows until `finish`.
pub struct AggregateWriter<W> {
    inner: W,
    rows: Vec<Record>,
}

impl<W: OutputWriter> AggregateWriter<W> {
    /// `rows` must already be in ascending group-key order; see
    /// [`crate::aggregate::GroupTable::finalize_sorted`].
    pub fn new(inner: W, rows: Vec<Record>) -> Self {
        AggregateWriter { inner, rows }
    }
}

impl<W: OutputWriter> OutputWriter for AggregateWriter<W> {
    fn write_header(&mut self, header: &Header) -> Result<(), Error> {
        self.inner.write_header(header)
    }

    /// `GROUP BY` discards the row-by-row stream; aggregated rows are
    /// supplied up front via `new` and flushed on `finish`.
    fn write_record(&mut self, _record: &Record) -> Result<bool, Error> {
        Ok(true)
    }

    fn finish(&mut self) -> Result<(), Error> {
        for record in std::mem::take(&mut self.rows) {
            if !self.inner.write_record(&record)? {
                break;
            }
        }
        self.inner.finish()
    }

    fn warnings(&self) -> Vec<String> {
        self.inner.warnings()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct VecSink {
        header: Option<Header>,
        rows: Vec<Record>,
    }

    impl OutputWriter for VecSink {
        fn write_header(&mut self, header: &Header) -> Result<(), Error> {
            self.header = Some(header.clone());
            Ok(())
        }
        fn write_record(&mut self, record: &Record) -> Result<bool, Error> {
            self.rows.push(record.clone());
            Ok(true)
        }
    }

    #[test]
    fn top_writer_stops_after_limit() {
        let mut w = TopWriter::new(VecSink::default(), 2);
        let mut keep_going = true;
        for i in 0..5 {
            keep_going = w.write_record(&vec![Value::Int(i)]).unwrap();
        }
        assert_eq!(w.inner.rows.len(), 2);
        assert!(!keep_going);
    }

    #[test]
    fn top_writer_signals_stop_on_the_limiting_record() {
        let mut w = TopWriter::new(VecSink::default(), 2);
        assert!(w.write_record(&vec![Value::Int(1)]).unwrap());
        assert!(!w.write_record(&vec![Value::Int(2)]).unwrap());
        assert!(!w.write_record(&vec![Value::Int(3)]).unwrap());
        assert_eq!(w.inner.rows.len(), 2);
    }

    #[test]
    fn uniq_writer_drops_duplicate_rows() {
        let mut w = UniqWriter::new(VecSink::default());
        w.write_record(&vec![Value::Int(1)]).unwrap();
        w.write_record(&vec![Value::Int(1)]).unwrap();
        w.write_record(&vec![Value::Int(2)]).unwrap();
        assert_eq!(w.inner.rows.len(), 2);
    }

    #[test]
    fn uniq_count_writer_prepends_count_column_in_first_seen_order() {
        let mut w = UniqCountWriter::new(VecSink::default());
        w.write_record(&vec![Value::Int(20)]).unwrap();
        w.write_record(&vec![Value::Int(10)]).unwrap();
        w.write_record(&vec![Value::Int(20)]).unwrap();
        w.finish().unwrap();
        assert_eq!(
            w.inner.rows,
            vec![
                vec![Value::Int(2), Value::Int(20)],
                vec![Value::Int(1), Value::Int(10)],
            ]
        );
    }

    #[test]
    fn sorted_writer_orders_by_key_descending() {
        let mut w = SortedWriter::new(VecSink::default(), SortDirection::Desc, |r: &Record| r[0].clone());
        for i in [3, 1, 2] {
            w.write_record(&vec![Value::Int(i)]).unwrap();
        }
        w.finish().unwrap();
        assert_eq!(
            w.inner.rows,
            vec![vec![Value::Int(3)], vec![Value::Int(2)], vec![Value::Int(1)]]
        );
    }

    #[test]
    fn aggregate_writer_flushes_precomputed_rows_in_given_order() {
        let rows = vec![vec![Value::Int(1)], vec![Value::Int(2)]];
        let mut w = AggregateWriter::new(VecSink::default(), rows.clone());
        w.write_record(&vec![Value::Int(99)]).unwrap();
        w.finish().unwrap();
        assert_eq!(w.inner.rows, rows);
    }
}
