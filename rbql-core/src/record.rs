//! Record and header types (§3).

use crate::error::{Error, Result};
use crate::value::Value;

/// An ordered sequence of field values. The engine never interprets field
/// contents itself; it only ever moves, copies or indexes them.
pub type Record = Vec<Value>;

/// An optional ordered sequence of unique column names associated with an
/// input. If an input has a header, the join input must also have one
/// (enforced in [`crate::driver`]).
pub type Header = Vec<String>;

/// Reads `record[idx]`, returning `Null` when `idx` is past the end of a
/// short record (§4.9, `safe_get`). Used for the *main* input, where a
/// missing trailing field is tolerated (with a warning from the input
/// iterator), not an error.
pub fn safe_get(record: &Record, idx: usize) -> Value {
    record.get(idx).cloned().unwrap_or(Value::Null)
}

/// Reads `record[idx]`, raising [`Error::bad_field`] when out of bounds
/// (§4.9, `safe_join_get`). Used when resolving fields out of a join match
/// and when computing a join key, where an out-of-bounds index always
/// indicates a malformed query rather than a ragged row. `prefix` is the
/// variable prefix the failing reference used (`a` for the main table, `b`
/// for the join table) so the message names the right side.
pub fn safe_join_get(record: &Record, idx: usize, prefix: char) -> Result<Value> {
    record
        .get(idx)
        .cloned()
        .ok_or_else(|| Error::bad_field(prefix, idx))
}

/// Writes `record[idx] = value`, reporting the bad index on overflow
/// (§4.9, `safe_set`), used by UPDATE assignments.
pub fn safe_set(record: &mut Record, idx: usize, value: Value) -> Result<()> {
    match record.get_mut(idx) {
        Some(slot) => {
            *slot = value;
            Ok(())
        }
        None => Err(Error::bad_field('a', idx)),
    }
}

/// `EXCEPT` projection: all fields of `src` whose index is not in
/// `except_indices` (§4.4).
pub fn select_except(src: &Record, except_indices: &[usize]) -> Record {
    src.iter()
        .enumerate()
        .filter(|(i, _)| !except_indices.contains(i))
        .map(|(_, v)| v.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_get_pads_with_null() {
        let record: Record = vec![Value::Int(1), Value::Int(2)];
        assert_eq!(safe_get(&record, 0), Value::Int(1));
        assert_eq!(safe_get(&record, 5), Value::Null);
    }

    #[test]
    fn except_drops_named_indices() {
        let record: Record = vec![Value::Int(1), Value::Int(2), Value::Int(3)];
        assert_eq!(
            select_except(&record, &[1]),
            vec![Value::Int(1), Value::Int(3)]
        );
    }

    #[test]
    fn safe_join_get_reports_bad_index() {
        let record: Record = vec![Value::Int(1)];
        let err = safe_join_get(&record, 3, 'b').unwrap_err();
        assert_eq!(err.to_string(), "Error [runtime error]: No 'b4' field");
    }
}
