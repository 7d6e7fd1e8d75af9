//! C6 — Join Map (§4.6).
//!
//! A hash join over the join input, built once (keyed on the join
//! expression's value) and probed once per main-table record. Grounded on
//! `HashJoinMap`/`InnerJoiner`/`LeftJoiner`/`StrictLeftJoiner`: `Inner`
//! drops unmatched left rows, `Left` pads the join side with `Null`s for an
//! unmatched row, `StrictLeft` requires every left row to match exactly
//! once and turns anything else into a runtime error.

use crate::error::Error;
use crate::record::Record;
use crate::value::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    StrictLeft,
}

/// Maps a join key (the join expression's value, by its textual form since
/// `Value` isn't hashable) to every join-table record sharing that key, in
/// input order. Also tracks `max_record_len`, the width of the widest join
/// record (§3's `JoinMap`), used to pad an unmatched `LEFT JOIN` row with
/// the right number of `Null`s rather than an arbitrary one.
#[derive(Debug, Default)]
pub struct HashJoinMap {
    index: HashMap<String, Vec<Record>>,
    pub max_record_len: usize,
}

fn key_repr(key: &Value) -> String {
    format!("{}:{key}", key.type_name())
}

impl HashJoinMap {
    pub fn build<I>(records: I, key_of: impl Fn(&Record) -> Result<Value, Error>) -> Result<Self, Error>
    where
        I: IntoIterator<Item = Record>,
    {
        let mut index: HashMap<String, Vec<Record>> = HashMap::new();
        let mut max_record_len = 0;
        for record in records {
            let key = key_of(&record)?;
            max_record_len = max_record_len.max(record.len());
            index.entry(key_repr(&key)).or_default().push(record);
        }
        Ok(HashJoinMap { index, max_record_len })
    }

    pub fn get(&self, key: &Value) -> &[Record] {
        self.index.get(&key_repr(key)).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Joins one left-side record against the map, producing zero or more
/// right-hand records to pair it with. An unmatched `LEFT JOIN` row is
/// represented as an all-`Null` synthetic record of
/// [`HashJoinMap::max_record_len`] fields (§4.6's `LeftJoiner`), not as an
/// absent binding, so a `b`-prefixed field reference reads `Null` instead
/// of erroring.
pub fn join_record(kind: JoinKind, map: &HashJoinMap, key: &Value) -> Result<Vec<Record>, Error> {
    let matches = map.get(key);
    match (kind, matches.len()) {
        (JoinKind::Inner, 0) => Ok(Vec::new()),
        (JoinKind::StrictLeft, 0) => Err(Error::runtime(
            "STRICT LEFT JOIN: left row did not match any join row",
        )),
        (JoinKind::StrictLeft, n) if n > 1 => Err(Error::runtime(format!(
            "STRICT LEFT JOIN: left row matched {n} join rows, expected exactly one"
        ))),
        (_, 0) => Ok(vec![vec![Value::Null; map.max_record_len]]),
        (_, _) => Ok(matches.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map() -> HashJoinMap {
        HashJoinMap::build(
            vec![
                vec![Value::Int(1), Value::Str("x".into())],
                vec![Value::Int(1), Value::Str("y".into())],
                vec![Value::Int(2), Value::Str("z".into())],
            ],
            |r| Ok(r[0].clone()),
        )
        .unwrap()
    }

    #[test]
    fn inner_join_drops_unmatched_and_fans_out_matches() {
        let m = map();
        let rows = join_record(JoinKind::Inner, &m, &Value::Int(1)).unwrap();
        assert_eq!(rows.len(), 2);
        let rows = join_record(JoinKind::Inner, &m, &Value::Int(3)).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn left_join_pads_unmatched_rows_with_nulls() {
        let m = map();
        let rows = join_record(JoinKind::Left, &m, &Value::Int(3)).unwrap();
        assert_eq!(rows, vec![vec![Value::Null, Value::Null]]);
    }

    #[test]
    fn strict_left_join_rejects_zero_or_many_matches() {
        let m = map();
        assert!(join_record(JoinKind::StrictLeft, &m, &Value::Int(3)).is_err());
        assert!(join_record(JoinKind::StrictLeft, &m, &Value::Int(1)).is_err());
        assert!(join_record(JoinKind::StrictLeft, &m, &Value::Int(2)).is_ok());
    }
}
