//! C7 — Aggregators (§4.7).
//!
//! Each aggregator implements the two-stage protocol from the original
//! engine's `Aggregator` hierarchy: stage 0 runs once per input record (the
//! SELECT expression evaluates and calls [`Aggregator::increment`] with the
//! raw value), stage 1 runs once per group, after every input record has
//! been seen, to read the final value back out ([`Aggregator::finalize`]).
//! A single query may combine several aggregators over different group
//! keys; [`GroupTable`] keeps one aggregator instance per (aggregator
//! slot, group key) pair, mirroring the original's `aggregation_stage`
//! indexing scheme without needing a generated "aggregation stage" global.

use crate::error::Error;
use crate::value::Value;
use std::collections::HashMap;

/// A numeric value that still remembers whether it is an int or a float,
/// the way the original engine's `NumHandler(True)` latch does: a value
/// starts int and stays int through `min`/`max`/`+` until something
/// non-integral forces it to float, at which point it stays float for the
/// rest of the group.
#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }

    fn into_value(self) -> Value {
        match self {
            Num::Int(i) => Value::Int(i),
            Num::Float(f) => Value::Float(f),
        }
    }

    fn add(self, other: Num) -> Num {
        match (self, other) {
            (Num::Int(a), Num::Int(b)) => Num::Int(a + b),
            (a, b) => Num::Float(a.as_f64() + b.as_f64()),
        }
    }

    fn min(self, other: Num) -> Num {
        match (self, other) {
            (Num::Int(a), Num::Int(b)) => Num::Int(a.min(b)),
            (a, b) => Num::Float(a.as_f64().min(b.as_f64())),
        }
    }

    fn max(self, other: Num) -> Num {
        match (self, other) {
            (Num::Int(a), Num::Int(b)) => Num::Int(a.max(b)),
            (a, b) => Num::Float(a.as_f64().max(b.as_f64())),
        }
    }
}

/// Coerces a record field into a [`Num`] the way the original engine's
/// `NumHandler` does: ints and floats pass through unchanged, numeric
/// strings parse as int first and fall back to float, anything else is a
/// runtime error naming the offending value (so e.g. summing a text column
/// fails loudly instead of silently treating it as zero).
fn coerce_num(value: &Value) -> Result<Num, Error> {
    match value {
        Value::Int(i) => Ok(Num::Int(*i)),
        Value::Float(f) => Ok(Num::Float(*f)),
        Value::Bool(b) => Ok(Num::Int(if *b { 1 } else { 0 })),
        Value::Str(s) => {
            let trimmed = s.trim();
            if let Ok(i) = trimmed.parse::<i64>() {
                Ok(Num::Int(i))
            } else if let Ok(f) = trimmed.parse::<f64>() {
                Ok(Num::Float(f))
            } else {
                Err(Error::runtime(format!("'{s}' is not numeric")))
            }
        }
        other => Err(Error::runtime(format!(
            "{} value is not numeric",
            other.type_name()
        ))),
    }
}

/// Coerces a record field into a plain `f64`, for the aggregators
/// (`AVG`/`VARIANCE`/`MEDIAN`) whose result is a division and so is always
/// a float regardless of its inputs' integer-ness.
fn coerce_numeric(value: &Value) -> Result<f64, Error> {
    Ok(coerce_num(value)?.as_f64())
}

/// One running aggregation. `ConstGroupVerifier` (§4.7's requirement that a
/// non-aggregated column in an aggregate query must be constant within its
/// group) is folded in as `Aggregator::Const`, since it shares the same
/// increment/finalize shape as the numeric aggregators.
#[derive(Debug, Clone)]
pub enum Aggregator {
    Min(Option<Num>),
    Max(Option<Num>),
    Sum(Num),
    Avg { sum: f64, count: u64 },
    Variance { sum: f64, sum_sq: f64, count: u64 },
    Median(Vec<f64>),
    Count(u64),
    ArrayAgg(Vec<Value>),
    /// Verifies every increment within a group is equal; carries the first
    /// value seen and the column's source text for the error message.
    Const { first: Option<Value>, source_text: String },
}

impl Aggregator {
    pub fn min() -> Self {
        Aggregator::Min(None)
    }
    pub fn max() -> Self {
        Aggregator::Max(None)
    }
    pub fn sum() -> Self {
        Aggregator::Sum(Num::Int(0))
    }
    pub fn avg() -> Self {
        Aggregator::Avg { sum: 0.0, count: 0 }
    }
    pub fn variance() -> Self {
        Aggregator::Variance { sum: 0.0, sum_sq: 0.0, count: 0 }
    }
    pub fn median() -> Self {
        Aggregator::Median(Vec::new())
    }
    pub fn count() -> Self {
        Aggregator::Count(0)
    }
    pub fn array_agg() -> Self {
        Aggregator::ArrayAgg(Vec::new())
    }
    pub fn const_verifier(source_text: impl Into<String>) -> Self {
        Aggregator::Const { first: None, source_text: source_text.into() }
    }

    /// Stage 0: folds one more record's value into the running state.
    pub fn increment(&mut self, value: Value) -> Result<(), Error> {
        match self {
            Aggregator::Min(cur) => {
                let n = coerce_num(&value)?;
                *cur = Some(cur.map_or(n, |c| c.min(n)));
            }
            Aggregator::Max(cur) => {
                let n = coerce_num(&value)?;
                *cur = Some(cur.map_or(n, |c| c.max(n)));
            }
            Aggregator::Sum(acc) => *acc = acc.add(coerce_num(&value)?),
            Aggregator::Avg { sum, count } => {
                *sum += coerce_numeric(&value)?;
                *count += 1;
            }
            Aggregator::Variance { sum, sum_sq, count } => {
                let n = coerce_numeric(&value)?;
                *sum += n;
                *sum_sq += n * n;
                *count += 1;
            }
            Aggregator::Median(samples) => samples.push(coerce_numeric(&value)?),
            Aggregator::Count(n) => *n += 1,
            Aggregator::ArrayAgg(items) => items.push(value),
            Aggregator::Const { first, source_text } => match first {
                None => *first = Some(value),
                Some(existing) if *existing == value => {}
                Some(existing) => {
                    return Err(Error::runtime(format!(
                        "expression '{source_text}' is not constant within a group: '{existing}' vs '{value}'"
                    )))
                }
            },
        }
        Ok(())
    }

    /// Stage 1: reads the final per-group value back out.
    pub fn finalize(&self) -> Result<Value, Error> {
        let empty = || Error::runtime("aggregate function applied to an empty group");
        Ok(match self {
            Aggregator::Min(cur) => cur.ok_or_else(empty)?.into_value(),
            Aggregator::Max(cur) => cur.ok_or_else(empty)?.into_value(),
            Aggregator::Sum(acc) => acc.into_value(),
            Aggregator::Avg { sum, count } => {
                if *count == 0 {
                    return Err(empty());
                }
                Value::Float(sum / *count as f64)
            }
            Aggregator::Variance { sum, sum_sq, count } => {
                if *count == 0 {
                    return Err(empty());
                }
                let n = *count as f64;
                let mean = sum / n;
                Value::Float(sum_sq / n - mean * mean)
            }
            Aggregator::Median(samples) => {
                if samples.is_empty() {
                    return Err(empty());
                }
                let mut sorted = samples.clone();
                sorted.sort_by(|a, b| a.partial_cmp(b).expect("NaN in median input"));
                let mid = sorted.len() / 2;
                Value::Float(if sorted.len() % 2 == 1 {
                    sorted[mid]
                } else {
                    (sorted[mid - 1] + sorted[mid]) / 2.0
                })
            }
            Aggregator::Count(n) => Value::Int(*n as i64),
            Aggregator::ArrayAgg(items) => Value::List(items.clone()),
            Aggregator::Const { first, .. } => first.clone().ok_or_else(empty)?,
        })
    }
}

/// `Value` carries an `f64` variant so it can't derive `Eq`/`Hash`; group
/// keys are hashed by their textual representation instead, matching how
/// the original engine keys its group dict off the tuple's `repr`.
fn key_repr(values: &[Value]) -> String {
    values
        .iter()
        .map(|v| format!("{}:{v}", v.type_name()))
        .collect::<Vec<_>>()
        .join("\u{1}")
}

/// One aggregator instance per (column slot, group key): a query can have
/// several aggregated output columns, each tracked independently per group.
#[derive(Debug, Default)]
pub struct GroupTable {
    groups: HashMap<String, Vec<Aggregator>>,
    templates: Vec<Aggregator>,
    pub group_order: Vec<Vec<Value>>,
}

impl GroupTable {
    pub fn new(templates: Vec<Aggregator>) -> Self {
        GroupTable { groups: HashMap::new(), templates, group_order: Vec::new() }
    }

    /// Feeds one record's group key and per-slot values into the table,
    /// creating a fresh set of aggregators the first time a key is seen.
    pub fn increment(&mut self, key: Vec<Value>, values: Vec<Value>) -> Result<(), Error> {
        let repr = key_repr(&key);
        if !self.groups.contains_key(&repr) {
            self.group_order.push(key.clone());
            self.groups.insert(repr.clone(), self.templates.clone());
        }
        let row = self.groups.get_mut(&repr).expect("just inserted above");
        for (agg, value) in row.iter_mut().zip(values) {
            agg.increment(value)?;
        }
        Ok(())
    }

    /// Produces one output record per group, in first-seen order, by
    /// finalizing every aggregator slot. Used directly by tests; query
    /// execution goes through [`GroupTable::finalize_sorted`] instead,
    /// since §4.7/§5 require groups emitted in ascending key order.
    pub fn finalize(&self) -> Result<Vec<Vec<Value>>, Error> {
        self.group_order
            .iter()
            .map(|key| {
                self.groups[&key_repr(key)]
                    .iter()
                    .map(Aggregator::finalize)
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect()
    }

    /// Like [`GroupTable::finalize`], but sorted ascending by group key
    /// (`sort(keys)` at finish, §4.7/§5/§8 invariant 7), a stable sort so
    /// groups that compare equal keep first-seen order.
    pub fn finalize_sorted(&self) -> Result<Vec<Vec<Value>>, Error> {
        let mut keys: Vec<&Vec<Value>> = self.group_order.iter().collect();
        keys.sort_by(|a, b| compare_key_tuples(a, b));
        keys.into_iter()
            .map(|key| {
                self.groups[&key_repr(key)]
                    .iter()
                    .map(Aggregator::finalize)
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect()
    }
}

/// Lexicographic comparison over a group-key tuple, matching how `ORDER
/// BY`'s own tuple key compares (§4.4); non-comparable pairs (e.g. a list
/// value) fall back to equal so the sort never panics.
fn compare_key_tuples(a: &[Value], b: &[Value]) -> std::cmp::Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        match x.partial_cmp(y) {
            Some(std::cmp::Ordering::Equal) | None => continue,
            Some(other) => return other,
        }
    }
    a.len().cmp(&b.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sum_and_avg_over_mixed_numeric_strings() {
        let mut sum = Aggregator::sum();
        sum.increment(Value::Int(1)).unwrap();
        sum.increment(Value::Str("2.5".to_string())).unwrap();
        assert_eq!(sum.finalize().unwrap(), Value::Float(3.5));

        let mut avg = Aggregator::avg();
        avg.increment(Value::Int(2)).unwrap();
        avg.increment(Value::Int(4)).unwrap();
        assert_eq!(avg.finalize().unwrap(), Value::Float(3.0));
    }

    #[test]
    fn median_of_even_and_odd_counts() {
        let mut m = Aggregator::median();
        for v in [Value::Int(1), Value::Int(2), Value::Int(3)] {
            m.increment(v).unwrap();
        }
        assert_eq!(m.finalize().unwrap(), Value::Float(2.0));
    }

    #[test]
    fn const_verifier_rejects_varying_values() {
        let mut c = Aggregator::const_verifier("a2");
        c.increment(Value::Int(5)).unwrap();
        assert!(c.increment(Value::Int(6)).is_err());
    }

    #[test]
    fn group_table_tracks_groups_independently() {
        let mut table = GroupTable::new(vec![Aggregator::sum()]);
        table
            .increment(vec![Value::Str("x".into())], vec![Value::Int(1)])
            .unwrap();
        table
            .increment(vec![Value::Str("y".into())], vec![Value::Int(10)])
            .unwrap();
        table
            .increment(vec![Value::Str("x".into())], vec![Value::Int(2)])
            .unwrap();
        let rows = table.finalize().unwrap();
        assert_eq!(rows, vec![vec![Value::Int(3)], vec![Value::Int(10)]]);
    }

    #[test]
    fn sum_min_max_stay_integral_over_integer_inputs() {
        let mut sum = Aggregator::sum();
        sum.increment(Value::Int(3)).unwrap();
        sum.increment(Value::Str("4".to_string())).unwrap();
        assert_eq!(sum.finalize().unwrap(), Value::Int(7));

        let mut min = Aggregator::min();
        min.increment(Value::Int(3)).unwrap();
        min.increment(Value::Int(1)).unwrap();
        assert_eq!(min.finalize().unwrap(), Value::Int(1));

        let mut max = Aggregator::max();
        max.increment(Value::Str("3".to_string())).unwrap();
        max.increment(Value::Float(1.5)).unwrap();
        assert_eq!(max.finalize().unwrap(), Value::Float(3.0));
    }

    #[test]
    fn finalize_sorted_orders_by_ascending_group_key() {
        let mut table = GroupTable::new(vec![Aggregator::sum()]);
        table.increment(vec![Value::Str("b".into())], vec![Value::Int(1)]).unwrap();
        table.increment(vec![Value::Str("a".into())], vec![Value::Int(2)]).unwrap();
        table.increment(vec![Value::Str("c".into())], vec![Value::Int(3)]).unwrap();
        assert_eq!(
            table.group_order,
            vec![vec![Value::Str("b".into())], vec![Value::Str("a".into())], vec![Value::Str("c".into())]]
        );
        let rows = table.finalize_sorted().unwrap();
        assert_eq!(
            rows,
            vec![vec![Value::Int(2)], vec![Value::Int(1)], vec![Value::Int(3)]]
        );
    }

    #[test]
    fn empty_group_is_a_runtime_error() {
        let sum = Aggregator::sum();
        assert!(sum.finalize().is_ok());
        let min = Aggregator::min();
        assert!(min.finalize().is_err());
    }
}
