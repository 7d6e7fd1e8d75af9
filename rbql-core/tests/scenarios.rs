//! End-to-end scenario tests (§8's seed table), run against an in-memory
//! [`InputIterator`]/[`OutputWriter`] pair rather than `rbql-cli`'s CSV
//! collaborator, since the engine itself never reads or writes bytes.

use rbql_core::{
    execute, Error, ErrorKind, Header, InputIterator, JoinTable, OutputWriter, Record,
    ReferenceEngine, Value,
};
use std::collections::VecDeque;

struct VecInput {
    header: Option<Header>,
    rows: VecDeque<Record>,
}

impl VecInput {
    fn new(rows: Vec<Record>) -> Self {
        VecInput { header: None, rows: rows.into() }
    }
}

impl InputIterator for VecInput {
    fn header(&mut self) -> Result<Option<Header>, Error> {
        Ok(self.header.clone())
    }

    fn next_record(&mut self) -> Result<Option<Record>, Error> {
        Ok(self.rows.pop_front())
    }
}

#[derive(Default)]
struct VecOutput {
    header: Option<Header>,
    rows: Vec<Record>,
}

impl OutputWriter for VecOutput {
    fn write_header(&mut self, header: &Header) -> Result<(), Error> {
        self.header = Some(header.clone());
        Ok(())
    }

    fn write_record(&mut self, record: &Record) -> Result<bool, Error> {
        self.rows.push(record.clone());
        Ok(true)
    }
}

fn text_row(fields: &[&str]) -> Record {
    fields.iter().map(|f| Value::Str(f.to_string())).collect()
}

fn run(query: &str, rows: Vec<Record>, join: Option<JoinTable>) -> Result<VecOutput, Error> {
    let engine = ReferenceEngine;
    let mut input = VecInput::new(rows);
    let mut output = VecOutput::default();
    execute(query, &engine, &mut input, join, &mut output)?;
    Ok(output)
}

/// Scenario 1: `SELECT NR, a1, LEN(a3) WHERE INT(a1) > 5`.
#[test]
fn scenario_1_filters_and_projects_with_function_calls() {
    let rows = vec![
        text_row(&["5", "haha", "hoho"]),
        text_row(&["-20", "haha", "hioho"]),
        text_row(&["50", "haha", "dfdf"]),
        text_row(&["20", "haha", ""]),
    ];
    let out = run("SELECT NR, a1, LEN(a3) WHERE INT(a1) > 5", rows, None).unwrap();
    assert_eq!(
        out.rows,
        vec![
            vec![Value::Int(3), Value::Str("50".into()), Value::Int(4)],
            vec![Value::Int(4), Value::Str("20".into()), Value::Int(0)],
        ]
    );
}

/// Scenario 2: `SELECT DISTINCT a2 WHERE INT(a1) > 10` over ragged input.
#[test]
fn scenario_2_distinct_over_ragged_input() {
    let rows = vec![
        text_row(&["20"]),
        text_row(&["20", "x"]),
        text_row(&["20", "x", "y"]),
        text_row(&["20", "x", "y", "z"]),
    ];
    let out = run("SELECT DISTINCT a2 WHERE INT(a1) > 10", rows, None).unwrap();
    // Row 1 has no a2 (safe_get pads with Null); rows 2-4 all share a2="x".
    assert_eq!(out.rows, vec![vec![Value::Null], vec![Value::Str("x".into())]]);
}

/// Scenario 3: `GROUP BY a1` with every numeric aggregator.
#[test]
fn scenario_3_group_by_with_aggregators() {
    let rows = vec![
        text_row(&["car", "1", "100", "1"]),
        text_row(&["car", "2", "100", "1"]),
        text_row(&["bus", "1", "100", "1"]),
        text_row(&["car", "3", "100", "1"]),
        text_row(&["bus", "2", "100", "1"]),
        text_row(&["car", "1", "100", "1"]),
        text_row(&["bus", "1", "100", "1"]),
        text_row(&["car", "2", "100", "1"]),
    ];
    let out = run(
        "SELECT a1, COUNT(*), SUM(a3), AVG(a2), MIN(a2), MAX(a2) GROUP BY a1",
        rows,
        None,
    )
    .unwrap();
    // Sorted ascending by group key: "bus" before "car" (§8 invariant 7).
    assert_eq!(out.rows.len(), 2);
    assert_eq!(out.rows[0][0], Value::Str("bus".into()));
    assert_eq!(out.rows[0][1], Value::Int(3));
    assert_eq!(out.rows[0][2], Value::Int(300));
    assert_eq!(out.rows[1][0], Value::Str("car".into()));
    assert_eq!(out.rows[1][1], Value::Int(5));
    assert_eq!(out.rows[1][2], Value::Int(500));
}

/// §4.7/§8 invariant 8: an aggregate select item with no `GROUP BY` still
/// aggregates over a single implicit group, rather than being evaluated
/// per-row like an ordinary expression.
#[test]
fn bare_aggregate_without_group_by_collapses_to_one_row() {
    let rows = vec![
        text_row(&["10"]),
        text_row(&["20"]),
        text_row(&["30"]),
    ];
    let out = run("SELECT COUNT(*), SUM(a1), MAX(a1)", rows, None).unwrap();
    assert_eq!(
        out.rows,
        vec![vec![Value::Int(3), Value::Int(60), Value::Int(30)]]
    );
}

fn join_table() -> JoinTable {
    JoinTable {
        header: None,
        records: vec![
            text_row(&["haha", "y"]),
            text_row(&["haha", "x"]),
            text_row(&["nope", "z"]),
            text_row(&["haha", "w"]),
        ],
    }
}

/// Scenario 4: `INNER JOIN ... WHERE b2 != "x" ORDER BY INT(a1) DESC`. The
/// join fans each left row out against every join-table row sharing its
/// key, and `-20`/`nomatch` has no join partner at all so `INNER JOIN`
/// drops it entirely.
#[test]
fn scenario_4_inner_join_with_where_and_order_by_desc() {
    let rows = vec![
        text_row(&["5", "haha"]),
        text_row(&["-20", "nomatch"]),
        text_row(&["50", "haha"]),
        text_row(&["20", "haha"]),
        text_row(&["1", "nope"]),
    ];
    let out = run(
        "SELECT NR, a1, b2 INNER JOIN t ON a2 == b1 WHERE b2 != \"x\" ORDER BY INT(a1) DESC",
        rows,
        Some(join_table()),
    )
    .unwrap();
    let a1_values: Vec<&Value> = out.rows.iter().map(|r| &r[1]).collect();
    assert_eq!(
        a1_values,
        vec![
            &Value::Str("50".into()),
            &Value::Str("50".into()),
            &Value::Str("20".into()),
            &Value::Str("20".into()),
            &Value::Str("5".into()),
            &Value::Str("5".into()),
            &Value::Str("1".into()),
        ]
    );
}

/// Scenario 5: `SELECT TOP 2 * ORDER BY INT(a1)`.
#[test]
fn scenario_5_top_n_after_order_by() {
    let rows = vec![
        text_row(&["50"]),
        text_row(&["5"]),
        text_row(&["20"]),
        text_row(&["-20"]),
    ];
    let out = run("SELECT TOP 2 * ORDER BY INT(a1)", rows, None).unwrap();
    assert_eq!(
        out.rows,
        vec![vec![Value::Str("-20".into())], vec![Value::Str("5".into())]]
    );
}

/// Scenario 6: `UPDATE` preserves record count/order and only touches
/// matching rows.
#[test]
fn scenario_6_update_preserves_order_and_count() {
    let rows = vec![
        text_row(&["5", "haha"]),
        text_row(&["-20", "haha"]),
        text_row(&["50", "haha"]),
        text_row(&["20", "haha"]),
    ];
    let out = run(
        "UPDATE a1 = 100, a2 = a2 + \" \" + STR(NR) WHERE INT(a1) > 10",
        rows,
        None,
    )
    .unwrap();
    assert_eq!(out.rows.len(), 4);
    assert_eq!(out.rows[0], vec![Value::Str("5".into()), Value::Str("haha".into())]);
    assert_eq!(out.rows[1], vec![Value::Str("-20".into()), Value::Str("haha".into())]);
    assert_eq!(out.rows[2], vec![Value::Int(100), Value::Str("haha 3".into())]);
    assert_eq!(out.rows[3], vec![Value::Int(100), Value::Str("haha 4".into())]);
}

/// Scenario 7: `STRICT LEFT JOIN` where a left key has no match is a
/// runtime error naming the violated invariant.
#[test]
fn scenario_7_strict_left_join_requires_exactly_one_match() {
    let rows = vec![text_row(&["5", "missing-key"])];
    let err = run(
        "SELECT a1 STRICT LEFT JOIN t ON a2 == b1",
        rows,
        Some(join_table()),
    )
    .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Runtime);
    assert!(err.to_string().contains("STRICT LEFT JOIN"));
}

/// §4.4/§4.5: an explicit `AS` alias names its output column and is
/// stripped before the expression is compiled.
#[test]
fn select_as_alias_names_output_column_without_breaking_compilation() {
    let header = vec!["amount".to_string()];
    let mut input = VecInput::new(vec![text_row(&["10"])]);
    input.header = Some(header);
    let engine = ReferenceEngine;
    let mut output = VecOutput::default();
    execute(
        "SELECT a1 AS raw, INT(a1) + 1 AS total",
        &engine,
        &mut input,
        None,
        &mut output,
    )
    .unwrap();
    assert_eq!(output.header, Some(vec!["raw".to_string(), "total".to_string()]));
    assert_eq!(output.rows, vec![vec![Value::Str("10".into()), Value::Int(11)]]);
}

/// §3 invariant 1 / §8 invariant 1: `SELECT *` with no WHERE preserves
/// input order and field count.
#[test]
fn select_star_with_no_where_preserves_input() {
    let rows = vec![text_row(&["1", "a"]), text_row(&["2", "b"]), text_row(&["3", "c"])];
    let out = run("SELECT *", rows.clone(), None).unwrap();
    assert_eq!(out.rows, rows);
}
