//! C11 — Host Expression Evaluator (§4.11, §9).
//!
//! The specification treats the expression language as an external,
//! pluggable collaborator: RBQL only ever sees `aN`/`bN` field references,
//! `NR`/`NF`/`BNF`, and whatever function calls a query's author wrote, and
//! hands the text off to be compiled and evaluated by someone else. This
//! module is that someone else for `rbql-core`'s own tests and for
//! `rbql-cli`: a small, self-contained expression language (arithmetic,
//! comparisons, boolean logic, a Python-style `x if c else y` ternary,
//! string/list indexing and a handful of builtin functions) good enough to
//! drive every scenario in the test suite, behind the same
//! [`ExpressionEngine`] seam a richer embedder's evaluator would implement.

use crate::error::Error;
use crate::like::like_match;
use crate::record::Record;
use crate::value::Value;
use std::sync::Arc;

/// Compiles query-author text into a reusable expression tree.
pub trait ExpressionEngine {
    fn compile(&self, text: &str) -> Result<Expr, Error>;
    fn eval(&self, expr: &Expr, bindings: &Bindings) -> Result<Value, Error>;
}

/// The row context an expression is evaluated against: the main record,
/// the matched join record (if any), and the three builtin counters.
pub struct Bindings<'a> {
    pub a: &'a Record,
    pub b: Option<&'a Record>,
    pub nr: u64,
    pub nf: usize,
    pub bnf: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    In,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialVar {
    Nr,
    Nf,
    Bnf,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Null,
    Field { prefix: char, index: usize },
    Special(SpecialVar),
    List(Vec<Expr>),
    Unary(UnOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
    Index(Box<Expr>, Box<Expr>),
    /// `then if cond else otherwise`.
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
}

/// The reference [`ExpressionEngine`]: parses with a small Pratt parser and
/// evaluates directly over the [`Expr`] tree.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReferenceEngine;

impl ExpressionEngine for ReferenceEngine {
    fn compile(&self, text: &str) -> Result<Expr, Error> {
        let tokens = tokenize(text)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_ternary()?;
        if parser.pos != parser.tokens.len() {
            return Err(Error::syntax(format!(
                "trailing input after expression: '{}'",
                text
            )));
        }
        Ok(expr)
    }

    fn eval(&self, expr: &Expr, bindings: &Bindings) -> Result<Value, Error> {
        eval(expr, bindings)
    }
}

// ---------------------------------------------------------------- lexer --

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    Op(&'static str),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    End,
}

fn tokenize(text: &str) -> Result<Vec<Tok>, Error> {
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    let mut tokens = Vec::new();
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '\'' || c == '"' {
            let quote = c;
            let start = i;
            i += 1;
            let mut s = String::new();
            while i < chars.len() && chars[i] != quote {
                if chars[i] == '\\' && i + 1 < chars.len() {
                    s.push(chars[i + 1]);
                    i += 2;
                } else {
                    s.push(chars[i]);
                    i += 1;
                }
            }
            if i >= chars.len() {
                return Err(Error::syntax(format!(
                    "unterminated string literal starting at offset {start}"
                )));
            }
            i += 1;
            tokens.push(Tok::Str(s));
            continue;
        }
        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())) {
            let start = i;
            let mut is_float = false;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                if chars[i] == '.' {
                    is_float = true;
                }
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            if is_float {
                tokens.push(Tok::Float(text.parse().map_err(|_| {
                    Error::syntax(format!("invalid numeric literal '{text}'"))
                })?));
            } else {
                tokens.push(Tok::Int(text.parse().map_err(|_| {
                    Error::syntax(format!("invalid numeric literal '{text}'"))
                })?));
            }
            continue;
        }
        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Tok::Ident(chars[start..i].iter().collect()));
            continue;
        }
        let two: String = chars[i..(i + 2).min(chars.len())].iter().collect();
        if let Some(op) = ["==", "!=", "<=", ">=", "**"].iter().find(|op| **op == two) {
            tokens.push(Tok::Op(op));
            i += 2;
            continue;
        }
        match c {
            '(' => tokens.push(Tok::LParen),
            ')' => tokens.push(Tok::RParen),
            '[' => tokens.push(Tok::LBracket),
            ']' => tokens.push(Tok::RBracket),
            ',' => tokens.push(Tok::Comma),
            '.' => tokens.push(Tok::Dot),
            '+' => tokens.push(Tok::Op("+")),
            '-' => tokens.push(Tok::Op("-")),
            '*' => tokens.push(Tok::Op("*")),
            '/' => tokens.push(Tok::Op("/")),
            '%' => tokens.push(Tok::Op("%")),
            '<' => tokens.push(Tok::Op("<")),
            '>' => tokens.push(Tok::Op(">")),
            other => {
                return Err(Error::syntax(format!("unexpected character '{other}' in expression")))
            }
        }
        i += 1;
    }
    tokens.push(Tok::End);
    Ok(tokens)
}

// --------------------------------------------------------------- parser --

struct Parser {
    tokens: Vec<Tok>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Tok {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Tok {
        let t = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn is_ident(&self, word: &str) -> bool {
        matches!(self.peek(), Tok::Ident(w) if w.eq_ignore_ascii_case(word))
    }

    fn expect_ident(&mut self, word: &str) -> Result<(), Error> {
        if self.is_ident(word) {
            self.advance();
            Ok(())
        } else {
            Err(Error::syntax(format!("expected '{word}'")))
        }
    }

    /// `then if cond else otherwise`, or just `or_expr` when there's no `if`.
    fn parse_ternary(&mut self) -> Result<Expr, Error> {
        let value = self.parse_or()?;
        if self.is_ident("if") {
            self.advance();
            let cond = self.parse_or()?;
            self.expect_ident("else")?;
            let otherwise = self.parse_ternary()?;
            return Ok(Expr::Ternary(Box::new(cond), Box::new(value), Box::new(otherwise)));
        }
        Ok(value)
    }

    fn parse_or(&mut self) -> Result<Expr, Error> {
        let mut lhs = self.parse_and()?;
        while self.is_ident("or") {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Expr::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, Error> {
        let mut lhs = self.parse_not()?;
        while self.is_ident("and") {
            self.advance();
            let rhs = self.parse_not()?;
            lhs = Expr::Binary(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr, Error> {
        if self.is_ident("not") {
            self.advance();
            return Ok(Expr::Unary(UnOp::Not, Box::new(self.parse_not()?)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, Error> {
        let lhs = self.parse_additive()?;
        let op = match self.peek() {
            Tok::Op("==") => Some(BinOp::Eq),
            Tok::Op("!=") => Some(BinOp::Ne),
            Tok::Op("<=") => Some(BinOp::Le),
            Tok::Op(">=") => Some(BinOp::Ge),
            Tok::Op("<") => Some(BinOp::Lt),
            Tok::Op(">") => Some(BinOp::Gt),
            _ if self.is_ident("in") => Some(BinOp::In),
            _ => None,
        };
        match op {
            Some(op) => {
                self.advance();
                let rhs = self.parse_additive()?;
                Ok(Expr::Binary(op, Box::new(lhs), Box::new(rhs)))
            }
            None => Ok(lhs),
        }
    }

    fn parse_additive(&mut self) -> Result<Expr, Error> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Tok::Op("+") => BinOp::Add,
                Tok::Op("-") => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, Error> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Tok::Op("*") => BinOp::Mul,
                Tok::Op("/") => BinOp::Div,
                Tok::Op("%") => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, Error> {
        if matches!(self.peek(), Tok::Op("-")) {
            self.advance();
            return Ok(Expr::Unary(UnOp::Neg, Box::new(self.parse_unary()?)));
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> Result<Expr, Error> {
        let lhs = self.parse_postfix()?;
        if matches!(self.peek(), Tok::Op("**")) {
            self.advance();
            let rhs = self.parse_unary()?;
            return Ok(Expr::Binary(BinOp::Pow, Box::new(lhs), Box::new(rhs)));
        }
        Ok(lhs)
    }

    fn parse_postfix(&mut self) -> Result<Expr, Error> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek().clone() {
                Tok::LBracket => {
                    self.advance();
                    let index = self.parse_ternary()?;
                    self.expect(Tok::RBracket)?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn expect(&mut self, tok: Tok) -> Result<(), Error> {
        if *self.peek() == tok {
            self.advance();
            Ok(())
        } else {
            Err(Error::syntax(format!("expected {tok:?}, found {:?}", self.peek())))
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, Error> {
        match self.advance() {
            Tok::Int(n) => Ok(Expr::Int(n)),
            Tok::Float(f) => Ok(Expr::Float(f)),
            Tok::Str(s) => Ok(Expr::Str(s)),
            Tok::LParen => {
                let expr = self.parse_ternary()?;
                self.expect(Tok::RParen)?;
                Ok(expr)
            }
            Tok::LBracket => {
                let mut items = Vec::new();
                if !matches!(self.peek(), Tok::RBracket) {
                    items.push(self.parse_ternary()?);
                    while matches!(self.peek(), Tok::Comma) {
                        self.advance();
                        items.push(self.parse_ternary()?);
                    }
                }
                self.expect(Tok::RBracket)?;
                Ok(Expr::List(items))
            }
            Tok::Ident(name) => self.parse_ident_expr(name),
            other => Err(Error::syntax(format!("unexpected token {other:?}"))),
        }
    }

    fn parse_ident_expr(&mut self, name: String) -> Result<Expr, Error> {
        if name.eq_ignore_ascii_case("true") {
            return Ok(Expr::Bool(true));
        }
        if name.eq_ignore_ascii_case("false") {
            return Ok(Expr::Bool(false));
        }
        if name.eq_ignore_ascii_case("none") || name.eq_ignore_ascii_case("null") {
            return Ok(Expr::Null);
        }
        if name == "NR" {
            return Ok(Expr::Special(SpecialVar::Nr));
        }
        if name == "NF" {
            return Ok(Expr::Special(SpecialVar::Nf));
        }
        if name == "BNF" {
            return Ok(Expr::Special(SpecialVar::Bnf));
        }
        if let Some(field) = parse_field_ref(&name) {
            return Ok(field);
        }
        if matches!(self.peek(), Tok::LParen) {
            self.advance();
            let mut args = Vec::new();
            if !matches!(self.peek(), Tok::RParen) {
                args.push(self.parse_ternary()?);
                while matches!(self.peek(), Tok::Comma) {
                    self.advance();
                    args.push(self.parse_ternary()?);
                }
            }
            self.expect(Tok::RParen)?;
            return Ok(Expr::Call(name, args));
        }
        Err(Error::parsing(format!("unresolved identifier '{name}'")))
    }
}

fn parse_field_ref(name: &str) -> Option<Expr> {
    let mut chars = name.chars();
    let prefix = chars.next()?;
    if prefix != 'a' && prefix != 'b' {
        return None;
    }
    let digits = chars.as_str();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let one_based: usize = digits.parse().ok()?;
    if one_based == 0 {
        return None;
    }
    Some(Expr::Field { prefix, index: one_based - 1 })
}

// ------------------------------------------------------------ evaluator --

fn eval(expr: &Expr, bindings: &Bindings) -> Result<Value, Error> {
    match expr {
        Expr::Int(n) => Ok(Value::Int(*n)),
        Expr::Float(f) => Ok(Value::Float(*f)),
        Expr::Str(s) => Ok(Value::Str(s.clone())),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Null => Ok(Value::Null),
        Expr::Field { prefix, index } => {
            let record = match prefix {
                'a' => bindings.a,
                'b' => bindings
                    .b
                    .ok_or_else(|| Error::runtime("'b' variable used without a matching join row"))?,
                _ => unreachable!("parse_field_ref only yields 'a'/'b'"),
            };
            Ok(crate::record::safe_get(record, *index))
        }
        Expr::Special(SpecialVar::Nr) => Ok(Value::Int(bindings.nr as i64)),
        Expr::Special(SpecialVar::Nf) => Ok(Value::Int(bindings.nf as i64)),
        Expr::Special(SpecialVar::Bnf) => Ok(Value::Int(
            bindings
                .bnf
                .ok_or_else(|| Error::runtime("BNF used without a matching join row"))? as i64,
        )),
        Expr::List(items) => Ok(Value::List(
            items.iter().map(|e| eval(e, bindings)).collect::<Result<_, _>>()?,
        )),
        Expr::Unary(UnOp::Neg, inner) => match eval(inner, bindings)? {
            Value::Int(i) => Ok(Value::Int(-i)),
            Value::Float(f) => Ok(Value::Float(-f)),
            other => Err(Error::runtime(format!("cannot negate {}", other.type_name()))),
        },
        Expr::Unary(UnOp::Not, inner) => Ok(Value::Bool(!eval(inner, bindings)?.is_truthy())),
        Expr::Binary(op, lhs, rhs) => eval_binary(*op, lhs, rhs, bindings),
        Expr::Call(name, args) => eval_call(name, args, bindings),
        Expr::Index(base, index) => {
            let base = eval(base, bindings)?;
            let index = eval(index, bindings)?;
            eval_index(base, index)
        }
        Expr::Ternary(cond, then, otherwise) => {
            if eval(cond, bindings)?.is_truthy() {
                eval(then, bindings)
            } else {
                eval(otherwise, bindings)
            }
        }
    }
}

fn eval_index(base: Value, index: Value) -> Result<Value, Error> {
    let i = match index {
        Value::Int(i) => i,
        other => return Err(Error::runtime(format!("index must be an integer, got {}", other.type_name()))),
    };
    match base {
        Value::List(items) => {
            let idx = normalize_index(i, items.len())?;
            Ok(items[idx].clone())
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let idx = normalize_index(i, chars.len())?;
            Ok(Value::Str(chars[idx].to_string()))
        }
        other => Err(Error::runtime(format!("{} is not indexable", other.type_name()))),
    }
}

fn normalize_index(i: i64, len: usize) -> Result<usize, Error> {
    let idx = if i < 0 { i + len as i64 } else { i };
    if idx < 0 || idx as usize >= len {
        return Err(Error::runtime(format!("index {i} out of range for length {len}")));
    }
    Ok(idx as usize)
}

fn as_f64(v: &Value) -> Result<f64, Error> {
    match v {
        Value::Int(i) => Ok(*i as f64),
        Value::Float(f) => Ok(*f),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Str(s) => s.trim().parse().map_err(|_| Error::runtime(format!("'{s}' is not numeric"))),
        other => Err(Error::runtime(format!("{} is not numeric", other.type_name()))),
    }
}

fn eval_binary(op: BinOp, lhs: &Expr, rhs: &Expr, bindings: &Bindings) -> Result<Value, Error> {
    if op == BinOp::And {
        let l = eval(lhs, bindings)?;
        return if !l.is_truthy() { Ok(l) } else { eval(rhs, bindings) };
    }
    if op == BinOp::Or {
        let l = eval(lhs, bindings)?;
        return if l.is_truthy() { Ok(l) } else { eval(rhs, bindings) };
    }
    let l = eval(lhs, bindings)?;
    let r = eval(rhs, bindings)?;
    match op {
        BinOp::Add => match (&l, &r) {
            (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{a}{b}"))),
            (Value::List(a), Value::List(b)) => {
                Ok(Value::List(a.iter().chain(b.iter()).cloned().collect()))
            }
            _ => Ok(numeric_result(as_f64(&l)? + as_f64(&r)?, &l, &r)),
        },
        BinOp::Sub => Ok(numeric_result(as_f64(&l)? - as_f64(&r)?, &l, &r)),
        BinOp::Mul => Ok(numeric_result(as_f64(&l)? * as_f64(&r)?, &l, &r)),
        BinOp::Div => {
            let divisor = as_f64(&r)?;
            if divisor == 0.0 {
                return Err(Error::runtime("division by zero"));
            }
            Ok(Value::Float(as_f64(&l)? / divisor))
        }
        BinOp::Mod => Ok(numeric_result(as_f64(&l)? % as_f64(&r)?, &l, &r)),
        BinOp::Pow => Ok(Value::Float(as_f64(&l)?.powf(as_f64(&r)?))),
        BinOp::Eq => Ok(Value::Bool(values_equal(&l, &r))),
        BinOp::Ne => Ok(Value::Bool(!values_equal(&l, &r))),
        BinOp::Lt => Ok(Value::Bool(l.partial_cmp(&r) == Some(std::cmp::Ordering::Less))),
        BinOp::Le => Ok(Value::Bool(matches!(
            l.partial_cmp(&r),
            Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)
        ))),
        BinOp::Gt => Ok(Value::Bool(l.partial_cmp(&r) == Some(std::cmp::Ordering::Greater))),
        BinOp::Ge => Ok(Value::Bool(matches!(
            l.partial_cmp(&r),
            Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)
        ))),
        BinOp::In => match &r {
            Value::List(items) => Ok(Value::Bool(items.iter().any(|v| values_equal(v, &l)))),
            Value::Str(s) => match &l {
                Value::Str(needle) => Ok(Value::Bool(s.contains(needle.as_str()))),
                other => Err(Error::runtime(format!("cannot search for {} in a string", other.type_name()))),
            },
            other => Err(Error::runtime(format!("cannot use 'in' on {}", other.type_name()))),
        },
        BinOp::And | BinOp::Or => unreachable!("short-circuited above"),
    }
}

fn numeric_result(n: f64, l: &Value, r: &Value) -> Value {
    if matches!(l, Value::Float(_)) || matches!(r, Value::Float(_)) || n.fract() != 0.0 {
        Value::Float(n)
    } else {
        Value::Int(n as i64)
    }
}

fn values_equal(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *a as f64 == *b,
        _ => l == r,
    }
}

fn eval_call(name: &str, args: &[Expr], bindings: &Bindings) -> Result<Value, Error> {
    let values = args.iter().map(|a| eval(a, bindings)).collect::<Result<Vec<_>, _>>()?;
    match name {
        "LIKE" => {
            let (value, pattern) = two_string_args(name, &values)?;
            Ok(Value::Bool(like_match(&value, &pattern)))
        }
        "UPPER" => Ok(Value::Str(one_string_arg(name, &values)?.to_uppercase())),
        "LOWER" => Ok(Value::Str(one_string_arg(name, &values)?.to_lowercase())),
        "LEN" => Ok(Value::Int(match values.first() {
            Some(Value::Str(s)) => s.chars().count() as i64,
            Some(Value::List(items)) => items.len() as i64,
            Some(other) => {
                return Err(Error::runtime(format!("LEN() is not defined for {}", other.type_name())))
            }
            None => return Err(arity_error(name, 1, 0)),
        })),
        "INT" => Ok(Value::Int(as_f64(values.first().ok_or_else(|| arity_error(name, 1, 0))?)? as i64)),
        "FLOAT" => Ok(Value::Float(as_f64(values.first().ok_or_else(|| arity_error(name, 1, 0))?)?)),
        "STR" => Ok(Value::Str(values.first().map(ToString::to_string).unwrap_or_default())),
        "ABS" => Ok(Value::Float(as_f64(values.first().ok_or_else(|| arity_error(name, 1, 0))?)?.abs())),
        "UNNEST" => match values.into_iter().next() {
            Some(Value::List(items)) => Ok(Value::List(items)),
            Some(other) => Err(Error::runtime(format!("UNNEST() requires a list, got {}", other.type_name()))),
            None => Err(arity_error(name, 1, 0)),
        },
        other => Err(Error::parsing(format!("unknown function '{other}'"))),
    }
}

fn arity_error(name: &str, expected: usize, got: usize) -> Error {
    Error::parsing(format!("{name}() takes {expected} argument(s), got {got}"))
}

fn one_string_arg(name: &str, values: &[Value]) -> Result<String, Error> {
    match values {
        [Value::Str(s)] => Ok(s.clone()),
        [other] => Ok(other.to_string()),
        _ => Err(arity_error(name, 1, values.len())),
    }
}

fn two_string_args(name: &str, values: &[Value]) -> Result<(String, String), Error> {
    match values {
        [a, b] => Ok((a.to_string(), b.to_string())),
        _ => Err(arity_error(name, 2, values.len())),
    }
}

/// Shared, thread-safe handle to the reference engine for callers that
/// store an `Arc<dyn ExpressionEngine>` (the execution driver's default).
pub fn reference_engine() -> Arc<dyn ExpressionEngine + Send + Sync> {
    Arc::new(ReferenceEngine)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings(a: &Record) -> Bindings<'_> {
        Bindings { a, b: None, nr: 1, nf: a.len(), bnf: None }
    }

    fn run(text: &str, a: &Record) -> Value {
        let engine = ReferenceEngine;
        let expr = engine.compile(text).unwrap();
        engine.eval(&expr, &bindings(a)).unwrap()
    }

    #[test]
    fn arithmetic_and_precedence() {
        let a: Record = vec![];
        assert_eq!(run("1 + 2 * 3", &a), Value::Int(7));
        assert_eq!(run("(1 + 2) * 3", &a), Value::Int(9));
        assert_eq!(run("7 % 3", &a), Value::Int(1));
    }

    #[test]
    fn field_refs_and_nr() {
        let a: Record = vec![Value::Int(10), Value::Str("hi".into())];
        assert_eq!(run("a1 + 5", &a), Value::Int(15));
        assert_eq!(run("a2", &a), Value::Str("hi".into()));
        assert_eq!(run("NR", &a), Value::Int(1));
    }

    #[test]
    fn comparisons_and_boolean_logic() {
        let a: Record = vec![Value::Int(5)];
        assert_eq!(run("a1 > 3 and a1 < 10", &a), Value::Bool(true));
        assert_eq!(run("a1 == 5 or a1 == 6", &a), Value::Bool(true));
        assert_eq!(run("not (a1 == 5)", &a), Value::Bool(false));
    }

    #[test]
    fn ternary_expression() {
        let a: Record = vec![Value::Int(5)];
        assert_eq!(run("'big' if a1 > 3 else 'small'", &a), Value::Str("big".into()));
    }

    #[test]
    fn like_and_string_functions() {
        let a: Record = vec![Value::Str("Hello World".into())];
        assert_eq!(run("LIKE(a1, 'Hello%')", &a), Value::Bool(true));
        assert_eq!(run("UPPER(a1)", &a), Value::Str("HELLO WORLD".into()));
        assert_eq!(run("LEN(a1)", &a), Value::Int(11));
    }

    #[test]
    fn list_indexing_and_membership() {
        let a: Record = vec![];
        assert_eq!(run("[1, 2, 3][1]", &a), Value::Int(2));
        assert_eq!(run("2 in [1, 2, 3]", &a), Value::Bool(true));
    }

    #[test]
    fn join_field_without_match_is_runtime_error() {
        let engine = ReferenceEngine;
        let expr = engine.compile("b1").unwrap();
        let a: Record = vec![];
        let bindings = Bindings { a: &a, b: None, nr: 1, nf: 0, bnf: None };
        assert!(engine.eval(&expr, &bindings).is_err());
    }
}
