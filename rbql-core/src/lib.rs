//! `rbql-core` — the RBQL ("Rainbow Query Language") query compiler and
//! execution engine.
//!
//! This crate implements the components described in §2 of the
//! specification: a lexer/literal extractor ([`lexer`]), an action
//! separator ([`action_separator`]), a variable resolver ([`variables`]),
//! clause translators ([`translate`]), header inference ([`header`]), a
//! hash join map ([`join`]), aggregators ([`aggregate`]), a writer
//! pipeline ([`writer`]), an error/warning taxonomy ([`error`]) and the
//! execution driver ([`driver`]) that ties all of the above together and
//! pulls records through a pluggable host expression evaluator
//! ([`eval`]).
//!
//! The engine never reads or writes bytes itself: embedders supply an
//! [`collaborators::InputIterator`] / [`collaborators::OutputWriter`] pair
//! (and, for joins, a [`collaborators::TableRegistry`]); see
//! `rbql-cli` for a CSV-backed implementation of all three.

pub mod action_separator;
pub mod aggregate;
pub mod collaborators;
pub mod driver;
pub mod error;
pub mod eval;
pub mod explain;
pub mod header;
pub mod join;
pub mod lexer;
pub mod like;
pub mod record;
pub mod translate;
pub mod value;
pub mod variables;
pub mod writer;

pub use collaborators::{InputIterator, OutputWriter, TableRegistry};
pub use driver::{execute, find_join_table_name, JoinTable};
pub use error::{Error, ErrorKind, Reason, Result};
pub use eval::{reference_engine, Bindings, Expr, ExpressionEngine, ReferenceEngine};
pub use explain::{explain, ParsedClause, ParsedQuery};
pub use join::JoinKind;
pub use record::{Header, Record};
pub use value::Value;
