//! Argument parsing and top-level orchestration (§6.3), mirroring
//! `prqlc`'s `cli::mod::Cli`/`Command` split: a `clap`-derived struct for
//! the ordinary run path, plus a `Parse` subcommand (modeled on prqlc's own
//! `Parse`) for inspecting a query without executing it.

use crate::csv_io::{CsvInput, CsvOutput};
use crate::policy::{Encoding, Policy};
use crate::table_registry::{materialize, FileTableRegistry};
use anyhow::{Context, Result};
use clap::{ColorChoice, Parser, Subcommand};
use rbql_core::{explain, find_join_table_name, InputIterator, JoinTable, OutputWriter, ReferenceEngine, TableRegistry};
use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "rbql", author, version, about = "Run RBQL queries against CSV files")]
struct Cli {
    #[command(flatten)]
    run: RunArgs,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse a query into its recognized clauses and print them as JSON,
    /// without resolving variables, compiling expressions, or touching any
    /// input file.
    Parse {
        /// The RBQL query text to parse.
        #[arg(long)]
        query: String,
    },
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// The RBQL query text to run.
    #[arg(long)]
    query: Option<String>,

    /// Input CSV file; reads stdin when omitted.
    #[arg(long)]
    input: Option<PathBuf>,

    /// Output file; writes stdout when omitted.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Field delimiter. `\t` is recognized as a shorthand for a literal tab.
    #[arg(long, default_value = ",")]
    delim: String,

    /// How input fields are split/quoted.
    #[arg(long, value_enum, default_value = "simple", env = "RBQL_POLICY")]
    policy: Policy,

    /// How output fields are quoted; defaults to `--policy`'s own scheme.
    #[arg(long, value_enum)]
    out_format: Option<Policy>,

    /// Byte-to-text decoding of the input file.
    #[arg(long, value_enum, default_value = "utf-8", env = "RBQL_ENCODING")]
    encoding: Encoding,

    /// Treat the first (non-comment) line as a header row.
    #[arg(long)]
    with_headers: bool,

    /// Lines starting with this prefix are skipped entirely.
    #[arg(long)]
    comment_prefix: Option<String>,

    /// Colorize diagnostics.
    #[arg(long, value_enum, default_value = "auto")]
    color: ColorChoice,
}

fn parse_delim(raw: &str) -> Result<char> {
    match raw {
        "\\t" => Ok('\t'),
        other => other
            .chars()
            .next()
            .filter(|_| other.chars().count() == 1)
            .ok_or_else(|| anyhow::anyhow!("--delim must be exactly one character, got '{other}'")),
    }
}

fn apply_color_choice(choice: ColorChoice) {
    match choice {
        ColorChoice::Always => std::env::set_var("CLICOLOR_FORCE", "1"),
        ColorChoice::Never => std::env::set_var("NO_COLOR", "1"),
        ColorChoice::Auto => {}
    }
}

fn read_input_bytes(path: Option<&PathBuf>) -> Result<Vec<u8>> {
    match path {
        Some(path) => std::fs::read(path).with_context(|| format!("failed reading '{}'", path.display())),
        None => {
            let mut buf = Vec::new();
            std::io::stdin().read_to_end(&mut buf).context("failed reading stdin")?;
            Ok(buf)
        }
    }
}

fn open_output(path: Option<&PathBuf>) -> Result<Box<dyn Write>> {
    match path {
        Some(path) => Ok(Box::new(File::create(path).with_context(|| format!("failed creating '{}'", path.display()))?)),
        None => Ok(Box::new(std::io::stdout())),
    }
}

fn print_warnings(warnings: &[String]) {
    for warning in warnings {
        eprintln!("Warning: {warning}");
    }
}

/// Entrypoint called by [`crate::main`].
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    apply_color_choice(cli.run.color);

    if let Some(Command::Parse { query }) = cli.command {
        let parsed = explain(&query)?;
        let json = serde_json::to_string_pretty(&parsed).context("failed to serialize parsed query")?;
        println!("{json}");
        return Ok(());
    }

    let args = cli.run;
    let query = args.query.ok_or_else(|| anyhow::anyhow!("--query is required"))?;
    let delim = parse_delim(&args.delim)?;
    let out_format = args.out_format.unwrap_or(args.policy);

    log::debug!("reading input (policy={:?}, delim={:?})", args.policy, delim);
    let bytes = read_input_bytes(args.input.as_ref())?;
    let mut input = CsvInput::new(
        &bytes,
        args.encoding,
        args.policy,
        delim,
        args.with_headers,
        args.comment_prefix.clone(),
    )?;

    let mut join_warnings = Vec::new();
    let join: Option<JoinTable> = match find_join_table_name(&query)? {
        Some(table_name) => {
            log::debug!("query joins against table '{table_name}'");
            let registry = FileTableRegistry {
                main_input: args.input.clone(),
                policy: args.policy,
                delim,
                encoding: args.encoding,
                with_headers: args.with_headers,
                comment_prefix: args.comment_prefix.clone(),
            };
            let table_input = registry.resolve(&table_name)?;
            let (table, warnings) = materialize(table_input)?;
            join_warnings = warnings;
            Some(table)
        }
        None => None,
    };

    let raw_output = open_output(args.output.as_ref())?;
    let mut output = CsvOutput::new(raw_output, out_format, delim, args.encoding, args.with_headers);

    let engine = ReferenceEngine;
    rbql_core::execute(&query, &engine, &mut input, join, &mut output)?;

    let mut warnings = join_warnings;
    warnings.extend(input.warnings());
    warnings.extend(output.warnings());
    print_warnings(&warnings);

    Ok(())
}
