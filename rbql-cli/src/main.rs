//! `rbql` — run an RBQL query against a CSV file.
//!
//! Thin entrypoint; all the argument parsing and orchestration lives in
//! [`cli`], matching `prqlc-cli`'s `main.rs` / `cli::main()` split.

mod cli;
mod csv_io;
mod policy;
mod table_registry;

use std::process::exit;

fn main() -> color_eyre::eyre::Result<()> {
    env_logger::builder().format_timestamp(None).init();
    color_eyre::install()?;

    if let Err(error) = cli::run() {
        eprintln!("{error:#}");
        exit(1);
    }

    Ok(())
}
