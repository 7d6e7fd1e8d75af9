//! §6.1's `TableRegistry`: resolves the table name named in a query's `JOIN
//! <table> ON ...` clause to a file on disk. `rbql-core::driver::execute`
//! itself only ever accepts an already-built [`rbql_core::JoinTable`] (the
//! whole point of §3's "JoinMap built eagerly before pulling the first main
//! input record"), so `rbql-cli` resolves the table *before* calling
//! `execute`: [`find_table`] locates the file, [`FileTableRegistry::resolve`]
//! opens it as a [`CsvInput`] per the `TableRegistry` contract, and
//! [`materialize`] drains that iterator into the `JoinTable` `execute` wants.

use crate::csv_io::CsvInput;
use crate::policy::{Encoding, Policy};
use rbql_core::{Error, InputIterator, JoinTable, TableRegistry};
use std::path::{Path, PathBuf};

/// Looks for `table_name` verbatim, then with a `.csv` extension, next to
/// `main_input` (falling back to the current directory when the main input
/// is stdin).
fn find_table(table_name: &str, main_input: Option<&Path>) -> Result<PathBuf, Error> {
    let base = main_input.and_then(Path::parent).unwrap_or_else(|| Path::new("."));
    let candidates = [base.join(table_name), base.join(format!("{table_name}.csv"))];
    candidates
        .into_iter()
        .find(|p| p.is_file())
        .ok_or_else(|| Error::io_handling(format!("could not find JOIN table '{table_name}'")))
}

/// The settings a `JOIN` table is read with. The original engine lets join
/// tables use the same policy/encoding as the main input unless told
/// otherwise; `rbql-cli` doesn't expose separate `--join-*` flags (§6.3
/// names no such option), so this is always a copy of the main input's own
/// settings.
pub struct FileTableRegistry {
    pub main_input: Option<PathBuf>,
    pub policy: Policy,
    pub delim: char,
    pub encoding: Encoding,
    pub with_headers: bool,
    pub comment_prefix: Option<String>,
}

impl TableRegistry<CsvInput> for FileTableRegistry {
    fn resolve(&self, table_name: &str) -> Result<CsvInput, Error> {
        let path = find_table(table_name, self.main_input.as_deref())?;
        let bytes = std::fs::read(&path)
            .map_err(|e| Error::io_handling(format!("failed reading JOIN table '{}': {e}", path.display())))?;
        CsvInput::new(
            &bytes,
            self.encoding,
            self.policy,
            self.delim,
            self.with_headers,
            self.comment_prefix.clone(),
        )
    }
}

/// Drains a resolved table iterator into the in-memory [`JoinTable`]
/// `execute` expects (§4.6: "Built eagerly ... before pulling the first
/// main-input record"), forwarding any warnings it accumulated.
pub fn materialize(mut input: CsvInput) -> Result<(JoinTable, Vec<String>), Error> {
    let header = input.header()?;
    let mut records = Vec::new();
    while let Some(record) = input.next_record()? {
        records.push(record);
    }
    input.finish()?;
    let warnings = input.warnings();
    Ok((JoinTable { header, records }, warnings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn finds_table_with_csv_extension_next_to_main_input() {
        let dir = tempfile::tempdir().unwrap();
        let main_path = dir.path().join("main.csv");
        std::fs::write(&main_path, "1,2\n").unwrap();
        let join_path = dir.path().join("animals.csv");
        let mut f = std::fs::File::create(&join_path).unwrap();
        writeln!(f, "cat,4").unwrap();

        let found = find_table("animals", Some(&main_path)).unwrap();
        assert_eq!(found, join_path);
    }

    #[test]
    fn missing_table_is_an_io_handling_error() {
        let dir = tempfile::tempdir().unwrap();
        let main_path = dir.path().join("main.csv");
        std::fs::write(&main_path, "1,2\n").unwrap();
        let err = find_table("nope", Some(&main_path)).unwrap_err();
        assert_eq!(err.kind, rbql_core::ErrorKind::IoHandling);
    }
}
