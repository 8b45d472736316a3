//! Append-only CSV sink for monitor samples.

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::sample::Sample;

/// Row writer for a single tabular file.
///
/// The first `append` on a file that does not yet exist writes a header
/// built from the first row's keys in insertion order; that column set is
/// fixed for the lifetime of the sink. Rows missing a column render an
/// empty field, and keys outside the column set are dropped (the registry
/// guarantees they do not occur in a well-formed run).
#[derive(Debug)]
pub struct CsvSink {
    path: PathBuf,
    columns: Option<Vec<String>>,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            columns: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Column order, once fixed by the first append.
    pub fn columns(&self) -> Option<&[String]> {
        self.columns.as_deref()
    }

    /// Append rows, writing the header first if the file does not exist.
    ///
    /// One flush per call. Errors surface to the caller; nothing is
    /// partially retained here, so the caller keeps its buffer and retries.
    pub fn append(&mut self, rows: &[Sample]) -> Result<()> {
        let Some(first) = rows.first() else {
            return Ok(());
        };

        let write_header = !self.path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut out = BufWriter::new(file);

        let columns = self
            .columns
            .get_or_insert_with(|| first.keys().map(str::to_string).collect());

        if write_header {
            writeln!(out, "{}", columns.join(","))?;
        }
        for row in rows {
            let mut line = String::new();
            for (i, column) in columns.iter().enumerate() {
                if i > 0 {
                    line.push(',');
                }
                if let Some(value) = row.get(column) {
                    line.push_str(&value.to_string());
                }
            }
            writeln!(out, "{line}")?;
        }
        out.flush()?;
        Ok(())
    }
}
